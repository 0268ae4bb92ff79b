//! Relevance Evaluation - Five-Factor Scoring of Conversation Blocks
//!
//! `TigerStyle`: Closed set of strategies chosen once at the composition root.
//!
//! Every evaluator scores the same five factors, combines them with
//! normalized weights, and applies one decision policy:
//!
//! ```text
//! RelevanceEvaluator (trait)
//! ├── HeuristicEvaluator   (rules only, no I/O)
//! ├── ModelEvaluator       (semantic/goal/factual rated by an LLMProvider)
//! ├── CompositeEvaluator   (heuristic first, model on borderline scores)
//! └── CachedEvaluator      (bounded FIFO cache around any of the above)
//! ```
//!
//! Evaluation never fails: provider problems degrade to fixed defaults.

mod cache;
mod composite;
mod heuristic;
mod lexicon;
mod model;

pub use cache::CachedEvaluator;
pub use composite::CompositeEvaluator;
pub use heuristic::HeuristicEvaluator;
pub use model::ModelEvaluator;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, EvaluationConfig};
use crate::constants::{
    EVAL_BATCH_NEIGHBORS_COUNT, EVAL_FACTUAL_OVERRIDE_SCORE_MIN, EVAL_FACTUAL_WEIGHT_DEFAULT,
    EVAL_GOAL_WEIGHT_DEFAULT, EVAL_INFORMATION_WEIGHT_DEFAULT, EVAL_KEEP_THRESHOLD_DEFAULT,
    EVAL_REVIEW_THRESHOLD_DEFAULT, EVAL_SEMANTIC_OVERRIDE_SCORE_MIN, EVAL_SEMANTIC_WEIGHT_DEFAULT,
    EVAL_TEMPORAL_WEIGHT_DEFAULT,
};
use crate::dst::Clock;
use crate::entities::ConversationBlock;
use crate::llm::LLMProvider;

// =============================================================================
// Decision
// =============================================================================

/// What to do with a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Retain as is
    Keep,
    /// Candidate for repair
    Review,
    /// Delete
    Remove,
}

impl Decision {
    /// Lowercase decision name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keep => "keep",
            Self::Review => "review",
            Self::Remove => "remove",
        }
    }

    /// Of two decisions, the one that keeps less. Remove > Review > Keep.
    #[must_use]
    pub fn more_conservative(self, other: Self) -> Self {
        match (self, other) {
            (Self::Remove, _) | (_, Self::Remove) => Self::Remove,
            (Self::Review, _) | (_, Self::Review) => Self::Review,
            _ => Self::Keep,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Factors
// =============================================================================

/// One of the five scoring dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    /// Topical fit with the surrounding conversation
    SemanticAlignment,
    /// Freshness and access activity
    TemporalRelevance,
    /// Contribution to what the conversation is trying to do
    GoalContribution,
    /// Substance of the content itself
    InformationQuality,
    /// Agreement with what was already established
    FactualConsistency,
}

impl Factor {
    /// All factors in canonical order.
    pub const ALL: [Factor; 5] = [
        Self::SemanticAlignment,
        Self::TemporalRelevance,
        Self::GoalContribution,
        Self::InformationQuality,
        Self::FactualConsistency,
    ];

    /// Human-readable name used in explanations.
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::SemanticAlignment => "semantic alignment",
            Self::TemporalRelevance => "temporal relevance",
            Self::GoalContribution => "goal contribution",
            Self::InformationQuality => "information quality",
            Self::FactualConsistency => "factual consistency",
        }
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Per-factor scores, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorScores {
    /// Topical fit
    pub semantic_alignment: f64,
    /// Freshness
    pub temporal_relevance: f64,
    /// Goal contribution
    pub goal_contribution: f64,
    /// Substance
    pub information_quality: f64,
    /// Consistency
    pub factual_consistency: f64,
}

impl FactorScores {
    /// Score of one factor.
    #[must_use]
    pub fn get(&self, factor: Factor) -> f64 {
        match factor {
            Factor::SemanticAlignment => self.semantic_alignment,
            Factor::TemporalRelevance => self.temporal_relevance,
            Factor::GoalContribution => self.goal_contribution,
            Factor::InformationQuality => self.information_quality,
            Factor::FactualConsistency => self.factual_consistency,
        }
    }

    /// Lowest-scoring factor. Ties go to the earlier factor.
    #[must_use]
    pub fn weakest(&self) -> (Factor, f64) {
        Factor::ALL
            .iter()
            .map(|&f| (f, self.get(f)))
            .fold((Factor::SemanticAlignment, f64::INFINITY), |best, cur| {
                if cur.1 < best.1 {
                    cur
                } else {
                    best
                }
            })
    }

    /// Highest-scoring factor. Ties go to the later factor.
    #[must_use]
    pub fn strongest(&self) -> (Factor, f64) {
        Factor::ALL
            .iter()
            .map(|&f| (f, self.get(f)))
            .fold((Factor::SemanticAlignment, f64::NEG_INFINITY), |best, cur| {
                if cur.1 >= best.1 {
                    cur
                } else {
                    best
                }
            })
    }

    /// Weighted sum.
    #[must_use]
    pub fn weighted_sum(&self, weights: &FactorWeights) -> f64 {
        self.semantic_alignment * weights.semantic
            + self.temporal_relevance * weights.temporal
            + self.goal_contribution * weights.goal
            + self.information_quality * weights.information
            + self.factual_consistency * weights.factual
    }

    /// Pointwise blend: `self * a + other * b`.
    #[must_use]
    pub fn blend(&self, a: f64, other: &FactorScores, b: f64) -> FactorScores {
        FactorScores {
            semantic_alignment: self.semantic_alignment * a + other.semantic_alignment * b,
            temporal_relevance: self.temporal_relevance * a + other.temporal_relevance * b,
            goal_contribution: self.goal_contribution * a + other.goal_contribution * b,
            information_quality: self.information_quality * a + other.information_quality * b,
            factual_consistency: self.factual_consistency * a + other.factual_consistency * b,
        }
    }
}

/// Factor weights.
///
/// Construct through [`FactorWeights::new`] to get weights that sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorWeights {
    /// Semantic alignment weight
    pub semantic: f64,
    /// Temporal relevance weight
    pub temporal: f64,
    /// Goal contribution weight
    pub goal: f64,
    /// Information quality weight
    pub information: f64,
    /// Factual consistency weight
    pub factual: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            semantic: EVAL_SEMANTIC_WEIGHT_DEFAULT,
            temporal: EVAL_TEMPORAL_WEIGHT_DEFAULT,
            goal: EVAL_GOAL_WEIGHT_DEFAULT,
            information: EVAL_INFORMATION_WEIGHT_DEFAULT,
            factual: EVAL_FACTUAL_WEIGHT_DEFAULT,
        }
    }
}

impl FactorWeights {
    /// Normalized weights from raw inputs.
    #[must_use]
    pub fn new(semantic: f64, temporal: f64, goal: f64, information: f64, factual: f64) -> Self {
        Self {
            semantic,
            temporal,
            goal,
            information,
            factual,
        }
        .normalized()
    }

    /// Scale to sum to 1.
    ///
    /// Negative or non-finite entries count as zero. If nothing positive
    /// remains, the defaults are returned.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let clamp = |w: f64| if w.is_finite() && w > 0.0 { w } else { 0.0 };
        let raw = [
            clamp(self.semantic),
            clamp(self.temporal),
            clamp(self.goal),
            clamp(self.information),
            clamp(self.factual),
        ];
        let total: f64 = raw.iter().sum();
        if !total.is_finite() || total <= 0.0 {
            return Self::default();
        }

        let result = Self {
            semantic: raw[0] / total,
            temporal: raw[1] / total,
            goal: raw[2] / total,
            information: raw[3] / total,
            factual: raw[4] / total,
        };

        debug_assert!((result.sum() - 1.0).abs() < 1e-9, "weights must sum to 1");
        result
    }

    /// Sum of all weights.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.semantic + self.temporal + self.goal + self.information + self.factual
    }
}

// =============================================================================
// Score / Metadata
// =============================================================================

/// Result of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceScore {
    /// Weighted sum of factor scores
    pub overall_score: f64,
    /// Individual factors
    pub factors: FactorScores,
    /// Retention decision
    pub decision: Decision,
    /// Human-readable reason
    pub explanation: String,
}

/// Optional inputs to an evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationMetadata {
    /// Explicit conversation goal
    pub goal: Option<String>,
    /// Overrides the configured keep threshold
    pub keep_threshold: Option<f64>,
    /// Overrides the configured review threshold
    pub review_threshold: Option<f64>,
    /// Composite: consult the model regardless of the heuristic score
    pub force_model: bool,
}

impl EvaluationMetadata {
    /// Metadata carrying a goal.
    #[must_use]
    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = Some(goal.into());
        self
    }

    /// Override both thresholds.
    #[must_use]
    pub fn with_thresholds(mut self, keep: f64, review: f64) -> Self {
        self.keep_threshold = Some(keep);
        self.review_threshold = Some(review);
        self
    }

    /// Force the model in composite evaluation.
    #[must_use]
    pub fn with_force_model(mut self) -> Self {
        self.force_model = true;
        self
    }
}

// =============================================================================
// Scoring Policy
// =============================================================================

/// Weights plus decision thresholds shared by every evaluator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringPolicy {
    weights: FactorWeights,
    keep_threshold: f64,
    review_threshold: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self::new(FactorWeights::default())
    }
}

impl ScoringPolicy {
    /// Policy with default thresholds. Weights are normalized.
    #[must_use]
    pub fn new(weights: FactorWeights) -> Self {
        Self {
            weights: weights.normalized(),
            keep_threshold: EVAL_KEEP_THRESHOLD_DEFAULT,
            review_threshold: EVAL_REVIEW_THRESHOLD_DEFAULT,
        }
    }

    /// Policy built from configuration.
    #[must_use]
    pub fn from_config(config: &EvaluationConfig) -> Self {
        Self::new(config.weights).with_thresholds(config.keep_threshold, config.review_threshold)
    }

    /// Set decision thresholds.
    ///
    /// # Panics
    /// Panics unless `0 <= review <= keep <= 1`.
    #[must_use]
    pub fn with_thresholds(mut self, keep: f64, review: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&keep) && (0.0..=1.0).contains(&review),
            "thresholds must be in [0, 1]"
        );
        assert!(review <= keep, "review threshold must not exceed keep threshold");
        self.keep_threshold = keep;
        self.review_threshold = review;
        self
    }

    /// Normalized weights.
    #[must_use]
    pub fn weights(&self) -> &FactorWeights {
        &self.weights
    }

    /// Configured keep threshold.
    #[must_use]
    pub fn keep_threshold(&self) -> f64 {
        self.keep_threshold
    }

    /// Configured review threshold.
    #[must_use]
    pub fn review_threshold(&self) -> f64 {
        self.review_threshold
    }

    /// Combine factor scores into a full result.
    #[must_use]
    pub fn score(&self, factors: FactorScores, metadata: &EvaluationMetadata) -> RelevanceScore {
        let overall_score = factors.weighted_sum(&self.weights);
        let decision = self.decide(overall_score, &factors, metadata);
        RelevanceScore {
            overall_score,
            factors,
            decision,
            explanation: explain(overall_score, &factors, decision),
        }
    }

    /// Decision for an overall score.
    ///
    /// Critical factors override the overall score: weak factual
    /// consistency or semantic alignment always means Remove.
    #[must_use]
    pub fn decide(
        &self,
        overall_score: f64,
        factors: &FactorScores,
        metadata: &EvaluationMetadata,
    ) -> Decision {
        let keep = metadata.keep_threshold.unwrap_or(self.keep_threshold);
        let review = metadata.review_threshold.unwrap_or(self.review_threshold);

        if factors.factual_consistency < EVAL_FACTUAL_OVERRIDE_SCORE_MIN
            || factors.semantic_alignment < EVAL_SEMANTIC_OVERRIDE_SCORE_MIN
        {
            return Decision::Remove;
        }

        if overall_score >= keep {
            Decision::Keep
        } else if overall_score >= review {
            Decision::Review
        } else {
            Decision::Remove
        }
    }
}

/// Explanation naming the factor that drove the decision.
#[must_use]
pub fn explain(overall_score: f64, factors: &FactorScores, decision: Decision) -> String {
    match decision {
        Decision::Keep => {
            let (factor, value) = factors.strongest();
            format!("Block is relevant with score {overall_score:.2}. Strongest factor: {factor} ({value:.2})")
        }
        Decision::Review => {
            let (factor, value) = factors.weakest();
            format!("Block needs review with score {overall_score:.2}. Weakest factor: {factor} ({value:.2})")
        }
        Decision::Remove => {
            let (factor, value) = factors.weakest();
            format!("Block should be removed with score {overall_score:.2}. Critical weakness: {factor} ({value:.2})")
        }
    }
}

// =============================================================================
// Evaluator Trait
// =============================================================================

/// Scores conversation blocks.
///
/// Implementations never fail; degraded inputs produce default scores.
#[async_trait]
pub trait RelevanceEvaluator: Send + Sync + fmt::Debug {
    /// Score one block against its context.
    async fn evaluate(
        &self,
        block: &ConversationBlock,
        context: &[ConversationBlock],
        metadata: &EvaluationMetadata,
    ) -> RelevanceScore;

    /// Evaluator name for logging.
    fn name(&self) -> &'static str;

    /// Score a whole conversation (blocks in sequence order).
    ///
    /// Each block's context is up to 5 neighbors on each side. Blocks are
    /// scored concurrently and results come back in input order.
    async fn batch_evaluate(
        &self,
        blocks: &[ConversationBlock],
        metadata: &EvaluationMetadata,
    ) -> Vec<RelevanceScore> {
        let contexts: Vec<Vec<ConversationBlock>> = (0..blocks.len())
            .map(|i| neighborhood(blocks, i, EVAL_BATCH_NEIGHBORS_COUNT))
            .collect();

        let futures = blocks
            .iter()
            .zip(contexts.iter())
            .map(|(block, context)| self.evaluate(block, context, metadata));
        let scores = futures::future::join_all(futures).await;

        debug_assert_eq!(scores.len(), blocks.len(), "one score per block");
        scores
    }

    /// Improvement of `corrected` over `original` in the same context.
    async fn evaluate_correction(
        &self,
        original: &ConversationBlock,
        corrected: &ConversationBlock,
        context: &[ConversationBlock],
    ) -> f64 {
        let metadata = EvaluationMetadata::default();
        let before = self.evaluate(original, context, &metadata).await;
        let after = self.evaluate(corrected, context, &metadata).await;
        let improvement = after.overall_score - before.overall_score;

        tracing::info!(
            block_id = %original.id,
            original_score = before.overall_score,
            corrected_score = after.overall_score,
            improvement,
            "evaluated correction"
        );
        improvement
    }
}

/// Up to `radius` blocks before and after `index`, excluding `index`.
#[must_use]
pub fn neighborhood(
    blocks: &[ConversationBlock],
    index: usize,
    radius: usize,
) -> Vec<ConversationBlock> {
    assert!(index < blocks.len(), "index out of bounds");

    let start = index.saturating_sub(radius);
    let end = (index + radius + 1).min(blocks.len());
    blocks[start..index]
        .iter()
        .chain(blocks[index + 1..end].iter())
        .cloned()
        .collect()
}

// =============================================================================
// Selection
// =============================================================================

/// Which evaluator the composition root builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluatorKind {
    /// Rules only
    Heuristic,
    /// Provider-rated
    Model,
    /// Heuristic with model escalation
    #[default]
    Composite,
}

/// Build the configured evaluator, wrapped in a cache when enabled.
///
/// # Errors
/// `ConfigError::MissingProvider` if the model evaluator is selected
/// without a provider. A composite without a provider is heuristic-only.
pub fn build_evaluator(
    config: &EvaluationConfig,
    provider: Option<Arc<dyn LLMProvider>>,
    clock: Clock,
) -> Result<Arc<dyn RelevanceEvaluator>, ConfigError> {
    let policy = ScoringPolicy::from_config(config);

    let evaluator: Arc<dyn RelevanceEvaluator> = match config.kind {
        EvaluatorKind::Heuristic => Arc::new(HeuristicEvaluator::new(policy, clock)),
        EvaluatorKind::Model => {
            let provider = provider.ok_or_else(|| ConfigError::missing_provider("model"))?;
            Arc::new(ModelEvaluator::new(policy, provider, clock))
        }
        EvaluatorKind::Composite => {
            let heuristic = HeuristicEvaluator::new(policy, clock.clone());
            let model = provider.map(|p| ModelEvaluator::new(policy, p, clock));
            Arc::new(
                CompositeEvaluator::new(heuristic, model)
                    .with_blend(config.composite_heuristic_weight, config.composite_model_weight),
            )
        }
    };

    tracing::info!(
        kind = ?config.kind,
        evaluator = evaluator.name(),
        cache_entries = config.cache_entries,
        "built relevance evaluator"
    );

    if config.cache_entries == 0 {
        Ok(evaluator)
    } else {
        Ok(Arc::new(CachedEvaluator::new(evaluator, config.cache_entries)))
    }
}

// =============================================================================
// Tests
// =============================================================================
