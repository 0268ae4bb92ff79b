//! Heuristic Evaluator - Rule-Based Scoring Without External Calls

use std::collections::HashSet;

use async_trait::async_trait;

use super::lexicon::{self, is_question, jaccard, keywords, word_count};
use super::{EvaluationMetadata, FactorScores, RelevanceEvaluator, RelevanceScore, ScoringPolicy};
use crate::constants::{
    HEURISTIC_QUESTION_LOOKBACK_COUNT, HEURISTIC_SEMANTIC_CONTEXT_COUNT, TIME_MS_PER_DAY,
    TIME_MS_PER_HOUR, TIME_MS_PER_MIN,
};
use crate::dst::{elapsed_ms, Clock};
use crate::entities::{BlockSource, ConversationBlock};

/// Rule-based evaluator.
///
/// Deterministic for a fixed clock: keyword overlap, phrase detection,
/// length banding, and age bands.
#[derive(Debug, Clone)]
pub struct HeuristicEvaluator {
    policy: ScoringPolicy,
    clock: Clock,
}

impl HeuristicEvaluator {
    /// Create a heuristic evaluator.
    #[must_use]
    pub fn new(policy: ScoringPolicy, clock: Clock) -> Self {
        Self { policy, clock }
    }

    /// Scoring policy in use.
    #[must_use]
    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Score all five factors without combining them.
    #[must_use]
    pub fn factors(
        &self,
        block: &ConversationBlock,
        context: &[ConversationBlock],
        metadata: &EvaluationMetadata,
    ) -> FactorScores {
        let lowered = block.content.to_lowercase();
        FactorScores {
            semantic_alignment: semantic_alignment(block, &lowered, context),
            temporal_relevance: self.temporal_relevance(block, &lowered),
            goal_contribution: goal_contribution(block, &lowered, context, metadata.goal.as_deref()),
            information_quality: information_quality(&block.content, &lowered),
            factual_consistency: factual_consistency(block, &lowered, context),
        }
    }

    fn temporal_relevance(&self, block: &ConversationBlock, lowered: &str) -> f64 {
        let now = self.clock.now();
        let age = age_band(block.age_ms(now));

        let access = match block.access_count() {
            0 => 0.5,
            1..=2 => 0.7,
            3..=9 => 0.9,
            _ => 1.0,
        };

        let since_access = elapsed_ms(block.last_accessed(), now);
        let bonus = if since_access < 30 * TIME_MS_PER_MIN {
            0.2
        } else if since_access < 2 * TIME_MS_PER_HOUR {
            0.1
        } else {
            0.0
        };

        let score = age * 0.5 + access * 0.3 + bonus * 0.2;
        if lexicon::temporal().any(lowered) {
            (score * 1.2).min(1.0)
        } else {
            score
        }
    }
}

#[async_trait]
impl RelevanceEvaluator for HeuristicEvaluator {
    #[tracing::instrument(skip(self, block, context, metadata), fields(block_id = %block.id))]
    async fn evaluate(
        &self,
        block: &ConversationBlock,
        context: &[ConversationBlock],
        metadata: &EvaluationMetadata,
    ) -> RelevanceScore {
        let factors = self.factors(block, context, metadata);
        let score = self.policy.score(factors, metadata);

        tracing::debug!(
            score = score.overall_score,
            decision = %score.decision,
            "heuristic evaluation"
        );
        score
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

// =============================================================================
// Factors
// =============================================================================

/// Block age band: 1.0 under 5 minutes down to 0.1 past a week.
pub(crate) fn age_band(age_ms: u64) -> f64 {
    if age_ms < 5 * TIME_MS_PER_MIN {
        1.0
    } else if age_ms < TIME_MS_PER_HOUR {
        0.9
    } else if age_ms < 6 * TIME_MS_PER_HOUR {
        0.7
    } else if age_ms < TIME_MS_PER_DAY {
        0.5
    } else if age_ms < 7 * TIME_MS_PER_DAY {
        0.3
    } else {
        0.1
    }
}

fn semantic_alignment(block: &ConversationBlock, lowered: &str, context: &[ConversationBlock]) -> f64 {
    if context.is_empty() {
        return 0.8;
    }

    let block_keywords = keywords(&block.content);
    let recent = &context[context.len().saturating_sub(HEURISTIC_SEMANTIC_CONTEXT_COUNT)..];
    let context_keywords: HashSet<String> = recent
        .iter()
        .flat_map(|b| keywords(&b.content))
        .collect();
    if block_keywords.is_empty() || context_keywords.is_empty() {
        return 0.5;
    }

    let mut similarity = jaccard(&block_keywords, &context_keywords);

    if lexicon::greetings().any(lowered) {
        similarity *= 0.7;
    }
    if lexicon::closings().any(lowered) {
        similarity *= 0.7;
    }
    if lexicon::errors().any(lowered) {
        similarity = similarity.max(0.6);
    }

    0.3 + similarity * 0.6
}

#[allow(clippy::cast_precision_loss)]
fn goal_contribution(
    block: &ConversationBlock,
    lowered: &str,
    context: &[ConversationBlock],
    goal: Option<&str>,
) -> f64 {
    if is_question(lowered) {
        return 0.9;
    }

    let recent = &context[context.len().saturating_sub(HEURISTIC_QUESTION_LOOKBACK_COUNT)..];
    let follows_question = recent
        .iter()
        .rev()
        .any(|b| is_question(&b.content.to_lowercase()));
    let is_answer = follows_question
        && context.last().is_some_and(|last| block.timestamp > last.timestamp)
        && block.source == BlockSource::Agent;
    if is_answer {
        return 0.95;
    }

    if let Some(goal) = goal.map(str::to_lowercase) {
        if !goal.is_empty() && lowered.contains(&goal) {
            return 0.85;
        }
    }

    let hits = lexicon::tasks().count(lowered);
    0.5 + (hits as f64 / lexicon::TASK_PHRASES.len() as f64) * 0.4
}

#[allow(clippy::cast_precision_loss)]
fn information_quality(content: &str, lowered: &str) -> f64 {
    let length = match word_count(content) {
        0..=2 => 0.2,
        3..=9 => 0.5,
        10..=49 => 0.8,
        50..=199 => 1.0,
        200..=499 => 0.8,
        _ => 0.6,
    };

    let penalty = match lexicon::fillers().count(lowered) {
        0 => 0.0,
        1..=2 => 0.1,
        _ => 0.3,
    };

    let substance =
        lexicon::substance().count(lowered) as f64 / lexicon::SUBSTANCE_PHRASES.len() as f64;
    let code = if lexicon::code().any(lowered) { 0.2 } else { 0.0 };

    (length * 0.4 + substance * 0.4 + code * 0.2 - penalty).clamp(0.0, 1.0)
}

fn factual_consistency(block: &ConversationBlock, lowered: &str, context: &[ConversationBlock]) -> f64 {
    if context.is_empty() {
        return 0.9;
    }

    if lexicon::contradictions().any(lowered) {
        // Self-correction by the assistant is healthy; a contradiction
        // raised against it is not.
        return if block.source == BlockSource::Agent { 0.8 } else { 0.4 };
    }

    if lexicon::errors().any(lowered) {
        return 0.6;
    }

    let confidence = lexicon::confidence().count(lowered);
    let uncertainty = lexicon::uncertainty().count(lowered);
    if uncertainty > confidence {
        0.7
    } else if confidence > 0 {
        0.95
    } else {
        0.85
    }
}

// =============================================================================
// Tests
// =============================================================================
