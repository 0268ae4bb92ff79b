//! Composite Evaluator - Heuristic First, Model on Borderline Scores

use async_trait::async_trait;

use super::heuristic::HeuristicEvaluator;
use super::model::ModelEvaluator;
use super::{EvaluationMetadata, RelevanceEvaluator, RelevanceScore};
use crate::constants::{
    COMPOSITE_BORDERLINE_SCORE_HIGH, COMPOSITE_BORDERLINE_SCORE_LOW,
    COMPOSITE_HEURISTIC_WEIGHT_DEFAULT, COMPOSITE_MODEL_TRIGGER_SCORE_MAX,
    COMPOSITE_MODEL_WEIGHT_DEFAULT,
};
use crate::entities::ConversationBlock;

/// Evaluator that escalates uncertain heuristic scores to a model.
///
/// Without a model it behaves exactly like the heuristic evaluator.
#[derive(Debug, Clone)]
pub struct CompositeEvaluator {
    heuristic: HeuristicEvaluator,
    model: Option<ModelEvaluator>,
    heuristic_weight: f64,
    model_weight: f64,
}

impl CompositeEvaluator {
    /// Create a composite with the default 0.3 / 0.7 blend.
    #[must_use]
    pub fn new(heuristic: HeuristicEvaluator, model: Option<ModelEvaluator>) -> Self {
        Self {
            heuristic,
            model,
            heuristic_weight: COMPOSITE_HEURISTIC_WEIGHT_DEFAULT,
            model_weight: COMPOSITE_MODEL_WEIGHT_DEFAULT,
        }
    }

    /// Set the blend weights. They are normalized to sum to 1.
    ///
    /// # Panics
    /// Panics if either weight is negative or non-finite, or both are zero.
    #[must_use]
    pub fn with_blend(mut self, heuristic_weight: f64, model_weight: f64) -> Self {
        assert!(
            heuristic_weight.is_finite() && heuristic_weight >= 0.0,
            "heuristic weight must be finite and non-negative"
        );
        assert!(
            model_weight.is_finite() && model_weight >= 0.0,
            "model weight must be finite and non-negative"
        );
        let total = heuristic_weight + model_weight;
        assert!(total > 0.0, "blend weights must not both be zero");

        self.heuristic_weight = heuristic_weight / total;
        self.model_weight = model_weight / total;
        self
    }

    /// Normalized `(heuristic, model)` weights.
    #[must_use]
    pub fn blend(&self) -> (f64, f64) {
        (self.heuristic_weight, self.model_weight)
    }

    /// Whether a model is attached.
    #[must_use]
    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    fn needs_model(overall: f64, metadata: &EvaluationMetadata) -> bool {
        let borderline =
            overall > COMPOSITE_BORDERLINE_SCORE_LOW && overall < COMPOSITE_BORDERLINE_SCORE_HIGH;
        overall < COMPOSITE_MODEL_TRIGGER_SCORE_MAX || borderline || metadata.force_model
    }

    fn combine(&self, heuristic: RelevanceScore, model: RelevanceScore) -> RelevanceScore {
        let (h, m) = (self.heuristic_weight, self.model_weight);
        RelevanceScore {
            overall_score: heuristic.overall_score * h + model.overall_score * m,
            factors: heuristic.factors.blend(h, &model.factors, m),
            decision: heuristic.decision.more_conservative(model.decision),
            explanation: format!(
                "Composite evaluation (H:{h:.1}, L:{m:.1}): {} | Model: {}",
                heuristic.explanation, model.explanation
            ),
        }
    }
}

#[async_trait]
impl RelevanceEvaluator for CompositeEvaluator {
    #[tracing::instrument(skip(self, block, context, metadata), fields(block_id = %block.id))]
    async fn evaluate(
        &self,
        block: &ConversationBlock,
        context: &[ConversationBlock],
        metadata: &EvaluationMetadata,
    ) -> RelevanceScore {
        let heuristic = self.heuristic.evaluate(block, context, metadata).await;

        let Some(model) = &self.model else {
            return heuristic;
        };
        if !Self::needs_model(heuristic.overall_score, metadata) {
            return heuristic;
        }

        match model.try_evaluate(block, context, metadata).await {
            Ok(model_score) => {
                let combined = self.combine(heuristic, model_score);
                tracing::debug!(
                    score = combined.overall_score,
                    decision = %combined.decision,
                    "composite evaluation"
                );
                combined
            }
            Err(e) => {
                tracing::warn!(error = %e, "model evaluation failed, using heuristic only");
                heuristic
            }
        }
    }

    fn name(&self) -> &'static str {
        "composite"
    }
}

// =============================================================================
// Tests
// =============================================================================
