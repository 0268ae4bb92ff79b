//! Model Evaluator - Provider-Rated Semantic, Goal, and Factual Scores
//!
//! `TigerStyle`: Three rating calls per block, issued concurrently. A failed
//! call degrades to a fixed default for that factor; temporal and
//! information factors are computed locally.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;

use super::heuristic::age_band;
use super::lexicon::{self, word_count, FACT_PATTERNS};
use super::{EvaluationMetadata, FactorScores, RelevanceEvaluator, RelevanceScore, ScoringPolicy};
use crate::constants::{
    HEURISTIC_QUESTION_LOOKBACK_COUNT, HEURISTIC_SEMANTIC_CONTEXT_COUNT, MODEL_CONTEXT_LINE_CHARS_MAX,
    MODEL_FACTS_COUNT_MAX, MODEL_FACTUAL_SCORE_FALLBACK, MODEL_FACTUAL_SCORE_UNCHECKED,
    MODEL_GOAL_SCORE_FALLBACK, MODEL_GOAL_SCORE_UNKNOWN, MODEL_RATING_TEMPERATURE,
    MODEL_RATING_TOKENS_MAX, MODEL_SEMANTIC_SCORE_FALLBACK, MODEL_SEMANTIC_SCORE_NO_CONTEXT,
};
use crate::dst::Clock;
use crate::entities::{BlockSource, ConversationBlock};
use crate::llm::{CompletionRequest, LLMProvider, ProviderError};

/// System prompt for every rating request.
pub const RATING_SYSTEM_PROMPT: &str =
    "You are a relevance evaluator. Respond only with numeric scores as requested.";

/// Evaluator that asks a provider for factor ratings.
#[derive(Debug, Clone)]
pub struct ModelEvaluator {
    policy: ScoringPolicy,
    provider: Arc<dyn LLMProvider>,
    clock: Clock,
}

/// Outcome of one factor's rating call.
#[derive(Debug)]
enum Rating {
    /// No call was needed; the value is a fixed score
    Skipped(f64),
    /// Provider answered with a usable number
    Rated(f64),
    /// Provider failed; the value is the fallback
    Failed(f64, ProviderError),
}

impl Rating {
    fn value(&self) -> f64 {
        match self {
            Self::Skipped(v) | Self::Rated(v) | Self::Failed(v, _) => *v,
        }
    }
}

impl ModelEvaluator {
    /// Create a model evaluator.
    #[must_use]
    pub fn new(policy: ScoringPolicy, provider: Arc<dyn LLMProvider>, clock: Clock) -> Self {
        Self {
            policy,
            provider,
            clock,
        }
    }

    /// Evaluate, failing only if every attempted provider call failed.
    ///
    /// # Errors
    /// Returns the last `ProviderError` when no rating call succeeded and at
    /// least one was attempted.
    pub async fn try_evaluate(
        &self,
        block: &ConversationBlock,
        context: &[ConversationBlock],
        metadata: &EvaluationMetadata,
    ) -> Result<RelevanceScore, ProviderError> {
        let (semantic, goal, factual) = tokio::join!(
            self.rate_semantic(block, context),
            self.rate_goal(block, context, metadata.goal.as_deref()),
            self.rate_factual(block, context),
        );

        let ratings = [&semantic, &goal, &factual];
        let attempted = ratings
            .iter()
            .filter(|r| !matches!(r, Rating::Skipped(_)))
            .count();
        let failed: Vec<&ProviderError> = ratings
            .iter()
            .filter_map(|r| match r {
                Rating::Failed(_, e) => Some(e),
                _ => None,
            })
            .collect();

        if attempted > 0 && failed.len() == attempted {
            if let Some(error) = failed.last() {
                return Err((*error).clone());
            }
        }
        for error in &failed {
            tracing::warn!(block_id = %block.id, error = %error, "rating call failed, using fallback");
        }

        let lowered = block.content.to_lowercase();
        let factors = FactorScores {
            semantic_alignment: semantic.value(),
            temporal_relevance: self.temporal_relevance(block, &lowered),
            goal_contribution: goal.value(),
            information_quality: information_quality(&block.content, &lowered),
            factual_consistency: factual.value(),
        };
        Ok(self.policy.score(factors, metadata))
    }

    async fn rate_semantic(&self, block: &ConversationBlock, context: &[ConversationBlock]) -> Rating {
        if context.is_empty() {
            return Rating::Skipped(MODEL_SEMANTIC_SCORE_NO_CONTEXT);
        }

        let recent = &context[context.len().saturating_sub(HEURISTIC_SEMANTIC_CONTEXT_COUNT)..];
        let prompt = format!(
            "Evaluate the semantic alignment of this message with the conversation context.\n\n\
             Context Summary:\n{}\n\n\
             Current Message:\n{}\n\n\
             Rate the semantic alignment from 0 to 1, where:\n\
             - 0 = Completely unrelated to the conversation\n\
             - 0.5 = Somewhat related but tangential\n\
             - 1 = Perfectly aligned with the conversation flow\n\n\
             Respond with just a number between 0 and 1.",
            summarize_context(recent),
            block.content
        );
        self.rate(&prompt, MODEL_SEMANTIC_SCORE_FALLBACK).await
    }

    async fn rate_goal(
        &self,
        block: &ConversationBlock,
        context: &[ConversationBlock],
        goal: Option<&str>,
    ) -> Rating {
        let Some(goal) = goal.map(str::to_string).or_else(|| infer_goal(context)) else {
            return Rating::Skipped(MODEL_GOAL_SCORE_UNKNOWN);
        };

        let prompt = format!(
            "Evaluate how well this message contributes to the conversation goal.\n\n\
             Goal: {goal}\n\n\
             Message:\n{}\n\n\
             Rate the contribution from 0 to 1, where:\n\
             - 0 = Completely unrelated or counterproductive\n\
             - 0.5 = Somewhat helpful but indirect\n\
             - 1 = Directly addresses and advances the goal\n\n\
             Respond with just a number between 0 and 1.",
            block.content
        );
        self.rate(&prompt, MODEL_GOAL_SCORE_FALLBACK).await
    }

    async fn rate_factual(&self, block: &ConversationBlock, context: &[ConversationBlock]) -> Rating {
        if context.is_empty() {
            return Rating::Skipped(MODEL_FACTUAL_SCORE_UNCHECKED);
        }
        let facts = extract_facts(context);
        if facts.is_empty() {
            return Rating::Skipped(MODEL_FACTUAL_SCORE_UNCHECKED);
        }

        let facts_json =
            serde_json::to_string_pretty(&facts).unwrap_or_else(|_| facts.join("\n"));
        let prompt = format!(
            "Check if this message is factually consistent with the established facts in the conversation.\n\n\
             Established Facts:\n{facts_json}\n\n\
             Current Message:\n{}\n\n\
             Rate the factual consistency from 0 to 1, where:\n\
             - 0 = Contains clear contradictions\n\
             - 0.5 = Some questionable claims\n\
             - 1 = Fully consistent with established facts\n\n\
             Respond with just a number between 0 and 1.",
            block.content
        );
        self.rate(&prompt, MODEL_FACTUAL_SCORE_FALLBACK).await
    }

    async fn rate(&self, prompt: &str, fallback: f64) -> Rating {
        let request = CompletionRequest::new(prompt)
            .with_system(RATING_SYSTEM_PROMPT)
            .with_max_tokens(MODEL_RATING_TOKENS_MAX)
            .with_temperature(MODEL_RATING_TEMPERATURE);

        match self.provider.complete(&request).await {
            Ok(response) => match parse_rating(&response.content) {
                Some(value) => Rating::Rated(value),
                None => Rating::Failed(
                    fallback,
                    ProviderError::invalid_response(format!(
                        "expected a number, got {:?}",
                        response.content
                    )),
                ),
            },
            Err(e) => Rating::Failed(fallback, e),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn temporal_relevance(&self, block: &ConversationBlock, lowered: &str) -> f64 {
        let band = age_band(block.age_ms(self.clock.now()));
        if lexicon::temporal().any(lowered) {
            return (band * 1.2).min(1.0);
        }
        let access = (block.access_count() as f64 / 10.0).min(1.0);
        band * 0.7 + access * 0.3
    }
}

#[async_trait]
impl RelevanceEvaluator for ModelEvaluator {
    #[tracing::instrument(skip(self, block, context, metadata), fields(block_id = %block.id, provider = self.provider.name()))]
    async fn evaluate(
        &self,
        block: &ConversationBlock,
        context: &[ConversationBlock],
        metadata: &EvaluationMetadata,
    ) -> RelevanceScore {
        match self.try_evaluate(block, context, metadata).await {
            Ok(score) => score,
            Err(e) => {
                tracing::warn!(error = %e, "provider unavailable, using fallback ratings");
                let lowered = block.content.to_lowercase();
                let factors = FactorScores {
                    semantic_alignment: if context.is_empty() {
                        MODEL_SEMANTIC_SCORE_NO_CONTEXT
                    } else {
                        MODEL_SEMANTIC_SCORE_FALLBACK
                    },
                    temporal_relevance: self.temporal_relevance(block, &lowered),
                    goal_contribution: MODEL_GOAL_SCORE_FALLBACK,
                    information_quality: information_quality(&block.content, &lowered),
                    factual_consistency: MODEL_FACTUAL_SCORE_FALLBACK,
                };
                self.policy.score(factors, metadata)
            }
        }
    }

    fn name(&self) -> &'static str {
        "model"
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// First decimal number in `text`, clamped to [0, 1].
fn parse_rating(text: &str) -> Option<f64> {
    static NUMBER: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?|\.\d+").expect("invalid number regex"));

    let value: f64 = NUMBER.find(text)?.as_str().parse().ok()?;
    value.is_finite().then(|| value.clamp(0.0, 1.0))
}

/// `source: content` lines, content cut to 200 characters.
fn summarize_context(context: &[ConversationBlock]) -> String {
    if context.is_empty() {
        return "No prior context.".to_string();
    }

    context
        .iter()
        .map(|b| {
            let content = if b.content.chars().count() > MODEL_CONTEXT_LINE_CHARS_MAX {
                let head: String = b.content.chars().take(MODEL_CONTEXT_LINE_CHARS_MAX).collect();
                format!("{head}...")
            } else {
                b.content.clone()
            };
            format!("{}: {content}", b.source)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Most recent user question among the last five context blocks.
fn infer_goal(context: &[ConversationBlock]) -> Option<String> {
    let recent = &context[context.len().saturating_sub(HEURISTIC_QUESTION_LOOKBACK_COUNT)..];
    recent
        .iter()
        .rev()
        .find(|b| b.source == BlockSource::User && b.content.contains('?'))
        .map(|b| format!("Answer: {}", b.content))
}

/// Short declarative sentences from context, most recent last.
fn extract_facts(context: &[ConversationBlock]) -> Vec<String> {
    let mut facts = Vec::new();
    for block in context {
        let lowered = block.content.to_lowercase();
        if !FACT_PATTERNS.iter().any(|p| lowered.contains(p)) {
            continue;
        }
        for sentence in lowered.split('.') {
            let words = word_count(sentence);
            if words > 3 && words < 30 {
                facts.push(sentence.trim().to_string());
            }
        }
    }

    let skip = facts.len().saturating_sub(MODEL_FACTS_COUNT_MAX);
    facts.split_off(skip)
}

#[allow(clippy::cast_precision_loss)]
fn information_quality(content: &str, lowered: &str) -> f64 {
    let length = match word_count(content) {
        0..=2 => 0.3,
        3..=9 => 0.7,
        10..=199 => 1.0,
        200..=499 => 0.8,
        _ => 0.6,
    };
    let substance = if lexicon::model_substance().any(lowered) { 0.8 } else { 0.5 };
    let question = if content.contains('?') { 0.9 } else { 0.7 };

    length * 0.4 + substance * 0.4 + question * 0.2
}

// =============================================================================
// Tests
// =============================================================================
