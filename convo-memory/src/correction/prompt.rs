//! Repair Prompt - Targeted Rewrite Instructions
//!
//! The prompt quotes the block as `SOURCE: content`, summarizes the most
//! recent context, and names the weakest factor with matching guidance.

use std::fmt::Write as _;

use crate::constants::{
    CORRECTION_REPAIR_SNIPPETS_COUNT, CORRECTION_REPAIR_SNIPPET_CHARS, CORRECTION_REPAIR_TEMPERATURE,
    CORRECTION_REPAIR_TOKENS_MAX,
};
use crate::entities::ConversationBlock;
use crate::evaluation::{Factor, RelevanceScore};
use crate::llm::CompletionRequest;

/// System prompt for every repair request.
pub const REPAIR_SYSTEM_PROMPT: &str = "You are a conversation improver. Improve the given response to address the identified issues while maintaining the original intent.";

/// What to fix for a weak factor.
#[must_use]
pub fn factor_guidance(factor: Factor) -> &'static str {
    match factor {
        Factor::SemanticAlignment => {
            "Make the response more relevant to the conversation topic and context."
        }
        Factor::TemporalRelevance => {
            "Update any time-sensitive information and remove outdated references."
        }
        Factor::GoalContribution => "Focus on addressing the user's actual question or goal.",
        Factor::InformationQuality => "Provide more specific, detailed, and useful information.",
        Factor::FactualConsistency => "Correct any factual errors or inconsistencies.",
    }
}

/// Build the repair request for `block` given its score and neighbors.
#[must_use]
pub fn repair_request(
    block: &ConversationBlock,
    score: &RelevanceScore,
    context: &[ConversationBlock],
) -> CompletionRequest {
    let (weakest, _) = score.factors.weakest();

    let mut body = String::from("Improve this conversation response:\n\n");
    let _ = write!(
        body,
        "Current Response:\n{}: {}\n\nRecent Context:\n",
        block.source.as_str().to_uppercase(),
        block.content
    );

    if context.is_empty() {
        body.push_str("No context available\n");
    } else {
        let skip = context.len().saturating_sub(CORRECTION_REPAIR_SNIPPETS_COUNT);
        for neighbor in &context[skip..] {
            let snippet: String = neighbor
                .content
                .chars()
                .take(CORRECTION_REPAIR_SNIPPET_CHARS)
                .collect();
            let _ = writeln!(body, "- {snippet}...");
        }
    }

    let _ = write!(
        body,
        "\nIssue Identified: {}\nMain Problem: Weak {}\n\nImprovement Needed: {}\n\n\
         Provide an improved version that addresses these issues while maintaining the helpful intent.",
        score.explanation,
        weakest.display_name(),
        factor_guidance(weakest),
    );

    CompletionRequest::new(body)
        .with_system(REPAIR_SYSTEM_PROMPT)
        .with_temperature(CORRECTION_REPAIR_TEMPERATURE)
        .with_max_tokens(CORRECTION_REPAIR_TOKENS_MAX)
}
