//! Cold Summaries - Lossy Archive Form of a Block
//!
//! `TigerStyle`: Only identity, scoring, and access metadata survive. The
//! content is reduced to head and tail snippets and cannot be recovered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::TIER_SUMMARY_SNIPPET_CHARS;
use crate::entities::{BlockSource, ConversationBlock, CorrectionNote, MemoryTier, ProcessingStatus};

/// What remains of a block once it reaches Cold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColdSummary {
    /// Block id
    pub id: String,
    /// Owning session
    pub session_id: String,
    /// Position within the session
    pub sequence_number: u64,
    /// Block creation time
    pub timestamp: DateTime<Utc>,
    /// Producer of the summarized content
    pub source: BlockSource,
    /// Originating message
    pub message_id: String,
    /// Last known relevance score
    pub relevance_score: Option<f64>,
    /// Retention multiplier
    pub retention_priority: f64,
    /// Retrievals so far
    pub access_count: u64,
    /// Last retrieval
    pub last_accessed: DateTime<Utc>,
    /// Corrections applied before archival
    pub correction_history: Vec<CorrectionNote>,
    /// Roles in order
    pub roles: Vec<String>,
    /// Messages summarized
    pub message_count: usize,
    /// Characters in the original content
    pub total_length: usize,
    /// Rendered summary line
    pub summary: String,
    /// When the summary was made
    pub archived_at: DateTime<Utc>,
}

impl ColdSummary {
    /// Summarize `block`.
    #[must_use]
    pub fn from_block(block: &ConversationBlock, now: DateTime<Utc>) -> Self {
        // A block that is already a summary keeps its original rendering.
        let summary = block
            .content
            .strip_prefix(SUMMARY_PREFIX)
            .map_or_else(|| render(block.source, &block.content), str::to_string);

        Self {
            id: block.id.clone(),
            session_id: block.session_id.clone(),
            sequence_number: block.sequence_number,
            timestamp: block.timestamp,
            source: block.source,
            message_id: block.message_id.clone(),
            relevance_score: block.relevance_score,
            retention_priority: block.retention_priority,
            access_count: block.access_count(),
            last_accessed: block.last_accessed(),
            correction_history: block.correction_history.clone(),
            roles: vec![block.source.to_string()],
            message_count: 1,
            total_length: block.content.chars().count(),
            summary,
            archived_at: now,
        }
    }

    /// Rebuild a block whose content is the summary line.
    #[must_use]
    pub fn to_block(&self) -> ConversationBlock {
        let mut block = ConversationBlock::new(
            self.session_id.clone(),
            self.sequence_number,
            format!("{SUMMARY_PREFIX}{}", self.summary),
            self.source,
            self.message_id.clone(),
            self.timestamp,
        )
        .with_id(self.id.clone())
        .with_retention_priority(self.retention_priority);

        block.relevance_score = self.relevance_score;
        block.correction_history = self.correction_history.clone();
        block.processing_status = ProcessingStatus::Archived;
        block.access_count = self.access_count;
        block.last_accessed = self.last_accessed;
        block.set_tier(MemoryTier::Cold);
        block
    }

    /// Record a retrieval.
    pub fn record_access(&mut self, now: DateTime<Utc>) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed = now;
    }

    /// Approximate bytes held.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.summary.len() + self.id.len() + self.session_id.len() + self.message_id.len()
    }
}

const SUMMARY_PREFIX: &str = "[Summary] ";

fn render(source: BlockSource, content: &str) -> String {
    let head: String = content.chars().take(TIER_SUMMARY_SNIPPET_CHARS).collect();
    let total = content.chars().count();
    let tail: String = content
        .chars()
        .skip(total.saturating_sub(TIER_SUMMARY_SNIPPET_CHARS))
        .collect();
    format!("{source}: {head}... -> {source}: {tail}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_summary_is_lossy() {
        let content = format!("{}{}", "a".repeat(150), "z".repeat(150));
        let mut block =
            ConversationBlock::new("s1", 7, content, BlockSource::User, "m7", t0()).with_id("b7");
        block.relevance_score = Some(0.35);

        let summary = ColdSummary::from_block(&block, t0());
        assert_eq!(summary.total_length, 300);
        assert_eq!(summary.message_count, 1);
        assert_eq!(summary.roles, vec!["user".to_string()]);
        assert_eq!(
            summary.summary,
            format!("user: {}... -> user: {}...", "a".repeat(100), "z".repeat(100))
        );

        let restored = summary.to_block();
        assert_eq!(restored.id, "b7");
        assert_eq!(restored.sequence_number, 7);
        assert_eq!(restored.relevance_score, Some(0.35));
        assert_eq!(restored.memory_tier(), MemoryTier::Cold);
        assert_eq!(restored.processing_status, ProcessingStatus::Archived);
        assert!(restored.content.starts_with("[Summary] user: aaa"));
        assert!(!restored.content.contains(&"a".repeat(150)));
    }

    #[test]
    fn test_resummarizing_keeps_rendering() {
        let block =
            ConversationBlock::new("s1", 1, "short note", BlockSource::Agent, "m1", t0()).with_id("b1");
        let first = ColdSummary::from_block(&block, t0());
        let second = ColdSummary::from_block(&first.to_block(), t0());
        assert_eq!(first.summary, second.summary);
    }

    #[test]
    fn test_access_survives_round_trip() {
        let block =
            ConversationBlock::new("s1", 1, "short note", BlockSource::Agent, "m1", t0()).with_id("b1");
        let mut summary = ColdSummary::from_block(&block, t0());
        summary.record_access(t0());
        summary.record_access(t0());
        assert_eq!(summary.to_block().access_count(), 2);
    }
}
