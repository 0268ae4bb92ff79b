//! ConversationBlock - The Cached, Scored Unit of Conversation
//!
//! `TigerStyle`: Tier and access metadata are crate-private. Only storage
//! migration changes the tier and only storage retrieval records access.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{
    BLOCK_ARCHIVE_AGE_MS_MIN, BLOCK_ARCHIVE_RETENTION_SCORE_MAX, BLOCK_COMPRESS_ACCESS_COUNT_MAX,
    BLOCK_COMPRESS_AGE_MS_MIN, BLOCK_COMPRESS_RETENTION_SCORE_MAX,
    BLOCK_RETENTION_PRIORITY_DEFAULT, CONTENT_BYTES_MAX, ID_BYTES_MAX, TIME_MS_PER_DAY,
};
use crate::dst::elapsed_ms;

// =============================================================================
// Memory Tier
// =============================================================================

/// Storage tier, fastest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTier {
    /// Small, uncompressed
    Hot,
    /// Medium, compressed
    Warm,
    /// Large, lossy summaries only; terminal
    Cold,
}

impl MemoryTier {
    /// All tiers, fastest first.
    pub const ALL: [MemoryTier; 3] = [Self::Hot, Self::Warm, Self::Cold];

    /// Lowercase tier name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Warm => "warm",
            Self::Cold => "cold",
        }
    }

    /// The tier an overflowing entry cascades into. `None` for Cold.
    #[must_use]
    pub fn next_down(&self) -> Option<Self> {
        match self {
            Self::Hot => Some(Self::Warm),
            Self::Warm => Some(Self::Cold),
            Self::Cold => None,
        }
    }

    /// Position in `ALL`.
    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            Self::Hot => 0,
            Self::Warm => 1,
            Self::Cold => 2,
        }
    }
}

impl fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Source / Status
// =============================================================================

/// Who produced a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockSource {
    /// End user
    User,
    /// The assistant
    Agent,
    /// A tool
    Tool,
    /// System instructions
    System,
}

impl BlockSource {
    /// Lowercase source name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::Tool => "tool",
            Self::System => "system",
        }
    }
}

impl fmt::Display for BlockSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a block.
///
/// `Pending -> Evaluated -> Retained | Discarded | Compressed | Archived`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    /// Not yet scored
    #[default]
    Pending,
    /// Scored
    Evaluated,
    /// Kept at full fidelity
    Retained,
    /// Marked for deletion
    Discarded,
    /// Stored compressed in Warm
    Compressed,
    /// Summarized into Cold
    Archived,
}

/// One entry of a block's correction history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionNote {
    /// When the correction happened
    pub timestamp: DateTime<Utc>,
    /// Why
    pub reason: String,
    /// What was done (`"removed"`, `"improved"`, ...)
    pub action: String,
}

// =============================================================================
// ConversationBlock
// =============================================================================

/// The unit cached in tiers and scored by evaluators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationBlock {
    /// Unique block id
    pub id: String,
    /// Position within the session (monotonic)
    pub sequence_number: u64,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Owning session
    pub session_id: String,
    /// Text
    pub content: String,
    /// Content format (`text`, `json`, `markdown`, ...)
    pub content_type: String,
    /// Producer
    pub source: BlockSource,
    /// Originating message
    pub message_id: String,
    /// Tool that produced the content, if any
    #[serde(default)]
    pub tool_name: Option<String>,
    /// Last overall relevance score; `None` until evaluated
    #[serde(default)]
    pub relevance_score: Option<f64>,
    /// Producer's confidence in the content
    #[serde(default)]
    pub confidence_score: Option<f64>,
    /// Free-form relevance tags
    #[serde(default)]
    pub relevance_tags: Vec<String>,
    pub(crate) memory_tier: MemoryTier,
    pub(crate) access_count: u64,
    pub(crate) last_accessed: DateTime<Utc>,
    /// Multiplier on the retention score
    pub retention_priority: f64,
    /// Compressed payload size while in Warm
    #[serde(default)]
    pub compressed_size: Option<usize>,
    /// Blocks this one derives from
    #[serde(default)]
    pub parent_blocks: Vec<String>,
    /// Blocks derived from this one
    #[serde(default)]
    pub child_blocks: Vec<String>,
    /// Lifecycle status
    #[serde(default)]
    pub processing_status: ProcessingStatus,
    /// Explanation of the last evaluation
    #[serde(default)]
    pub evaluation_reason: Option<String>,
    /// Corrections applied to this block
    #[serde(default)]
    pub correction_history: Vec<CorrectionNote>,
    /// String metadata (correction lineage uses `improved`,
    /// `original_content`, `improvement_reason`)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ConversationBlock {
    /// Create a block with a fresh id, placed in Hot.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        sequence_number: u64,
        content: impl Into<String>,
        source: BlockSource,
        message_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sequence_number,
            timestamp: now,
            session_id: session_id.into(),
            content: content.into(),
            content_type: "text".to_string(),
            source,
            message_id: message_id.into(),
            tool_name: None,
            relevance_score: None,
            confidence_score: None,
            relevance_tags: Vec::new(),
            memory_tier: MemoryTier::Hot,
            access_count: 0,
            last_accessed: now,
            retention_priority: BLOCK_RETENTION_PRIORITY_DEFAULT,
            compressed_size: None,
            parent_blocks: Vec::new(),
            child_blocks: Vec::new(),
            processing_status: ProcessingStatus::Pending,
            evaluation_reason: None,
            correction_history: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Override the generated id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set an initial relevance score.
    #[must_use]
    pub fn with_relevance_score(mut self, score: f64) -> Self {
        self.relevance_score = Some(score);
        self
    }

    /// Set the retention priority multiplier.
    #[must_use]
    pub fn with_retention_priority(mut self, priority: f64) -> Self {
        self.retention_priority = priority;
        self
    }

    /// Add a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Current tier.
    #[must_use]
    pub fn memory_tier(&self) -> MemoryTier {
        self.memory_tier
    }

    /// Retrievals so far.
    #[must_use]
    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    /// Time of the last retrieval (creation time if never retrieved).
    #[must_use]
    pub fn last_accessed(&self) -> DateTime<Utc> {
        self.last_accessed
    }

    /// Milliseconds since creation.
    #[must_use]
    pub fn age_ms(&self, now: DateTime<Utc>) -> u64 {
        elapsed_ms(self.timestamp, now)
    }

    pub(crate) fn record_access(&mut self, now: DateTime<Utc>) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed = now;
    }

    pub(crate) fn set_tier(&mut self, tier: MemoryTier) {
        self.memory_tier = tier;
    }

    /// Append a correction history entry.
    pub fn add_correction(
        &mut self,
        reason: impl Into<String>,
        action: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.correction_history.push(CorrectionNote {
            timestamp: now,
            reason: reason.into(),
            action: action.into(),
        });
    }

    /// Dynamic retention score in [0, 1].
    ///
    /// `(base*0.6 + recency*0.2 + access*0.2) * retention_priority`, where
    /// recency decays linearly over the 24h since the last access.
    #[must_use]
    pub fn retention_score(&self, now: DateTime<Utc>) -> f64 {
        let base = self.relevance_score.unwrap_or(0.5);
        #[allow(clippy::cast_precision_loss)]
        let recency = {
            let since_access = elapsed_ms(self.last_accessed, now) as f64;
            (1.0 - since_access / TIME_MS_PER_DAY as f64).max(0.0)
        };
        #[allow(clippy::cast_precision_loss)]
        let access = (self.access_count as f64 / 10.0).min(1.0);

        let score = (base * 0.6 + recency * 0.2 + access * 0.2) * self.retention_priority;
        score.clamp(0.0, 1.0)
    }

    /// Hot, older than 6h, rarely accessed, and not strongly retained.
    #[must_use]
    pub fn should_compress(&self, now: DateTime<Utc>) -> bool {
        self.memory_tier == MemoryTier::Hot
            && self.age_ms(now) > BLOCK_COMPRESS_AGE_MS_MIN
            && self.access_count < BLOCK_COMPRESS_ACCESS_COUNT_MAX
            && self.retention_score(now) < BLOCK_COMPRESS_RETENTION_SCORE_MAX
    }

    /// Not Cold, older than 24h, never accessed, and weakly retained.
    #[must_use]
    pub fn should_archive(&self, now: DateTime<Utc>) -> bool {
        self.memory_tier != MemoryTier::Cold
            && self.age_ms(now) > BLOCK_ARCHIVE_AGE_MS_MIN
            && self.access_count == 0
            && self.retention_score(now) < BLOCK_ARCHIVE_RETENTION_SCORE_MAX
    }

    /// Check structural validity.
    ///
    /// # Errors
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("block id must not be empty".into());
        }
        if self.id.len() > ID_BYTES_MAX {
            return Err(format!("block id exceeds {ID_BYTES_MAX} bytes"));
        }
        if self.session_id.is_empty() {
            return Err(format!("block {} has an empty session id", self.id));
        }
        if self.content.is_empty() {
            return Err(format!("block {} has empty content", self.id));
        }
        if self.content.len() > CONTENT_BYTES_MAX {
            return Err(format!(
                "block {} content {} bytes exceeds {CONTENT_BYTES_MAX}",
                self.id,
                self.content.len()
            ));
        }
        if let Some(score) = self.relevance_score {
            if !score.is_finite() || score < 0.0 {
                return Err(format!("block {} has invalid relevance score {score}", self.id));
            }
        }
        if !self.retention_priority.is_finite() || self.retention_priority < 0.0 {
            return Err(format!(
                "block {} has invalid retention priority {}",
                self.id, self.retention_priority
            ));
        }
        Ok(())
    }

    /// One-line summary for logs.
    #[must_use]
    pub fn to_summary(&self) -> String {
        let short_id: String = self.id.chars().take(8).collect();
        let score = self
            .relevance_score
            .map_or_else(|| "Unscored".to_string(), |s| format!("Score: {s:.2}"));
        format!(
            "Block {short_id} | Seq: {} | Source: {} | {score} | Tier: {}",
            self.sequence_number, self.source, self.memory_tier
        )
    }
}
