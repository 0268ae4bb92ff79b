//! Self-Correction - Find and Repair Degraded Conversation Content
//!
//! `TigerStyle`: Rate-limited, fault-tolerant, never fails its caller.
//!
//! One cycle is `analyze` (score the recent window of a session) followed by
//! `correct` (remove blocks decided Remove, repair blocks decided Review
//! through the provider). Every applied action lands in a bounded history
//! and is published as an event.

mod corrector;
mod history;
mod prompt;

pub use corrector::{Problem, SelfCorrector};
pub use history::CorrectionHistory;
pub use prompt::{factor_guidance, repair_request, REPAIR_SYSTEM_PROMPT};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a replacement block gets its relevance score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionScoring {
    /// Evaluate the replacement against the original's context
    #[default]
    Reevaluate,
    /// Original score times 1.5, unclamped
    OptimisticBoost,
}

/// Action taken on a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionKind {
    /// Block deleted
    Removal,
    /// Block replaced by a provider rewrite
    Improvement,
}

impl CorrectionKind {
    /// Wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Removal => "removal",
            Self::Improvement => "improvement",
        }
    }
}

/// One applied correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionEntry {
    /// What was done
    pub kind: CorrectionKind,
    /// Original block, then the replacement for improvements
    pub block_ids: Vec<String>,
    /// Owning session
    pub session_id: String,
    /// Evaluator explanation that triggered the action
    pub reason: String,
    /// When it was applied
    pub timestamp: DateTime<Utc>,
}

impl CorrectionEntry {
    /// Block the correction acted on.
    #[must_use]
    pub fn original_id(&self) -> &str {
        self.block_ids.first().map_or("", String::as_str)
    }

    /// Replacement block, for improvements.
    #[must_use]
    pub fn replacement_id(&self) -> Option<&str> {
        self.block_ids.get(1).map(String::as_str)
    }
}
