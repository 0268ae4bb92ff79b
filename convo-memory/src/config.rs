//! Memory Configuration
//!
//! `TigerStyle`: Sensible defaults, builder pattern, explicit over implicit.
//!
//! Every section defaults from `constants.rs`, deserializes with missing
//! fields filled in, and validates before use.
//!
//! # Example
//!
//! ```rust
//! use convo_memory::config::MemoryConfig;
//!
//! let config = MemoryConfig::from_json(r#"{ "tiers": { "hot_capacity": 50 } }"#).unwrap();
//! assert_eq!(config.tiers.hot_capacity, 50);
//! assert_eq!(config.tiers.warm_capacity, 500);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    COLD_RETENTION_MS_DEFAULT, COMPOSITE_HEURISTIC_WEIGHT_DEFAULT, COMPOSITE_MODEL_WEIGHT_DEFAULT,
    CORRECTION_ACTIONS_PER_CYCLE_COUNT_DEFAULT, CORRECTION_BACKOFF_MS_DEFAULT,
    CORRECTION_HISTORY_COUNT_MAX, CORRECTION_INTERVAL_MS_DEFAULT,
    CORRECTION_REVIEW_THRESHOLD_DEFAULT, CORRECTION_WINDOW_COUNT_DEFAULT,
    EVAL_CACHE_ENTRIES_COUNT_DEFAULT, EVAL_CACHE_ENTRIES_COUNT_MAX, EVAL_KEEP_THRESHOLD_DEFAULT,
    EVAL_REVIEW_THRESHOLD_DEFAULT, EVENTS_BACKLOG_COUNT_DEFAULT, MAINTENANCE_INTERVAL_MS_DEFAULT,
    PLACEMENT_PROMOTION_THRESHOLD_DEFAULT, PLACEMENT_RELEVANCE_THRESHOLD_DEFAULT,
    TIER_CAPACITY_COUNT_MAX, TIER_COLD_CAPACITY_COUNT_DEFAULT,
    TIER_COMPRESSION_THRESHOLD_BYTES_DEFAULT, TIER_HOT_CAPACITY_COUNT_DEFAULT,
    TIER_WARM_CAPACITY_COUNT_DEFAULT, TIER_WARM_PROMOTION_ACCESS_COUNT,
};
use crate::correction::CorrectionScoring;
use crate::evaluation::{EvaluatorKind, FactorWeights};

// =============================================================================
// Errors
// =============================================================================

/// Configuration errors.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A value is out of range
    #[error("invalid {field}: {message}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What was wrong
        message: String,
    },

    /// A component needs a generation provider that was not supplied
    #[error("{component} requires a generation provider")]
    MissingProvider {
        /// Component that needs it
        component: String,
    },

    /// Configuration text could not be parsed
    #[error("parse error: {message}")]
    Parse {
        /// Parser message
        message: String,
    },

    /// Configuration file could not be read
    #[error("cannot read {path}: {message}")]
    Io {
        /// File path
        path: String,
        /// OS message
        message: String,
    },
}

impl ConfigError {
    /// Create an invalid-value error.
    #[must_use]
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }

    /// Create a missing-provider error.
    #[must_use]
    pub fn missing_provider(component: impl Into<String>) -> Self {
        Self::MissingProvider {
            component: component.into(),
        }
    }
}

fn check_unit(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} is not in [0, 1]")))
    }
}

fn check_count(field: &'static str, value: usize, max: usize) -> Result<(), ConfigError> {
    if value == 0 || value > max {
        Err(ConfigError::invalid(field, format!("{value} is not in [1, {max}]")))
    } else {
        Ok(())
    }
}

// =============================================================================
// Tiers
// =============================================================================

/// Tier capacities and compression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    /// Hot tier capacity in blocks.
    ///
    /// Default: 100
    pub hot_capacity: usize,

    /// Warm tier capacity in blocks.
    ///
    /// Default: 500
    pub warm_capacity: usize,

    /// Cold tier capacity in blocks.
    ///
    /// Default: 2000
    pub cold_capacity: usize,

    /// Warm payloads larger than this are gzip-compressed.
    ///
    /// Default: 1024
    pub compression_threshold_bytes: usize,

    /// Warm blocks accessed more than this many times move to Hot.
    ///
    /// Default: 5
    pub warm_promotion_access_count: u64,

    /// Cold summaries older than this are purged by maintenance.
    ///
    /// Default: 7 days
    pub cold_retention_ms: u64,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            hot_capacity: TIER_HOT_CAPACITY_COUNT_DEFAULT,
            warm_capacity: TIER_WARM_CAPACITY_COUNT_DEFAULT,
            cold_capacity: TIER_COLD_CAPACITY_COUNT_DEFAULT,
            compression_threshold_bytes: TIER_COMPRESSION_THRESHOLD_BYTES_DEFAULT,
            warm_promotion_access_count: TIER_WARM_PROMOTION_ACCESS_COUNT,
            cold_retention_ms: COLD_RETENTION_MS_DEFAULT,
        }
    }
}

impl TierConfig {
    /// Set all three capacities.
    #[must_use]
    pub fn with_capacities(mut self, hot: usize, warm: usize, cold: usize) -> Self {
        self.hot_capacity = hot;
        self.warm_capacity = warm;
        self.cold_capacity = cold;
        self
    }

    /// Set the compression threshold.
    #[must_use]
    pub fn with_compression_threshold_bytes(mut self, bytes: usize) -> Self {
        self.compression_threshold_bytes = bytes;
        self
    }

    /// Set the Cold retention window.
    #[must_use]
    pub fn with_cold_retention_ms(mut self, retention_ms: u64) -> Self {
        self.cold_retention_ms = retention_ms;
        self
    }

    /// Check ranges.
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_count("tiers.hot_capacity", self.hot_capacity, TIER_CAPACITY_COUNT_MAX)?;
        check_count("tiers.warm_capacity", self.warm_capacity, TIER_CAPACITY_COUNT_MAX)?;
        check_count("tiers.cold_capacity", self.cold_capacity, TIER_CAPACITY_COUNT_MAX)?;
        Ok(())
    }
}

// =============================================================================
// Placement
// =============================================================================

/// Score thresholds used to place blocks stored without a tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Scores above this go to Hot.
    ///
    /// Default: 0.7
    pub promotion_threshold: f64,

    /// Scores above this go to Warm; below it, optimize deletes.
    ///
    /// Default: 0.4
    pub relevance_threshold: f64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            promotion_threshold: PLACEMENT_PROMOTION_THRESHOLD_DEFAULT,
            relevance_threshold: PLACEMENT_RELEVANCE_THRESHOLD_DEFAULT,
        }
    }
}

impl PlacementConfig {
    /// Set both thresholds.
    #[must_use]
    pub fn with_thresholds(mut self, promotion: f64, relevance: f64) -> Self {
        self.promotion_threshold = promotion;
        self.relevance_threshold = relevance;
        self
    }

    /// Check ranges and ordering.
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("placement.promotion_threshold", self.promotion_threshold)?;
        check_unit("placement.relevance_threshold", self.relevance_threshold)?;
        if self.relevance_threshold > self.promotion_threshold {
            return Err(ConfigError::invalid(
                "placement.relevance_threshold",
                "must not exceed promotion_threshold",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// Evaluator selection, weights, and decision thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Which evaluator to build.
    ///
    /// Default: composite
    pub kind: EvaluatorKind,

    /// Factor weights; normalized on use.
    pub weights: FactorWeights,

    /// Scores at or above this are kept.
    ///
    /// Default: 0.7
    pub keep_threshold: f64,

    /// Scores at or above this (and below keep) are reviewed.
    ///
    /// Default: 0.4
    pub review_threshold: f64,

    /// Composite blend weight of the heuristic score.
    ///
    /// Default: 0.3
    pub composite_heuristic_weight: f64,

    /// Composite blend weight of the model score.
    ///
    /// Default: 0.7
    pub composite_model_weight: f64,

    /// Cached scores; 0 disables the cache.
    ///
    /// Default: 0
    pub cache_entries: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            kind: EvaluatorKind::default(),
            weights: FactorWeights::default(),
            keep_threshold: EVAL_KEEP_THRESHOLD_DEFAULT,
            review_threshold: EVAL_REVIEW_THRESHOLD_DEFAULT,
            composite_heuristic_weight: COMPOSITE_HEURISTIC_WEIGHT_DEFAULT,
            composite_model_weight: COMPOSITE_MODEL_WEIGHT_DEFAULT,
            cache_entries: EVAL_CACHE_ENTRIES_COUNT_DEFAULT,
        }
    }
}

impl EvaluationConfig {
    /// Select the evaluator.
    #[must_use]
    pub fn with_kind(mut self, kind: EvaluatorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set factor weights.
    #[must_use]
    pub fn with_weights(mut self, weights: FactorWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Set keep and review thresholds.
    #[must_use]
    pub fn with_thresholds(mut self, keep: f64, review: f64) -> Self {
        self.keep_threshold = keep;
        self.review_threshold = review;
        self
    }

    /// Set the composite blend.
    #[must_use]
    pub fn with_blend(mut self, heuristic: f64, model: f64) -> Self {
        self.composite_heuristic_weight = heuristic;
        self.composite_model_weight = model;
        self
    }

    /// Enable the score cache.
    #[must_use]
    pub fn with_cache_entries(mut self, entries: usize) -> Self {
        self.cache_entries = entries;
        self
    }

    /// Check ranges and ordering.
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("evaluation.keep_threshold", self.keep_threshold)?;
        check_unit("evaluation.review_threshold", self.review_threshold)?;
        if self.review_threshold > self.keep_threshold {
            return Err(ConfigError::invalid(
                "evaluation.review_threshold",
                "must not exceed keep_threshold",
            ));
        }

        let w = &self.weights;
        for (field, value) in [
            ("evaluation.weights.semantic", w.semantic),
            ("evaluation.weights.temporal", w.temporal),
            ("evaluation.weights.goal", w.goal),
            ("evaluation.weights.information", w.information),
            ("evaluation.weights.factual", w.factual),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::invalid(field, format!("{value} must be >= 0")));
            }
        }

        let (h, m) = (self.composite_heuristic_weight, self.composite_model_weight);
        if !h.is_finite() || !m.is_finite() || h < 0.0 || m < 0.0 || h + m <= 0.0 {
            return Err(ConfigError::invalid(
                "evaluation.composite_*_weight",
                "blend weights must be non-negative and not both zero",
            ));
        }

        if self.cache_entries > EVAL_CACHE_ENTRIES_COUNT_MAX {
            return Err(ConfigError::invalid(
                "evaluation.cache_entries",
                format!("{} exceeds {EVAL_CACHE_ENTRIES_COUNT_MAX}", self.cache_entries),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Correction
// =============================================================================

/// Self-correction loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    /// Whether Review decisions are repaired through the provider.
    ///
    /// Default: true
    pub auto_correct: bool,

    /// Background cycle interval.
    ///
    /// Default: 60s
    pub interval_ms: u64,

    /// Pause after a failed sweep.
    ///
    /// Default: 5s
    pub backoff_ms: u64,

    /// Recent blocks analyzed per session.
    ///
    /// Default: 10
    pub window: usize,

    /// Blocks scoring below this are problematic.
    ///
    /// Default: 0.6
    pub review_threshold: f64,

    /// Actions applied per session per cycle.
    ///
    /// Default: 3
    pub max_corrections_per_cycle: usize,

    /// Correction history entries kept.
    ///
    /// Default: 100
    pub history_capacity: usize,

    /// How a replacement block is scored.
    ///
    /// Default: reevaluate
    pub scoring: CorrectionScoring,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            auto_correct: true,
            interval_ms: CORRECTION_INTERVAL_MS_DEFAULT,
            backoff_ms: CORRECTION_BACKOFF_MS_DEFAULT,
            window: CORRECTION_WINDOW_COUNT_DEFAULT,
            review_threshold: CORRECTION_REVIEW_THRESHOLD_DEFAULT,
            max_corrections_per_cycle: CORRECTION_ACTIONS_PER_CYCLE_COUNT_DEFAULT,
            history_capacity: CORRECTION_HISTORY_COUNT_MAX,
            scoring: CorrectionScoring::default(),
        }
    }
}

impl CorrectionConfig {
    /// Disable provider repairs; only removals happen.
    #[must_use]
    pub fn without_auto_correct(mut self) -> Self {
        self.auto_correct = false;
        self
    }

    /// Set the cycle interval.
    #[must_use]
    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    /// Set the analysis window.
    #[must_use]
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Set the review threshold.
    #[must_use]
    pub fn with_review_threshold(mut self, threshold: f64) -> Self {
        self.review_threshold = threshold;
        self
    }

    /// Set the per-cycle action cap.
    #[must_use]
    pub fn with_max_corrections_per_cycle(mut self, max: usize) -> Self {
        self.max_corrections_per_cycle = max;
        self
    }

    /// Set the replacement scoring policy.
    #[must_use]
    pub fn with_scoring(mut self, scoring: CorrectionScoring) -> Self {
        self.scoring = scoring;
        self
    }

    /// Check ranges.
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms == 0 {
            return Err(ConfigError::invalid("correction.interval_ms", "must be positive"));
        }
        check_count("correction.window", self.window, TIER_CAPACITY_COUNT_MAX)?;
        check_unit("correction.review_threshold", self.review_threshold)?;
        check_count(
            "correction.max_corrections_per_cycle",
            self.max_corrections_per_cycle,
            TIER_CAPACITY_COUNT_MAX,
        )?;
        check_count(
            "correction.history_capacity",
            self.history_capacity,
            CORRECTION_HISTORY_COUNT_MAX,
        )?;
        Ok(())
    }
}

// =============================================================================
// Events
// =============================================================================

/// Event sink settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Whether events are published at all.
    ///
    /// Default: true
    pub enabled: bool,

    /// Events retained per slow subscriber.
    ///
    /// Default: 256
    pub backlog: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backlog: EVENTS_BACKLOG_COUNT_DEFAULT,
        }
    }
}

impl EventsConfig {
    /// Check ranges.
    ///
    /// # Errors
    /// `ConfigError::Invalid` if the backlog is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backlog == 0 {
            return Err(ConfigError::invalid("events.backlog", "must be positive"));
        }
        Ok(())
    }
}

// =============================================================================
// MemoryConfig
// =============================================================================

/// Configuration for the whole memory system.
///
/// # Example
///
/// ```rust
/// use convo_memory::config::{MemoryConfig, TierConfig};
///
/// let config = MemoryConfig::default()
///     .with_tiers(TierConfig::default().with_capacities(10, 20, 40))
///     .with_maintenance_interval_ms(60_000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Tier capacities and compression
    pub tiers: TierConfig,
    /// Placement thresholds
    pub placement: PlacementConfig,
    /// Evaluator selection and policy
    pub evaluation: EvaluationConfig,
    /// Self-correction loop
    pub correction: CorrectionConfig,
    /// Event publication
    pub events: EventsConfig,
    /// Interval of the tier maintenance task.
    ///
    /// Default: 5 minutes
    pub maintenance_interval_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            tiers: TierConfig::default(),
            placement: PlacementConfig::default(),
            evaluation: EvaluationConfig::default(),
            correction: CorrectionConfig::default(),
            events: EventsConfig::default(),
            maintenance_interval_ms: MAINTENANCE_INTERVAL_MS_DEFAULT,
        }
    }
}

impl MemoryConfig {
    /// Create a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse JSON and validate. Missing fields take defaults.
    ///
    /// # Errors
    /// `ConfigError::Parse` for malformed JSON, `Invalid` for bad values.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a JSON file.
    ///
    /// # Errors
    /// `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`MemoryConfig::from_json`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&text)
    }

    /// Set tier configuration.
    #[must_use]
    pub fn with_tiers(mut self, tiers: TierConfig) -> Self {
        self.tiers = tiers;
        self
    }

    /// Set placement thresholds.
    #[must_use]
    pub fn with_placement(mut self, placement: PlacementConfig) -> Self {
        self.placement = placement;
        self
    }

    /// Set evaluation configuration.
    #[must_use]
    pub fn with_evaluation(mut self, evaluation: EvaluationConfig) -> Self {
        self.evaluation = evaluation;
        self
    }

    /// Set correction configuration.
    #[must_use]
    pub fn with_correction(mut self, correction: CorrectionConfig) -> Self {
        self.correction = correction;
        self
    }

    /// Set event configuration.
    #[must_use]
    pub fn with_events(mut self, events: EventsConfig) -> Self {
        self.events = events;
        self
    }

    /// Set the maintenance interval.
    #[must_use]
    pub fn with_maintenance_interval_ms(mut self, interval_ms: u64) -> Self {
        self.maintenance_interval_ms = interval_ms;
        self
    }

    /// Validate every section.
    ///
    /// # Errors
    /// The first section error found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tiers.validate()?;
        self.placement.validate()?;
        self.evaluation.validate()?;
        self.correction.validate()?;
        self.events.validate()?;
        if self.maintenance_interval_ms == 0 {
            return Err(ConfigError::invalid("maintenance_interval_ms", "must be positive"));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
