//! TigerStyle Constants
//!
//! All limits use big-endian naming: CATEGORY_SPECIFICS_UNIT_LIMIT
//! Example: TIER_HOT_CAPACITY_COUNT_DEFAULT (not DEFAULT_HOT_CAPACITY)
//!
//! Every constant includes units in the name:
//! - _COUNT for quantities
//! - _BYTES for sizes
//! - _MS / _SECS for durations
//! - _SCORE / _WEIGHT for values in [0, 1]

// =============================================================================
// Time
// =============================================================================

/// Milliseconds per second
pub const TIME_MS_PER_SEC: u64 = 1000;

/// Milliseconds per minute
pub const TIME_MS_PER_MIN: u64 = 60 * TIME_MS_PER_SEC;

/// Milliseconds per hour
pub const TIME_MS_PER_HOUR: u64 = 60 * TIME_MS_PER_MIN;

/// Milliseconds per day
pub const TIME_MS_PER_DAY: u64 = 24 * TIME_MS_PER_HOUR;

// =============================================================================
// Entity Limits
// =============================================================================

/// Maximum size of message or block content
pub const CONTENT_BYTES_MAX: usize = 1_000_000; // 1MB

/// Maximum length of a block, message, or session id
pub const ID_BYTES_MAX: usize = 256;

/// Default retention priority multiplier
pub const BLOCK_RETENTION_PRIORITY_DEFAULT: f64 = 1.0;

/// Approximate characters per token for context windows
pub const CHAIN_CHARS_PER_TOKEN_ESTIMATE: usize = 4;

/// Block age after which a Hot block is a compression candidate
pub const BLOCK_COMPRESS_AGE_MS_MIN: u64 = 6 * TIME_MS_PER_HOUR;

/// Access count below which a block is a compression candidate
pub const BLOCK_COMPRESS_ACCESS_COUNT_MAX: u64 = 3;

/// Retention score below which a block is a compression candidate
pub const BLOCK_COMPRESS_RETENTION_SCORE_MAX: f64 = 0.8;

/// Block age after which a block is an archive candidate
pub const BLOCK_ARCHIVE_AGE_MS_MIN: u64 = TIME_MS_PER_DAY;

/// Retention score below which a block is an archive candidate
pub const BLOCK_ARCHIVE_RETENTION_SCORE_MAX: f64 = 0.5;

/// Initial relevance for user-authored blocks
pub const BLOCK_USER_RELEVANCE_SCORE_INITIAL: f64 = 1.0;

/// Initial relevance for assistant-authored blocks
pub const BLOCK_ASSISTANT_RELEVANCE_SCORE_INITIAL: f64 = 0.9;

// =============================================================================
// Relevance Evaluation
// =============================================================================

/// Default weight of semantic alignment
pub const EVAL_SEMANTIC_WEIGHT_DEFAULT: f64 = 0.30;

/// Default weight of temporal relevance
pub const EVAL_TEMPORAL_WEIGHT_DEFAULT: f64 = 0.20;

/// Default weight of goal contribution
pub const EVAL_GOAL_WEIGHT_DEFAULT: f64 = 0.25;

/// Default weight of information quality
pub const EVAL_INFORMATION_WEIGHT_DEFAULT: f64 = 0.15;

/// Default weight of factual consistency
pub const EVAL_FACTUAL_WEIGHT_DEFAULT: f64 = 0.10;

/// Overall score at or above which a block is kept
pub const EVAL_KEEP_THRESHOLD_DEFAULT: f64 = 0.7;

/// Overall score at or above which a block is reviewed (below: removed)
pub const EVAL_REVIEW_THRESHOLD_DEFAULT: f64 = 0.4;

/// Factual consistency below which a block is always removed
pub const EVAL_FACTUAL_OVERRIDE_SCORE_MIN: f64 = 0.3;

/// Semantic alignment below which a block is always removed
pub const EVAL_SEMANTIC_OVERRIDE_SCORE_MIN: f64 = 0.2;

/// Neighbors taken on each side when batch evaluating a conversation
pub const EVAL_BATCH_NEIGHBORS_COUNT: usize = 5;

/// Default capacity of the evaluation cache (0 disables caching)
pub const EVAL_CACHE_ENTRIES_COUNT_DEFAULT: usize = 0;

/// Maximum capacity of the evaluation cache
pub const EVAL_CACHE_ENTRIES_COUNT_MAX: usize = 100_000;

/// Context blocks compared for heuristic semantic alignment
pub const HEURISTIC_SEMANTIC_CONTEXT_COUNT: usize = 3;

/// Context blocks searched for a recent question
pub const HEURISTIC_QUESTION_LOOKBACK_COUNT: usize = 5;

/// Composite: heuristic weight before normalization
pub const COMPOSITE_HEURISTIC_WEIGHT_DEFAULT: f64 = 0.3;

/// Composite: model weight before normalization
pub const COMPOSITE_MODEL_WEIGHT_DEFAULT: f64 = 0.7;

/// Composite: heuristic overall below this triggers the model
pub const COMPOSITE_MODEL_TRIGGER_SCORE_MAX: f64 = 0.6;

/// Composite: lower bound of the borderline band (exclusive)
pub const COMPOSITE_BORDERLINE_SCORE_LOW: f64 = 0.4;

/// Composite: upper bound of the borderline band (exclusive)
pub const COMPOSITE_BORDERLINE_SCORE_HIGH: f64 = 0.7;

/// Model evaluator: default semantic rating on provider failure
pub const MODEL_SEMANTIC_SCORE_FALLBACK: f64 = 0.7;

/// Model evaluator: default goal rating on provider failure
pub const MODEL_GOAL_SCORE_FALLBACK: f64 = 0.6;

/// Model evaluator: goal rating when no goal can be inferred
pub const MODEL_GOAL_SCORE_UNKNOWN: f64 = 0.7;

/// Model evaluator: default factual rating on provider failure
pub const MODEL_FACTUAL_SCORE_FALLBACK: f64 = 0.8;

/// Model evaluator: factual rating with no context or facts
pub const MODEL_FACTUAL_SCORE_UNCHECKED: f64 = 0.9;

/// Model evaluator: semantic rating with no context
pub const MODEL_SEMANTIC_SCORE_NO_CONTEXT: f64 = 0.8;

/// Model evaluator: facts kept from context
pub const MODEL_FACTS_COUNT_MAX: usize = 10;

/// Model evaluator: characters of each context line in prompts
pub const MODEL_CONTEXT_LINE_CHARS_MAX: usize = 200;

/// Model evaluator: max tokens for a rating response
pub const MODEL_RATING_TOKENS_MAX: usize = 10;

/// Model evaluator: temperature for rating requests
pub const MODEL_RATING_TEMPERATURE: f32 = 0.1;

// =============================================================================
// Tiered Storage
// =============================================================================

/// Default Hot tier capacity
pub const TIER_HOT_CAPACITY_COUNT_DEFAULT: usize = 100;

/// Default Warm tier capacity
pub const TIER_WARM_CAPACITY_COUNT_DEFAULT: usize = 500;

/// Default Cold tier capacity
pub const TIER_COLD_CAPACITY_COUNT_DEFAULT: usize = 2000;

/// Maximum capacity of any single tier
pub const TIER_CAPACITY_COUNT_MAX: usize = 1_000_000;

/// Serialized size above which Warm payloads are gzip-compressed
pub const TIER_COMPRESSION_THRESHOLD_BYTES_DEFAULT: usize = 1024;

/// Gzip level used for Warm payloads
pub const TIER_COMPRESSION_LEVEL: u32 = 6;

/// Warm blocks accessed more than this many times are promoted to Hot
pub const TIER_WARM_PROMOTION_ACCESS_COUNT: u64 = 5;

/// Characters kept from the head and tail of content in a Cold summary
pub const TIER_SUMMARY_SNIPPET_CHARS: usize = 100;

/// Relevance above which a new block is placed in Hot
pub const PLACEMENT_PROMOTION_THRESHOLD_DEFAULT: f64 = 0.7;

/// Relevance above which a new block is placed in Warm (below: Cold)
pub const PLACEMENT_RELEVANCE_THRESHOLD_DEFAULT: f64 = 0.4;

/// Optimizer: Hot blocks older than this are demoted
pub const OPTIMIZE_HOT_AGE_MS_MAX: u64 = TIME_MS_PER_DAY;

/// Optimizer: Warm blocks older than this are demoted
pub const OPTIMIZE_WARM_AGE_MS_MAX: u64 = 3 * TIME_MS_PER_DAY;

/// Optimizer: blocks accessed more than this many times are promoted
pub const OPTIMIZE_PROMOTION_ACCESS_COUNT: u64 = 10;

/// Cold summaries older than this are purged by maintenance
pub const COLD_RETENTION_MS_DEFAULT: u64 = 7 * TIME_MS_PER_DAY;

/// Interval of the background maintenance task
pub const MAINTENANCE_INTERVAL_MS_DEFAULT: u64 = 5 * TIME_MS_PER_MIN;

// =============================================================================
// Self-Correction
// =============================================================================

/// Interval between background correction sweeps
pub const CORRECTION_INTERVAL_MS_DEFAULT: u64 = 60 * TIME_MS_PER_SEC;

/// Backoff after a failed sweep
pub const CORRECTION_BACKOFF_MS_DEFAULT: u64 = 5 * TIME_MS_PER_SEC;

/// Recent blocks analyzed per session
pub const CORRECTION_WINDOW_COUNT_DEFAULT: usize = 10;

/// Overall score below which a block is considered problematic
pub const CORRECTION_REVIEW_THRESHOLD_DEFAULT: f64 = 0.6;

/// Maximum corrections applied per `correct()` call
pub const CORRECTION_ACTIONS_PER_CYCLE_COUNT_DEFAULT: usize = 3;

/// Correction history ring buffer size
pub const CORRECTION_HISTORY_COUNT_MAX: usize = 100;

/// Neighbors gathered on each side for a repair prompt
pub const CORRECTION_REPAIR_NEIGHBORS_COUNT: usize = 3;

/// Context snippets quoted in a repair prompt
pub const CORRECTION_REPAIR_SNIPPETS_COUNT: usize = 3;

/// Characters of each context snippet quoted in a repair prompt
pub const CORRECTION_REPAIR_SNIPPET_CHARS: usize = 100;

/// Legacy score multiplier applied to a repaired block
pub const CORRECTION_SCORE_BOOST_FACTOR: f64 = 1.5;

/// Suffix appended to the id of a repaired block
pub const CORRECTION_REPLACEMENT_ID_SUFFIX: &str = "_improved";

/// Max tokens for a repair response
pub const CORRECTION_REPAIR_TOKENS_MAX: usize = 500;

/// Temperature for repair requests
pub const CORRECTION_REPAIR_TEMPERATURE: f32 = 0.7;

// =============================================================================
// LLM Limits
// =============================================================================

/// Maximum prompt size
pub const LLM_PROMPT_BYTES_MAX: usize = 100_000; // 100KB

/// Maximum response size
pub const LLM_RESPONSE_BYTES_MAX: usize = 50_000; // 50KB

/// Default simulated latency
pub const LLM_LATENCY_MS_DEFAULT: u64 = 100;

/// Minimum simulated latency
pub const LLM_LATENCY_MS_MIN: u64 = 10;

/// Maximum simulated latency
pub const LLM_LATENCY_MS_MAX: u64 = 5000;

/// Maximum simulated latency jitter
pub const LLM_LATENCY_JITTER_MS_MAX: u64 = 50;

// =============================================================================
// Events
// =============================================================================

/// Default broadcast capacity and backlog size of the event sink
pub const EVENTS_BACKLOG_COUNT_DEFAULT: usize = 256;

// =============================================================================
// Telemetry
// =============================================================================

/// Filter used when `RUST_LOG` is unset
pub const TELEMETRY_FILTER_DEFAULT: &str = "info";

/// Service name attached to the startup log line
pub const TELEMETRY_SERVICE_NAME_DEFAULT: &str = "convo-memory";

// =============================================================================
// DST (Deterministic Simulation Testing)
// =============================================================================

/// Simulated clock start (2023-11-14T22:13:20Z)
pub const DST_CLOCK_START_MS: u64 = 1_700_000_000_000;

/// Maximum simulation steps
pub const DST_SIMULATION_STEPS_MAX: u64 = 1_000_000;

/// Maximum time advance per step
pub const DST_TIME_ADVANCE_MS_MAX: u64 = 30 * TIME_MS_PER_DAY;

/// Maximum fault probability
pub const DST_FAULT_PROBABILITY_MAX: f64 = 1.0;

/// Minimum fault probability
pub const DST_FAULT_PROBABILITY_MIN: f64 = 0.0;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_capacities_ordered() {
        assert!(TIER_HOT_CAPACITY_COUNT_DEFAULT <= TIER_WARM_CAPACITY_COUNT_DEFAULT);
        assert!(TIER_WARM_CAPACITY_COUNT_DEFAULT <= TIER_COLD_CAPACITY_COUNT_DEFAULT);
        assert!(TIER_COLD_CAPACITY_COUNT_DEFAULT <= TIER_CAPACITY_COUNT_MAX);
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        let sum = EVAL_SEMANTIC_WEIGHT_DEFAULT
            + EVAL_TEMPORAL_WEIGHT_DEFAULT
            + EVAL_GOAL_WEIGHT_DEFAULT
            + EVAL_INFORMATION_WEIGHT_DEFAULT
            + EVAL_FACTUAL_WEIGHT_DEFAULT;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_thresholds_ordered() {
        assert!(EVAL_REVIEW_THRESHOLD_DEFAULT < EVAL_KEEP_THRESHOLD_DEFAULT);
        assert!(PLACEMENT_RELEVANCE_THRESHOLD_DEFAULT < PLACEMENT_PROMOTION_THRESHOLD_DEFAULT);
        assert!(OPTIMIZE_HOT_AGE_MS_MAX < OPTIMIZE_WARM_AGE_MS_MAX);
        assert!(CORRECTION_BACKOFF_MS_DEFAULT < CORRECTION_INTERVAL_MS_DEFAULT);
    }

    #[test]
    fn test_time_constants_consistent() {
        assert_eq!(TIME_MS_PER_MIN, 60_000);
        assert_eq!(TIME_MS_PER_HOUR, 3_600_000);
        assert_eq!(TIME_MS_PER_DAY, 86_400_000);
    }
}
