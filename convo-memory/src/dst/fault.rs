//! FaultInjector - Probabilistic Fault Injection
//!
//! `TigerStyle`: Faults are registered up front, rolled through the
//! deterministic RNG, and counted. Storage and provider seams call
//! [`FaultInjector::should_inject`] with an operation name such as
//! `"storage_write"` or `"llm_complete"`.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::rng::DeterministicRng;
use crate::constants::{DST_FAULT_PROBABILITY_MAX, DST_FAULT_PROBABILITY_MIN};

/// Types of faults that can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultType {
    // =========================================================================
    // Storage Faults
    // =========================================================================
    /// Store fails before any tier is touched
    StorageWriteFail,
    /// Retrieve fails
    StorageReadFail,
    /// Delete fails
    StorageDeleteFail,

    // =========================================================================
    // LLM Faults
    // =========================================================================
    /// Provider request timeout
    LlmTimeout,
    /// Provider rate limit
    LlmRateLimit,
    /// Prompt exceeds the provider context
    LlmContextOverflow,
    /// Provider response is malformed
    LlmInvalidResponse,
    /// Provider is down
    LlmServiceUnavailable,
}

impl FaultType {
    /// Stable name used in statistics and error messages.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StorageWriteFail => "storage_write_fail",
            Self::StorageReadFail => "storage_read_fail",
            Self::StorageDeleteFail => "storage_delete_fail",
            Self::LlmTimeout => "llm_timeout",
            Self::LlmRateLimit => "llm_rate_limit",
            Self::LlmContextOverflow => "llm_context_overflow",
            Self::LlmInvalidResponse => "llm_invalid_response",
            Self::LlmServiceUnavailable => "llm_service_unavailable",
        }
    }

    /// Whether this fault can fire for `operation`.
    ///
    /// Storage faults fire for `storage_write*`, `storage_read*`, and
    /// `storage_delete*` respectively; LLM faults for `llm*`.
    #[must_use]
    pub fn applies_to(&self, operation: &str) -> bool {
        match self {
            Self::StorageWriteFail => operation.starts_with("storage_write"),
            Self::StorageReadFail => operation.starts_with("storage_read"),
            Self::StorageDeleteFail => operation.starts_with("storage_delete"),
            _ => self.is_llm() && operation.starts_with("llm"),
        }
    }

    /// Whether this fault applies to the LLM seam.
    #[must_use]
    pub fn is_llm(&self) -> bool {
        matches!(
            self,
            Self::LlmTimeout
                | Self::LlmRateLimit
                | Self::LlmContextOverflow
                | Self::LlmInvalidResponse
                | Self::LlmServiceUnavailable
        )
    }
}

/// Configuration for a specific fault.
#[derive(Debug, Clone)]
pub struct FaultConfig {
    /// The type of fault
    pub fault_type: FaultType,
    /// Probability of injection (0.0 to 1.0)
    pub probability: f64,
    /// Optional operation filter (substring match)
    pub operation_filter: Option<String>,
    /// Maximum number of injections (None = unlimited)
    pub max_injections: Option<u64>,
}

impl FaultConfig {
    /// Create a new fault configuration.
    ///
    /// # Panics
    /// Panics if probability is not in [0, 1].
    #[must_use]
    pub fn new(fault_type: FaultType, probability: f64) -> Self {
        assert!(
            (DST_FAULT_PROBABILITY_MIN..=DST_FAULT_PROBABILITY_MAX).contains(&probability),
            "probability must be in [0, 1], got {probability}"
        );

        Self {
            fault_type,
            probability,
            operation_filter: None,
            max_injections: None,
        }
    }

    /// Only inject for operations whose name contains `filter`.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.operation_filter = Some(filter.into());
        self
    }

    /// Stop injecting after `max` injections.
    ///
    /// # Panics
    /// Panics if `max` is zero.
    #[must_use]
    pub fn with_max_injections(mut self, max: u64) -> Self {
        assert!(max > 0, "max_injections must be positive");
        self.max_injections = Some(max);
        self
    }

    fn matches(&self, operation: &str) -> bool {
        self.fault_type.applies_to(operation)
            && self
                .operation_filter
                .as_ref()
                .map_or(true, |filter| operation.contains(filter.as_str()))
    }
}

/// Fault injector for simulation testing.
///
/// Shared via `Arc`; all mutation goes through interior locks.
#[derive(Debug)]
pub struct FaultInjector {
    rng: Mutex<DeterministicRng>,
    configs: Vec<FaultConfig>,
    injection_counts: Mutex<HashMap<FaultType, u64>>,
}

impl FaultInjector {
    /// Create an injector with no registered faults.
    #[must_use]
    pub fn new(rng: DeterministicRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            configs: Vec::new(),
            injection_counts: Mutex::new(HashMap::new()),
        }
    }

    /// Register a fault. Registration must happen before sharing via `Arc`.
    pub fn register(&mut self, config: FaultConfig) {
        self.injection_counts
            .lock()
            .entry(config.fault_type)
            .or_insert(0);
        self.configs.push(config);
    }

    /// Whether any fault is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Roll every matching fault for `operation`; returns the first hit.
    pub fn should_inject(&self, operation: &str) -> Option<FaultType> {
        for config in self.configs.iter().filter(|c| c.matches(operation)) {
            if let Some(max) = config.max_injections {
                let count = self
                    .injection_counts
                    .lock()
                    .get(&config.fault_type)
                    .copied()
                    .unwrap_or(0);
                if count >= max {
                    continue;
                }
            }

            if self.rng.lock().next_bool(config.probability) {
                *self
                    .injection_counts
                    .lock()
                    .entry(config.fault_type)
                    .or_insert(0) += 1;
                return Some(config.fault_type);
            }
        }

        None
    }

    /// Injection counts keyed by fault name.
    #[must_use]
    pub fn injection_stats(&self) -> HashMap<String, u64> {
        self.injection_counts
            .lock()
            .iter()
            .map(|(fault, count)| (fault.as_str().to_string(), *count))
            .collect()
    }

    /// Total injections across all faults.
    #[must_use]
    pub fn total_injections(&self) -> u64 {
        self.injection_counts.lock().values().sum()
    }
}

/// Builder for [`FaultInjector`].
pub struct FaultInjectorBuilder {
    rng: DeterministicRng,
    configs: Vec<FaultConfig>,
}

impl FaultInjectorBuilder {
    /// Create a builder with the given RNG.
    #[must_use]
    pub fn new(rng: DeterministicRng) -> Self {
        Self {
            rng,
            configs: Vec::new(),
        }
    }

    /// Add a fault configuration.
    #[must_use]
    pub fn with_fault(mut self, config: FaultConfig) -> Self {
        self.configs.push(config);
        self
    }

    /// Add write, read, and delete storage faults.
    #[must_use]
    pub fn with_storage_faults(self, probability: f64) -> Self {
        self.with_fault(FaultConfig::new(FaultType::StorageWriteFail, probability))
            .with_fault(FaultConfig::new(FaultType::StorageReadFail, probability))
            .with_fault(FaultConfig::new(FaultType::StorageDeleteFail, probability))
    }

    /// Add timeout and rate-limit provider faults.
    #[must_use]
    pub fn with_llm_faults(self, probability: f64) -> Self {
        self.with_fault(FaultConfig::new(FaultType::LlmTimeout, probability))
            .with_fault(FaultConfig::new(FaultType::LlmRateLimit, probability))
    }

    /// Build the injector.
    #[must_use]
    pub fn build(self) -> FaultInjector {
        let mut injector = FaultInjector::new(self.rng);
        for config in self.configs {
            injector.register(config);
        }
        injector
    }
}
