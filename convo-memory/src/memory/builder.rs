//! Conversation Memory Builder
//!
//! `TigerStyle`: Clean API, sensible defaults, fail fast.
//!
//! Everything not set explicitly is derived from the `MemoryConfig`: the
//! tiered store, the evaluator variant, the event sink, and the correction
//! loop. Configuration is validated once, here.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::ConversationMemory;
use crate::config::MemoryConfig;
use crate::correction::SelfCorrector;
use crate::dst::{Clock, FaultInjector};
use crate::entities::MessageChain;
use crate::error::MemoryResult;
use crate::evaluation::{build_evaluator, RelevanceEvaluator};
use crate::events::{BroadcastSink, EventSink, NullSink};
use crate::llm::LLMProvider;
use crate::storage::{StorageBackend, TieredMemoryManager, TieredStore};

// =============================================================================
// ConversationMemoryBuilder
// =============================================================================

/// Builder for [`ConversationMemory`].
///
/// # Example
///
/// ```rust,ignore
/// use convo_memory::{ConversationMemory, MemoryConfig};
/// use convo_memory::dst::{Clock, SimClock};
///
/// let memory = ConversationMemory::builder()
///     .with_config(MemoryConfig::default())
///     .with_clock(Clock::Simulated(SimClock::new()))
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct ConversationMemoryBuilder {
    config: MemoryConfig,
    clock: Clock,
    provider: Option<Arc<dyn LLMProvider>>,
    backend: Option<Arc<dyn StorageBackend>>,
    evaluator: Option<Arc<dyn RelevanceEvaluator>>,
    fault_injector: Option<Arc<FaultInjector>>,
}

impl ConversationMemoryBuilder {
    /// Create a builder with default configuration and the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config` for every component.
    #[must_use]
    pub fn with_config(mut self, config: MemoryConfig) -> Self {
        self.config = config;
        self
    }

    /// Time source for ages, timestamps, and background loops.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Generation provider for model scoring and repairs.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Replace the default tiered store.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Replace the configured evaluator.
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Arc<dyn RelevanceEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Inject storage faults into the default tiered store.
    #[must_use]
    pub fn with_fault_injector(mut self, fault_injector: Arc<FaultInjector>) -> Self {
        self.fault_injector = Some(fault_injector);
        self
    }

    /// Build the memory.
    ///
    /// # Errors
    /// `MemoryError::Config` if the configuration is invalid or the model
    /// evaluator is selected without a provider.
    pub fn build(self) -> MemoryResult<ConversationMemory> {
        let Self {
            config,
            clock,
            provider,
            backend,
            evaluator,
            fault_injector,
        } = self;
        config.validate()?;

        let evaluator = match evaluator {
            Some(evaluator) => evaluator,
            None => build_evaluator(&config.evaluation, provider.clone(), clock.clone())?,
        };

        let backend = backend.unwrap_or_else(|| {
            let store = TieredStore::new(&config.tiers, config.placement, clock.clone());
            match fault_injector {
                Some(faults) => Arc::new(store.with_fault_injector(faults)),
                None => Arc::new(store),
            }
        });

        let broadcast = config
            .events
            .enabled
            .then(|| Arc::new(BroadcastSink::new(config.events.backlog)));
        let sink: Arc<dyn EventSink> = match &broadcast {
            Some(sink) => Arc::clone(sink) as Arc<dyn EventSink>,
            None => Arc::new(NullSink),
        };

        let manager = Arc::new(
            TieredMemoryManager::new(backend, evaluator, clock.clone())
                .with_events(Arc::clone(&sink))
                .with_relevance_threshold(config.placement.relevance_threshold)
                .with_cold_retention_ms(config.tiers.cold_retention_ms),
        );

        let chain = Arc::new(MessageChain::new());
        let mut corrector = SelfCorrector::new(Arc::clone(&manager), config.correction.clone())
            .with_chain(Arc::clone(&chain))
            .with_events(sink);
        if let Some(provider) = provider {
            corrector = corrector.with_provider(provider);
        }

        tracing::info!(
            evaluator = manager.evaluator().name(),
            backend = manager.backend().name(),
            events = config.events.enabled,
            auto_correct = config.correction.auto_correct,
            "built conversation memory"
        );

        Ok(ConversationMemory {
            config,
            clock,
            chain,
            manager,
            corrector: Arc::new(corrector),
            events: broadcast,
            sequences: Mutex::new(HashMap::new()),
            maintenance: Mutex::new(None),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EvaluationConfig, EventsConfig, TierConfig};
    use crate::dst::{DeterministicRng, FaultInjectorBuilder, SimClock};
    use crate::entities::Message;
    use crate::error::MemoryError;
    use crate::evaluation::EvaluatorKind;
    use crate::memory::IngestOptions;

    #[test]
    fn test_defaults_build() {
        let memory = ConversationMemoryBuilder::new().build().unwrap();
        assert_eq!(memory.config(), &MemoryConfig::default());
        assert_eq!(memory.manager().evaluator().name(), "composite");
        assert!(memory.subscribe().is_some());
    }

    #[test]
    fn test_invalid_config_fails() {
        let config = MemoryConfig::default().with_tiers(TierConfig::default().with_capacities(0, 1, 1));
        let err = ConversationMemoryBuilder::new().with_config(config).build().unwrap_err();
        assert!(matches!(err, MemoryError::Config(_)));
    }

    #[test]
    fn test_model_evaluator_requires_provider() {
        let config = MemoryConfig::default()
            .with_evaluation(EvaluationConfig::default().with_kind(EvaluatorKind::Model));
        let err = ConversationMemoryBuilder::new().with_config(config).build().unwrap_err();
        assert!(matches!(err, MemoryError::Config(_)));
    }

    #[test]
    fn test_events_disabled() {
        let config = MemoryConfig::default().with_events(EventsConfig {
            enabled: false,
            ..EventsConfig::default()
        });
        let memory = ConversationMemoryBuilder::new().with_config(config).build().unwrap();
        assert!(memory.subscribe().is_none());
    }

    #[tokio::test]
    async fn test_fault_injector_reaches_store() {
        let clock = SimClock::at_ms(1_700_000_000_000);
        let faults = FaultInjectorBuilder::new(DeterministicRng::new(9))
            .with_storage_faults(1.0)
            .build();
        let memory = ConversationMemoryBuilder::new()
            .with_clock(Clock::Simulated(clock.clone()))
            .with_fault_injector(Arc::new(faults))
            .build()
            .unwrap();

        let err = memory
            .ingest("s1", Message::user("hello", clock.now()), IngestOptions::new())
            .await
            .unwrap_err();
        assert!(err.is_transient());
        // The failed store is not left behind in the chain.
        assert!(memory.messages("s1").is_empty());
    }
}
