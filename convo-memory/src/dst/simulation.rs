//! Simulation - DST Test Harness
//!
//! `TigerStyle`: One seed, one clock, one fault injector shared by every
//! simulated component.

use std::future::Future;
use std::sync::Arc;

use super::clock::{Clock, SimClock};
use super::config::SimConfig;
use super::fault::{FaultConfig, FaultInjector, FaultInjectorBuilder, FaultType};
use super::llm::SimLLM;
use super::rng::DeterministicRng;
use crate::config::{MemoryConfig, PlacementConfig, TierConfig};
use crate::constants::DST_CLOCK_START_MS;
use crate::error::MemoryResult;
use crate::llm::SimLLMProvider;
use crate::memory::ConversationMemory;
use crate::storage::TieredStore;

/// Environment provided to simulation tests.
#[derive(Debug)]
pub struct SimEnvironment {
    /// Simulation configuration
    pub config: SimConfig,
    /// Simulated clock
    pub clock: SimClock,
    /// Deterministic RNG
    pub rng: DeterministicRng,
    /// Fault injector shared with the store and the LLM
    pub faults: Arc<FaultInjector>,
    /// Simulated LLM
    pub llm: SimLLM,
}

impl SimEnvironment {
    /// Advance simulated time in milliseconds.
    pub fn advance_time_ms(&self, ms: u64) -> u64 {
        self.clock.advance_ms(ms)
    }

    /// Current simulated time in milliseconds.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Sleep until `ms` of simulated time has passed.
    pub async fn sleep_ms(&self, ms: u64) {
        self.clock.sleep_ms(ms).await;
    }

    /// The simulated clock as a [`Clock`].
    #[must_use]
    pub fn time(&self) -> Clock {
        Clock::Simulated(self.clock.clone())
    }

    /// A provider wrapping this environment's `SimLLM`.
    #[must_use]
    pub fn provider(&self) -> SimLLMProvider {
        SimLLMProvider::from_sim_llm(self.llm.clone())
    }

    /// A tiered store on the simulated clock with storage faults attached.
    #[must_use]
    pub fn create_store(&self, tiers: &TierConfig, placement: PlacementConfig) -> TieredStore {
        TieredStore::new(tiers, placement, self.time()).with_fault_injector(Arc::clone(&self.faults))
    }

    /// A memory whose store, provider, and clock all belong to this
    /// simulation, so registered faults reach every operation.
    ///
    /// # Errors
    /// `MemoryError::Config` if `config` is invalid.
    pub fn create_memory(&self, config: MemoryConfig) -> MemoryResult<ConversationMemory> {
        ConversationMemory::builder()
            .with_config(config)
            .with_clock(self.time())
            .with_provider(Arc::new(self.provider()))
            .with_fault_injector(Arc::clone(&self.faults))
            .build()
    }
}

/// DST simulation harness.
///
/// # Example
///
/// ```rust,ignore
/// use convo_memory::dst::{FaultConfig, FaultType, SimConfig, Simulation};
/// use convo_memory::MemoryConfig;
///
/// #[tokio::test]
/// async fn test_memory_under_faults() {
///     let sim = Simulation::new(SimConfig::with_seed(42))
///         .with_fault(FaultConfig::new(FaultType::StorageWriteFail, 0.1));
///
///     sim.run(|env| async move {
///         let memory = env.create_memory(MemoryConfig::default())?;
///         env.advance_time_ms(1000);
///         assert!(memory.sessions().await?.len() <= 1);
///         Ok::<(), convo_memory::MemoryError>(())
///     }).await.unwrap();
/// }
/// ```
#[derive(Debug)]
pub struct Simulation {
    config: SimConfig,
    fault_configs: Vec<FaultConfig>,
    llm_latency_ms: Option<u64>,
}

impl Simulation {
    /// Create a simulation with the given configuration.
    #[must_use]
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            fault_configs: Vec::new(),
            llm_latency_ms: None,
        }
    }

    /// Register a fault to inject during simulation.
    #[must_use]
    pub fn with_fault(mut self, fault_config: FaultConfig) -> Self {
        self.fault_configs.push(fault_config);
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

    /// Make every LLM call wait this long on the simulated clock.
    #[must_use]
    pub fn with_llm_latency(mut self, latency_ms: u64) -> Self {
        self.llm_latency_ms = Some(latency_ms);
        self
    }

    /// Run `test_fn` against a fresh environment.
    ///
    /// # Errors
    /// Returns any error from the test function.
    pub async fn run<F, Fut, E>(self, test_fn: F) -> Result<(), E>
    where
        F: FnOnce(SimEnvironment) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let seed = self.config.seed();
        let env = self.build();
        let result = test_fn(env).await;
        if result.is_err() {
            tracing::error!(seed, "simulation failed (replay with DST_SEED)");
        }
        result
    }

    /// Build the environment without running a test.
    #[must_use]
    pub fn build(self) -> SimEnvironment {
        let mut rng = DeterministicRng::new(self.config.seed());
        let clock = SimClock::at_ms(DST_CLOCK_START_MS);

        let mut fault_builder = FaultInjectorBuilder::new(rng.fork());
        for fault_config in self.fault_configs {
            fault_builder = fault_builder.with_fault(fault_config);
        }
        let faults = Arc::new(fault_builder.build());

        let llm = SimLLM::new(clock.clone(), rng.fork(), Arc::clone(&faults));
        let llm = match self.llm_latency_ms {
            Some(latency_ms) => llm.with_latency(latency_ms),
            None => llm.without_latency(),
        };

        SimEnvironment {
            config: self.config,
            clock,
            rng,
            faults,
            llm,
        }
    }
}

/// Simulation with an explicit seed, or `DST_SEED`/random when `None`.
#[must_use]
pub fn create_simulation(seed: Option<u64>) -> Simulation {
    let config = match seed {
        Some(s) => SimConfig::with_seed(s),
        None => SimConfig::from_env_or_random(),
    };
    Simulation::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Message, MemoryTier};
    use crate::error::MemoryError;
    use crate::memory::IngestOptions;
    use crate::storage::StorageBackend;

    #[tokio::test]
    async fn test_basic_simulation() {
        let sim = Simulation::new(SimConfig::with_seed(42));

        sim.run(|env| async move {
            let memory = env.create_memory(MemoryConfig::default())?;
            let result = memory
                .ingest("s1", Message::user("hello simulation", env.clock.now()), IngestOptions::new())
                .await?;
            env.advance_time_ms(1000);

            assert_eq!(result.tier, MemoryTier::Hot);
            assert_eq!(env.now_ms(), DST_CLOCK_START_MS + 1000);
            Ok::<(), MemoryError>(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_llm_latency_waits_on_simulated_clock() {
        let env = Simulation::new(SimConfig::with_seed(11))
            .with_llm_latency(200)
            .build();
        let llm = env.llm.clone();
        let call = tokio::spawn(async move { llm.complete("hello there").await });

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!call.is_finished());

        env.advance_time_ms(200 + crate::constants::LLM_LATENCY_JITTER_MS_MAX);
        let response = call.await.unwrap().unwrap();
        assert!(!response.is_empty());
    }

    #[tokio::test]
    async fn test_store_shares_fault_injector() {
        let env = Simulation::new(SimConfig::with_seed(7))
            .with_fault(FaultConfig::new(FaultType::StorageWriteFail, 1.0))
            .build();
        let store = env.create_store(&TierConfig::default(), PlacementConfig::default());

        let block = crate::entities::ConversationBlock::new(
            "s1",
            0,
            "text",
            crate::entities::BlockSource::User,
            "m0",
            env.clock.now(),
        );
        assert!(store.store(block, None).await.is_err());
        assert_eq!(env.faults.total_injections(), 1);
    }

    #[tokio::test]
    async fn test_same_seed_same_rng() {
        let mut a = Simulation::new(SimConfig::with_seed(12345)).build();
        let mut b = Simulation::new(SimConfig::with_seed(12345)).build();
        for _ in 0..10 {
            assert_eq!(a.rng.next_u64(), b.rng.next_u64());
        }
    }

    #[tokio::test]
    async fn test_create_simulation() {
        let env = create_simulation(Some(42)).build();
        assert_eq!(env.config.seed(), 42);
        assert_eq!(env.now_ms(), DST_CLOCK_START_MS);
    }
}
