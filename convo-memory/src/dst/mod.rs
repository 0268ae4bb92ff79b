//! DST - Deterministic Simulation Testing
//!
//! TigerBeetle/FoundationDB-style simulation for the conversation memory:
//! a controllable clock, a seeded RNG, probabilistic fault injection, and a
//! scripted LLM. Every component that touches time, storage, or a model can
//! run against these instead of the real thing.
//!
//! # Philosophy
//!
//! > "If you're not testing with fault injection, you're not testing."
//!
//! # Usage
//!
//! ```rust,ignore
//! use convo_memory::dst::{Simulation, SimConfig};
//! use convo_memory::{IngestOptions, Message, MemoryConfig};
//!
//! #[tokio::test]
//! async fn test_ingest_survives_faults() {
//!     let sim = Simulation::new(SimConfig::with_seed(42)).with_storage_faults(0.1);
//!
//!     sim.run(|env| async move {
//!         let memory = env.create_memory(MemoryConfig::default())?;
//!         let _ = memory
//!             .ingest("s1", Message::user("hi", env.clock.now()), IngestOptions::new())
//!             .await;
//!         env.advance_time_ms(1000);
//!         Ok::<(), convo_memory::MemoryError>(())
//!     }).await.unwrap();
//! }
//! ```
//!
//! Run with explicit seed for reproducibility:
//! ```bash
//! DST_SEED=12345 cargo test
//! ```

mod clock;
mod config;
mod fault;
mod llm;
mod property;
mod rng;
mod simulation;

pub use clock::{elapsed_ms, Clock, SimClock};
pub use config::{SimConfig, DST_SEED_ENV};
pub use fault::{FaultConfig, FaultInjector, FaultInjectorBuilder, FaultType};
pub use llm::{SimLLM, RATING_PROMPT_MARKER, REPAIR_PROMPT_MARKER};
pub use property::{
    PropertyTest, PropertyTestFailure, PropertyTestResult, PropertyTestable, TimeAdvanceConfig,
};
pub use rng::DeterministicRng;
pub use simulation::{create_simulation, SimEnvironment, Simulation};
