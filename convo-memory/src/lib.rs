//! # Convo Memory
//!
//! Ephemeral conversational memory for LLM agents with deterministic
//! simulation testing.
//!
//! ## Features
//!
//! - **Relevance Evaluation**: Heuristic, model-backed, and composite scoring
//!   across five factors (semantic, temporal, goal, information, factual)
//! - **Tiered Caching**: Hot, Warm (gzip), and Cold (summary) tiers with LRU
//!   eviction, promotion on access, and relevance-based placement
//! - **Self-Correction**: A background loop that removes or repairs
//!   low-relevance blocks and mirrors repairs into the message chain
//! - **Deterministic Testing**: Simulated clock, seeded RNG, scripted LLM, and
//!   fault injection for reproducible runs
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use convo_memory::{ConversationMemory, IngestOptions, Message};
//!
//! # async fn run() -> Result<(), convo_memory::MemoryError> {
//! let memory = ConversationMemory::builder().build()?;
//! memory.start();
//!
//! let result = memory
//!     .ingest("session-1", Message::user("What is Rust?", chrono::Utc::now()),
//!             IngestOptions::new().with_evaluation())
//!     .await?;
//! println!("stored in {:?}", result.tier);
//!
//! memory.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  ConversationMemory                     │
//! ├─────────────────────────────────────────────────────────┤
//! │  MessageChain  │ RelevanceEvaluator │ SelfCorrector     │
//! ├─────────────────────────────────────────────────────────┤
//! │  Hot  (LRU)         │ Plain blocks, fastest access      │
//! │  Warm (LRU, gzip)   │ Compressed past a size threshold  │
//! │  Cold (LRU)         │ Summaries of archived blocks      │
//! ├─────────────────────────────────────────────────────────┤
//! │  DST Framework      │ Clock, RNG, faults, SimLLM        │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Simulation-First Philosophy
//!
//! > "If you're not testing with fault injection, you're not testing."
//!
//! ```rust,ignore
//! use convo_memory::dst::{Simulation, SimConfig, FaultConfig, FaultType};
//!
//! # #[tokio::test]
//! # async fn test_example() {
//! let sim = Simulation::new(SimConfig::with_seed(42))
//!     .with_fault(FaultConfig::new(FaultType::LlmTimeout, 0.1));
//!
//! sim.run(|env| async move {
//!     let memory = env.create_memory(convo_memory::MemoryConfig::default())?;
//!     // Same seed = same faults = reproducible bugs
//!     Ok::<_, convo_memory::MemoryError>(())
//! }).await.unwrap();
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod correction;
pub mod dst;
pub mod entities;
pub mod error;
pub mod evaluation;
pub mod events;
pub mod llm;
pub mod memory;
pub mod storage;
pub mod telemetry;

// Re-export common types
pub use config::{
    ConfigError, CorrectionConfig, EvaluationConfig, EventsConfig, MemoryConfig, PlacementConfig,
    TierConfig,
};
pub use dst::{
    create_simulation, Clock, DeterministicRng, FaultConfig, FaultInjector, FaultType, SimClock,
    SimConfig, SimEnvironment, Simulation,
};
pub use error::{MemoryError, MemoryResult};

// Entity exports
pub use entities::{
    BlockSource, ConversationBlock, MemoryTier, Message, MessageChain, MessageRole, MessageType,
};

// Evaluation exports
pub use evaluation::{
    CachedEvaluator, CompositeEvaluator, Decision, EvaluationMetadata, EvaluatorKind, Factor,
    FactorScores, FactorWeights, HeuristicEvaluator, ModelEvaluator, RelevanceEvaluator,
    RelevanceScore,
};

// Storage exports
pub use storage::{StorageBackend, StorageError, TierStats, TieredMemoryManager, TieredStore};

// Correction exports
pub use correction::{CorrectionEntry, CorrectionKind, CorrectionScoring, SelfCorrector};

// LLM Provider exports
pub use llm::{CompletionRequest, LLMProvider, ProviderError, SimLLMProvider};

// Event exports
pub use events::{EventSink, MemoryEvent};

// Main API
pub use memory::{ConversationMemory, ConversationMemoryBuilder, IngestOptions, IngestResult};
