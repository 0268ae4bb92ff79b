//! Tiered Storage - Hot/Warm/Cold Block Cache
//!
//! `TigerStyle`: In-process, best-effort, capacity-bounded.
//!
//! ```text
//! TieredMemoryManager   placement policy, optimize, cleanup, maintenance
//!        │
//! StorageBackend (trait)
//!        │
//! TieredStore           one Mutex around a TierSet
//!        │
//! TierSet               Hot: LruList<Block>
//!                       Warm: LruList<gzip JSON payload>
//!                       Cold: LruList<ColdSummary>   (terminal, lossy)
//! ```

mod backend;
mod codec;
mod error;
mod lru;
mod manager;
mod summary;
mod tiered;
mod tiers;

pub use backend::{StorageBackend, StoreReceipt};
pub use codec::WarmPayload;
pub use error::{StorageError, StorageResult};
pub use lru::LruList;
pub use manager::{MaintenanceHandle, OptimizeReport, TieredMemoryManager};
pub use summary::ColdSummary;
pub use tiered::TieredStore;
pub use tiers::{
    Retrieval, TierCounters, TierSet, TierStats, TierTransition, TierUsage, TransitionKind,
};
