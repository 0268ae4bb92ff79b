//! Storage Backend Trait
//!
//! `TigerStyle`: Abstract interface for tiered block storage. All operations
//! are async and return explicit errors. The in-process [`TieredStore`] is
//! the only implementation; DST wires it to a fault injector.
//!
//! [`TieredStore`]: super::TieredStore

use async_trait::async_trait;

use super::error::StorageResult;
use super::tiers::{TierStats, TierTransition};
use crate::entities::{ConversationBlock, MemoryTier};

/// Outcome of a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreReceipt {
    /// Tier the block landed in
    pub tier: MemoryTier,
    /// Cascaded moves caused by the store
    pub transitions: Vec<TierTransition>,
}

/// Abstract storage backend for conversation blocks.
#[async_trait]
pub trait StorageBackend: Send + Sync + std::fmt::Debug {
    /// Store or replace a block.
    ///
    /// With no tier, the backend places it by relevance score.
    async fn store(
        &self,
        block: ConversationBlock,
        tier: Option<MemoryTier>,
    ) -> StorageResult<StoreReceipt>;

    /// Get a block, recording the access.
    ///
    /// Returns `None` if the block does not exist.
    async fn retrieve(&self, id: &str) -> StorageResult<Option<ConversationBlock>>;

    /// Get a block without touching access metadata.
    async fn peek(&self, id: &str) -> StorageResult<Option<ConversationBlock>>;

    /// Delete a block.
    ///
    /// Returns true if the block existed.
    async fn delete(&self, id: &str) -> StorageResult<bool>;

    /// Move a block to `to`.
    async fn migrate(&self, id: &str, to: MemoryTier) -> StorageResult<Vec<TierTransition>>;

    /// Sorted ids filtered by prefix and session.
    async fn list_keys(
        &self,
        prefix: Option<&str>,
        session_id: Option<&str>,
    ) -> StorageResult<Vec<String>>;

    /// Blocks filtered by tier and session, ordered by `(sequence, id)`.
    async fn blocks(
        &self,
        tier: Option<MemoryTier>,
        session_id: Option<&str>,
    ) -> StorageResult<Vec<ConversationBlock>>;

    /// Sessions with at least one stored block.
    async fn sessions(&self) -> StorageResult<Vec<String>>;

    /// Tier usage and counters.
    async fn stats(&self) -> StorageResult<TierStats>;

    /// Drop Cold summaries older than `max_age_ms`. Returns the ids dropped.
    async fn purge_cold(&self, max_age_ms: u64) -> StorageResult<Vec<String>>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}
