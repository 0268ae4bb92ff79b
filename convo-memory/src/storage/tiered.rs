//! `TieredStore` - In-Process Tiered Backend
//!
//! `TigerStyle`: One `parking_lot::Mutex` guards the whole [`TierSet`], so
//! store, retrieve, delete, and migrate are atomic with respect to each
//! other. The lock is never held across an `.await`.
//!
//! With a [`FaultInjector`] attached, `storage_write`, `storage_read`, and
//! `storage_delete` operations fail with the injected fault before touching
//! state.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::backend::{StorageBackend, StoreReceipt};
use super::error::{StorageError, StorageResult};
use super::tiers::{TierSet, TierStats, TierTransition};
use crate::config::{PlacementConfig, TierConfig};
use crate::dst::{Clock, FaultInjector};
use crate::entities::{ConversationBlock, MemoryTier};

/// Three-tier in-memory block store.
#[derive(Debug)]
pub struct TieredStore {
    state: Mutex<TierSet>,
    placement: PlacementConfig,
    clock: Clock,
    fault_injector: Option<Arc<FaultInjector>>,
}

impl TieredStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(tiers: &TierConfig, placement: PlacementConfig, clock: Clock) -> Self {
        Self {
            state: Mutex::new(TierSet::new(tiers)),
            placement,
            clock,
            fault_injector: None,
        }
    }

    /// Attach a fault injector (DST).
    #[must_use]
    pub fn with_fault_injector(mut self, fault_injector: Arc<FaultInjector>) -> Self {
        self.fault_injector = Some(fault_injector);
        self
    }

    /// Tier a block with `score` is placed in when no tier is given.
    ///
    /// Above the promotion threshold is Hot, above the relevance threshold is
    /// Warm, anything else is Cold. Unscored blocks go to Hot.
    #[must_use]
    pub fn placement_for(&self, score: Option<f64>) -> MemoryTier {
        match score {
            None => MemoryTier::Hot,
            Some(s) if s > self.placement.promotion_threshold => MemoryTier::Hot,
            Some(s) if s > self.placement.relevance_threshold => MemoryTier::Warm,
            Some(_) => MemoryTier::Cold,
        }
    }

    /// Tier currently holding `id`.
    #[must_use]
    pub fn tier_of(&self, id: &str) -> Option<MemoryTier> {
        self.state.lock().tier_of(id)
    }

    /// Blocks held across tiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check tier and index invariants.
    ///
    /// # Errors
    /// Returns a description of the first violation.
    pub fn check_invariants(&self) -> Result<(), String> {
        self.state.lock().check_invariants()
    }

    fn maybe_inject_fault(&self, operation: &str) -> StorageResult<()> {
        if let Some(fault_type) = self
            .fault_injector
            .as_ref()
            .and_then(|f| f.should_inject(operation))
        {
            return Err(StorageError::simulated_fault(format!(
                "{} during {operation}",
                fault_type.as_str()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for TieredStore {
    #[tracing::instrument(skip(self, block), fields(block_id = %block.id, session_id = %block.session_id))]
    async fn store(
        &self,
        block: ConversationBlock,
        tier: Option<MemoryTier>,
    ) -> StorageResult<StoreReceipt> {
        self.maybe_inject_fault("storage_write")?;

        let tier = tier.unwrap_or_else(|| self.placement_for(block.relevance_score));
        let now = self.clock.now();
        let transitions = self.state.lock().insert(block, tier, now)?;

        tracing::debug!(%tier, cascaded = transitions.len(), "stored block");
        Ok(StoreReceipt { tier, transitions })
    }

    async fn retrieve(&self, id: &str) -> StorageResult<Option<ConversationBlock>> {
        self.maybe_inject_fault("storage_read")?;

        let now = self.clock.now();
        let retrieval = self.state.lock().retrieve(id, now)?;
        Ok(retrieval.map(|r| {
            for t in &r.transitions {
                tracing::debug!(block_id = %t.block_id, from = %t.from, kind = ?t.kind(), "retrieval moved block");
            }
            r.block
        }))
    }

    async fn peek(&self, id: &str) -> StorageResult<Option<ConversationBlock>> {
        self.maybe_inject_fault("storage_read")?;
        self.state.lock().peek(id)
    }

    async fn delete(&self, id: &str) -> StorageResult<bool> {
        self.maybe_inject_fault("storage_delete")?;
        Ok(self.state.lock().remove(id))
    }

    #[tracing::instrument(skip(self))]
    async fn migrate(&self, id: &str, to: MemoryTier) -> StorageResult<Vec<TierTransition>> {
        self.maybe_inject_fault("storage_write")?;
        let now = self.clock.now();
        self.state.lock().migrate(id, to, now)
    }

    async fn list_keys(
        &self,
        prefix: Option<&str>,
        session_id: Option<&str>,
    ) -> StorageResult<Vec<String>> {
        self.maybe_inject_fault("storage_read")?;
        Ok(self.state.lock().list_keys(prefix, session_id))
    }

    async fn blocks(
        &self,
        tier: Option<MemoryTier>,
        session_id: Option<&str>,
    ) -> StorageResult<Vec<ConversationBlock>> {
        self.maybe_inject_fault("storage_read")?;
        self.state.lock().list(tier, session_id)
    }

    async fn sessions(&self) -> StorageResult<Vec<String>> {
        self.maybe_inject_fault("storage_read")?;
        Ok(self.state.lock().sessions())
    }

    async fn stats(&self) -> StorageResult<TierStats> {
        Ok(self.state.lock().stats())
    }

    async fn purge_cold(&self, max_age_ms: u64) -> StorageResult<Vec<String>> {
        self.maybe_inject_fault("storage_delete")?;
        let now = self.clock.now();
        Ok(self.state.lock().purge_cold_older_than(max_age_ms, now))
    }

    fn name(&self) -> &'static str {
        "tiered"
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dst::{DeterministicRng, FaultConfig, FaultInjectorBuilder, FaultType, SimClock};
    use crate::entities::BlockSource;

    const T0_MS: u64 = 1_700_000_000_000;

    fn store() -> TieredStore {
        TieredStore::new(
            &TierConfig::default(),
            PlacementConfig::default(),
            Clock::Simulated(SimClock::at_ms(T0_MS)),
        )
    }

    fn block(seq: u64, score: Option<f64>) -> ConversationBlock {
        let t0 = SimClock::at_ms(T0_MS).now();
        let mut b = ConversationBlock::new("s1", seq, format!("content {seq}"), BlockSource::User, "m", t0)
            .with_id(format!("b{seq}"));
        b.relevance_score = score;
        b
    }

    #[tokio::test]
    async fn test_placement_by_score() {
        let store = store();
        let cases = [
            (None, MemoryTier::Hot),
            (Some(0.9), MemoryTier::Hot),
            (Some(0.7), MemoryTier::Warm),
            (Some(0.5), MemoryTier::Warm),
            (Some(0.4), MemoryTier::Cold),
            (Some(0.1), MemoryTier::Cold),
        ];
        for (seq, (score, expected)) in cases.into_iter().enumerate() {
            let receipt = store.store(block(seq as u64, score), None).await.unwrap();
            assert_eq!(receipt.tier, expected, "score {score:?}");
        }
        store.check_invariants().unwrap();
    }

    #[tokio::test]
    async fn test_explicit_tier_wins() {
        let store = store();
        let receipt = store
            .store(block(0, Some(0.1)), Some(MemoryTier::Hot))
            .await
            .unwrap();
        assert_eq!(receipt.tier, MemoryTier::Hot);
        assert_eq!(store.tier_of("b0"), Some(MemoryTier::Hot));
    }

    #[tokio::test]
    async fn test_retrieve_records_access() {
        let store = store();
        store.store(block(0, None), None).await.unwrap();

        let first = store.retrieve("b0").await.unwrap().unwrap();
        let second = store.retrieve("b0").await.unwrap().unwrap();
        assert_eq!(first.access_count(), 1);
        assert_eq!(second.access_count(), 2);

        let peeked = store.peek("b0").await.unwrap().unwrap();
        assert_eq!(peeked.access_count(), 2);
        assert!(store.retrieve("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_fault_leaves_state_untouched() {
        let faults = FaultInjectorBuilder::new(DeterministicRng::new(7))
            .with_fault(FaultConfig::new(FaultType::StorageWriteFail, 1.0))
            .build();
        let store = store().with_fault_injector(Arc::new(faults));

        let result = store.store(block(0, None), None).await;
        assert!(matches!(result, Err(StorageError::SimulatedFault { .. })));
        assert!(result.unwrap_err().is_transient());
        assert!(store.is_empty());

        // Reads are unaffected by write faults.
        assert!(store.retrieve("b0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_and_sessions() {
        let store = store();
        store.store(block(0, None), None).await.unwrap();
        assert_eq!(store.sessions().await.unwrap(), vec!["s1"]);

        assert!(store.delete("b0").await.unwrap());
        assert!(!store.delete("b0").await.unwrap());
        assert!(store.sessions().await.unwrap().is_empty());
    }
}
