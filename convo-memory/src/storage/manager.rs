//! Tiered Memory Manager - Placement, Migration, and Maintenance
//!
//! `TigerStyle`: Sole authority over where blocks live. Every tier move goes
//! through the backend's `migrate`, and every move is published as an event.
//!
//! Maintenance runs `optimize` and the Cold purge on a fixed interval in a
//! background task. Cancellation is observed only between sweeps.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::backend::{StorageBackend, StoreReceipt};
use super::tiers::{TierStats, TierTransition, TransitionKind};
use crate::constants::{
    COLD_RETENTION_MS_DEFAULT, OPTIMIZE_HOT_AGE_MS_MAX, OPTIMIZE_PROMOTION_ACCESS_COUNT,
    OPTIMIZE_WARM_AGE_MS_MAX, PLACEMENT_RELEVANCE_THRESHOLD_DEFAULT,
};
use crate::dst::Clock;
use crate::entities::{ConversationBlock, MemoryTier};
use crate::error::{MemoryError, MemoryResult};
use crate::evaluation::{Decision, EvaluationMetadata, RelevanceEvaluator};
use crate::events::{EventSink, MemoryEvent, NullSink};

/// Counts from one optimize sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizeReport {
    /// Blocks moved to Hot
    pub promoted: usize,
    /// Blocks moved one tier down
    pub demoted: usize,
    /// Blocks deleted for low relevance
    pub removed: usize,
}

/// Owner of tier placement for all sessions.
#[derive(Debug)]
pub struct TieredMemoryManager {
    backend: Arc<dyn StorageBackend>,
    evaluator: Arc<dyn RelevanceEvaluator>,
    events: Arc<dyn EventSink>,
    clock: Clock,
    relevance_threshold: f64,
    cold_retention_ms: u64,
}

impl TieredMemoryManager {
    /// Create a manager over `backend`.
    #[must_use]
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        evaluator: Arc<dyn RelevanceEvaluator>,
        clock: Clock,
    ) -> Self {
        Self {
            backend,
            evaluator,
            events: Arc::new(NullSink),
            clock,
            relevance_threshold: PLACEMENT_RELEVANCE_THRESHOLD_DEFAULT,
            cold_retention_ms: COLD_RETENTION_MS_DEFAULT,
        }
    }

    /// Publish events to `events`.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Score below which `optimize` deletes a block.
    ///
    /// # Panics
    /// Panics if `threshold` is outside [0, 1].
    #[must_use]
    pub fn with_relevance_threshold(mut self, threshold: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&threshold),
            "relevance threshold must be in [0, 1]"
        );
        self.relevance_threshold = threshold;
        self
    }

    /// Age past which Cold summaries are purged.
    #[must_use]
    pub fn with_cold_retention_ms(mut self, retention_ms: u64) -> Self {
        self.cold_retention_ms = retention_ms;
        self
    }

    /// Underlying backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Evaluator used by `cleanup_irrelevant`.
    #[must_use]
    pub fn evaluator(&self) -> &Arc<dyn RelevanceEvaluator> {
        &self.evaluator
    }

    /// Clock used for ages.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Store a block, placed by score when `tier` is `None`.
    ///
    /// # Errors
    /// `MemoryError::Validation` for malformed blocks, `Storage` on backend
    /// failure.
    pub async fn store(
        &self,
        block: ConversationBlock,
        tier: Option<MemoryTier>,
    ) -> MemoryResult<StoreReceipt> {
        let block_id = block.id.clone();
        let session_id = block.session_id.clone();

        let receipt = self.backend.store(block, tier).await?;

        self.events
            .publish(MemoryEvent::BlockStored {
                block_id,
                session_id,
                tier: receipt.tier,
            })
            .await;
        self.publish_transitions(&receipt.transitions).await;
        Ok(receipt)
    }

    /// Retrieve a block, recording the access.
    ///
    /// # Errors
    /// `MemoryError::NotFound` for unknown ids.
    pub async fn retrieve(&self, id: &str) -> MemoryResult<ConversationBlock> {
        let before = self.backend_tier(id).await;
        let block = self
            .backend
            .retrieve(id)
            .await?
            .ok_or_else(|| MemoryError::block_not_found(id))?;

        if let Some(from) = before.filter(|t| *t != block.memory_tier()) {
            self.publish_transitions(&[TierTransition::new(id, from, Some(block.memory_tier()))])
                .await;
        }
        Ok(block)
    }

    /// Delete a block. Returns whether it existed.
    ///
    /// # Errors
    /// `MemoryError::Storage` on backend failure.
    pub async fn delete(&self, id: &str, reason: &str) -> MemoryResult<bool> {
        let existed = self.backend.delete(id).await?;
        if existed {
            tracing::debug!(block_id = %id, reason, "deleted block");
            self.events
                .publish(MemoryEvent::BlockDeleted {
                    block_id: id.to_string(),
                    reason: reason.to_string(),
                })
                .await;
        }
        Ok(existed)
    }

    /// Move a block to `to`.
    ///
    /// # Errors
    /// `MemoryError::NotFound` for unknown ids.
    pub async fn migrate(&self, id: &str, to: MemoryTier) -> MemoryResult<Vec<TierTransition>> {
        let transitions = self.backend.migrate(id, to).await?;
        self.publish_transitions(&transitions).await;
        Ok(transitions)
    }

    /// One policy sweep over every block.
    ///
    /// Per block, first match wins: delete if scored below the relevance
    /// threshold; Hot older than a day goes Warm; Warm older than three days
    /// goes Cold; more than ten accesses outside Hot goes Hot.
    ///
    /// # Errors
    /// `MemoryError::Storage` if the block listing fails. Failures on single
    /// blocks are logged and skipped.
    #[tracing::instrument(skip(self))]
    pub async fn optimize(&self) -> MemoryResult<OptimizeReport> {
        let now = self.clock.now();
        let blocks = self.backend.blocks(None, None).await?;
        let mut report = OptimizeReport::default();

        for block in blocks {
            if block
                .relevance_score
                .is_some_and(|s| s < self.relevance_threshold)
            {
                match self.delete(&block.id, "below relevance threshold").await {
                    Ok(true) => report.removed += 1,
                    Ok(false) => {}
                    Err(e) => tracing::warn!(block_id = %block.id, error = %e, "optimize delete failed"),
                }
                continue;
            }

            let age_ms = block.age_ms(now);
            let tier = block.memory_tier();
            let target = if tier == MemoryTier::Hot && age_ms > OPTIMIZE_HOT_AGE_MS_MAX {
                Some(MemoryTier::Warm)
            } else if tier == MemoryTier::Warm && age_ms > OPTIMIZE_WARM_AGE_MS_MAX {
                Some(MemoryTier::Cold)
            } else if tier != MemoryTier::Hot
                && block.access_count() > OPTIMIZE_PROMOTION_ACCESS_COUNT
            {
                Some(MemoryTier::Hot)
            } else {
                None
            };

            let Some(target) = target else {
                continue;
            };
            match self.migrate(&block.id, target).await {
                Ok(_) if target < tier => report.promoted += 1,
                Ok(_) => report.demoted += 1,
                Err(e) if e.is_not_found() => {}
                Err(e) => tracing::warn!(block_id = %block.id, error = %e, "optimize migrate failed"),
            }
        }

        tracing::info!(
            promoted = report.promoted,
            demoted = report.demoted,
            removed = report.removed,
            "optimized tiers"
        );
        self.events
            .publish(MemoryEvent::Optimized {
                promoted: report.promoted,
                demoted: report.demoted,
                removed: report.removed,
            })
            .await;
        Ok(report)
    }

    /// Evaluate a session's blocks and delete those decided Remove.
    ///
    /// # Errors
    /// `MemoryError::Storage` if the session cannot be listed.
    #[tracing::instrument(skip(self))]
    pub async fn cleanup_irrelevant(&self, session_id: &str) -> MemoryResult<usize> {
        let blocks = self.backend.blocks(None, Some(session_id)).await?;
        if blocks.is_empty() {
            return Ok(0);
        }

        let scores = self
            .evaluator
            .batch_evaluate(&blocks, &EvaluationMetadata::default())
            .await;

        let mut removed = 0;
        for (block, score) in blocks.iter().zip(scores) {
            if score.decision != Decision::Remove {
                continue;
            }
            match self.delete(&block.id, &score.explanation).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(block_id = %block.id, error = %e, "cleanup delete failed"),
            }
        }

        tracing::info!(session_id, evaluated = blocks.len(), removed, "cleaned up irrelevant blocks");
        Ok(removed)
    }

    /// Tier usage and counters.
    ///
    /// # Errors
    /// `MemoryError::Storage` on backend failure.
    pub async fn stats(&self) -> MemoryResult<TierStats> {
        Ok(self.backend.stats().await?)
    }

    /// Blocks filtered by tier and session, ordered by `(sequence, id)`.
    ///
    /// # Errors
    /// `MemoryError::Storage` on backend failure.
    pub async fn list_blocks(
        &self,
        tier: Option<MemoryTier>,
        session_id: Option<&str>,
    ) -> MemoryResult<Vec<ConversationBlock>> {
        Ok(self.backend.blocks(tier, session_id).await?)
    }

    /// The most recent `window` blocks of a session, oldest first. Access
    /// metadata is not touched.
    ///
    /// # Errors
    /// `MemoryError::Storage` on backend failure.
    pub async fn session_blocks(
        &self,
        session_id: &str,
        window: Option<usize>,
    ) -> MemoryResult<Vec<ConversationBlock>> {
        let mut blocks = self.backend.blocks(None, Some(session_id)).await?;
        if let Some(window) = window {
            let skip = blocks.len().saturating_sub(window);
            blocks.drain(..skip);
        }
        Ok(blocks)
    }

    /// Sessions with at least one stored block.
    ///
    /// # Errors
    /// `MemoryError::Storage` on backend failure.
    pub async fn sessions(&self) -> MemoryResult<Vec<String>> {
        Ok(self.backend.sessions().await?)
    }

    /// Drop Cold summaries past the retention window. Returns how many.
    ///
    /// # Errors
    /// `MemoryError::Storage` on backend failure.
    pub async fn purge_stale_archives(&self) -> MemoryResult<usize> {
        let purged = self.backend.purge_cold(self.cold_retention_ms).await?;
        if !purged.is_empty() {
            tracing::info!(count = purged.len(), "purged stale cold summaries");
        }
        for id in &purged {
            self.events
                .publish(MemoryEvent::BlockDeleted {
                    block_id: id.clone(),
                    reason: "cold retention expired".to_string(),
                })
                .await;
        }
        Ok(purged.len())
    }

    /// Run optimize and the Cold purge every `interval` until shut down.
    #[must_use]
    pub fn start_maintenance(self: &Arc<Self>, interval: Duration) -> MaintenanceHandle {
        assert!(!interval.is_zero(), "maintenance interval must be positive");

        let token = CancellationToken::new();
        let manager = Arc::clone(self);
        let child = token.clone();

        let handle = tokio::spawn(async move {
            tracing::info!(
                interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
                "tier maintenance started"
            );
            loop {
                tokio::select! {
                    () = child.cancelled() => break,
                    () = manager.clock.sleep(interval) => {}
                }

                if let Err(e) = manager.optimize().await {
                    tracing::error!(error = %e, "tier optimize failed");
                }
                if let Err(e) = manager.purge_stale_archives().await {
                    tracing::error!(error = %e, "cold purge failed");
                }
            }
            tracing::info!("tier maintenance stopped");
        });

        MaintenanceHandle { token, handle }
    }

    async fn backend_tier(&self, id: &str) -> Option<MemoryTier> {
        self.backend
            .peek(id)
            .await
            .ok()
            .flatten()
            .map(|b| b.memory_tier())
    }

    async fn publish_transitions(&self, transitions: &[TierTransition]) {
        for t in transitions {
            if t.kind() == TransitionKind::Eviction {
                tracing::debug!(block_id = %t.block_id, "block evicted from cold");
            }
            self.events
                .publish(MemoryEvent::TierChanged {
                    block_id: t.block_id.clone(),
                    from: t.from,
                    to: t.to,
                })
                .await;
        }
    }
}

/// Running maintenance task.
#[derive(Debug)]
pub struct MaintenanceHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Request a stop and wait for any in-flight sweep to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "maintenance task panicked");
        }
    }

    /// Whether the task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

// =============================================================================
// Tests
// =============================================================================
