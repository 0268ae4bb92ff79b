//! Events - Fire-and-Forget Notifications
//!
//! `TigerStyle`: Publishing never fails and never blocks. A sink with no
//! subscribers drops events silently; slow subscribers lag and lose the
//! oldest events of the bounded backlog.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::constants::EVENTS_BACKLOG_COUNT_DEFAULT;
use crate::entities::MemoryTier;

/// Something observable happened to stored memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum MemoryEvent {
    /// A block was stored
    BlockStored {
        /// Block id
        block_id: String,
        /// Owning session
        session_id: String,
        /// Tier it landed in
        tier: MemoryTier,
    },
    /// A block was deleted explicitly
    BlockDeleted {
        /// Block id
        block_id: String,
        /// Why
        reason: String,
    },
    /// A block changed tier or was evicted out of Cold
    TierChanged {
        /// Block id
        block_id: String,
        /// Tier it left
        from: MemoryTier,
        /// Tier it entered; `None` when evicted
        to: Option<MemoryTier>,
    },
    /// An optimize sweep finished
    Optimized {
        /// Blocks moved toward Hot
        promoted: usize,
        /// Blocks moved toward Cold
        demoted: usize,
        /// Blocks deleted
        removed: usize,
    },
    /// The correction loop acted on a block
    Correction {
        /// `removal` or `improvement`
        action: String,
        /// Original block, then replacement if any
        block_ids: Vec<String>,
        /// Owning session
        session_id: String,
        /// Why
        reason: String,
        /// When
        timestamp: DateTime<Utc>,
    },
}

/// Destination for memory events.
#[async_trait]
pub trait EventSink: Send + Sync + std::fmt::Debug {
    /// Publish an event. Delivery is best-effort.
    async fn publish(&self, event: MemoryEvent);
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn publish(&self, _event: MemoryEvent) {}
}

/// Sink backed by a tokio broadcast channel.
#[derive(Debug)]
pub struct BroadcastSink {
    sender: broadcast::Sender<MemoryEvent>,
    published: AtomicU64,
    undelivered: AtomicU64,
}

impl BroadcastSink {
    /// Create a sink that retains up to `backlog` events per subscriber.
    ///
    /// # Panics
    /// Panics if `backlog` is zero.
    #[must_use]
    pub fn new(backlog: usize) -> Self {
        assert!(backlog > 0, "event backlog must be positive");
        let (sender, _receiver) = broadcast::channel(backlog);
        Self {
            sender,
            published: AtomicU64::new(0),
            undelivered: AtomicU64::new(0),
        }
    }

    /// Subscribe to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MemoryEvent> {
        self.sender.subscribe()
    }

    /// `(published, published with no subscriber)`.
    #[must_use]
    pub fn counts(&self) -> (u64, u64) {
        (
            self.published.load(Ordering::Relaxed),
            self.undelivered.load(Ordering::Relaxed),
        )
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(EVENTS_BACKLOG_COUNT_DEFAULT)
    }
}

#[async_trait]
impl EventSink for BroadcastSink {
    async fn publish(&self, event: MemoryEvent) {
        self.published.fetch_add(1, Ordering::Relaxed);
        if self.sender.send(event).is_err() {
            self.undelivered.fetch_add(1, Ordering::Relaxed);
        }
    }
}
