//! Evaluation Cache - Bounded FIFO Around Any Evaluator
//!
//! `TigerStyle`: Keyed by `(block id, context size)`. The lock is never held
//! across the inner evaluation.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{EvaluationMetadata, RelevanceEvaluator, RelevanceScore};
use crate::constants::EVAL_CACHE_ENTRIES_COUNT_MAX;
use crate::entities::ConversationBlock;

type CacheKey = (String, usize);

#[derive(Debug, Default)]
struct CacheState {
    scores: HashMap<CacheKey, RelevanceScore>,
    order: VecDeque<CacheKey>,
}

/// Caching wrapper. Oldest entries are dropped first.
#[derive(Debug)]
pub struct CachedEvaluator {
    inner: Arc<dyn RelevanceEvaluator>,
    capacity: usize,
    state: Mutex<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachedEvaluator {
    /// Wrap `inner` with a cache of `capacity` entries.
    ///
    /// # Panics
    /// Panics if capacity is zero or exceeds `EVAL_CACHE_ENTRIES_COUNT_MAX`.
    #[must_use]
    pub fn new(inner: Arc<dyn RelevanceEvaluator>, capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be positive");
        assert!(
            capacity <= EVAL_CACHE_ENTRIES_COUNT_MAX,
            "cache capacity {capacity} exceeds {EVAL_CACHE_ENTRIES_COUNT_MAX}"
        );
        Self {
            inner,
            capacity,
            state: Mutex::new(CacheState::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Drop every cached score.
    pub fn clear_cache(&self) {
        let mut state = self.state.lock();
        state.scores.clear();
        state.order.clear();
        tracing::info!("cleared relevance evaluation cache");
    }

    /// Cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().scores.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(hits, misses)` so far.
    #[must_use]
    pub fn hit_stats(&self) -> (u64, u64) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }

    fn insert(&self, key: CacheKey, score: RelevanceScore) {
        let mut state = self.state.lock();
        if state.scores.insert(key.clone(), score).is_none() {
            state.order.push_back(key);
        }
        while state.order.len() > self.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.scores.remove(&oldest);
            }
        }
        debug_assert_eq!(state.order.len(), state.scores.len());
    }
}

#[async_trait]
impl RelevanceEvaluator for CachedEvaluator {
    async fn evaluate(
        &self,
        block: &ConversationBlock,
        context: &[ConversationBlock],
        metadata: &EvaluationMetadata,
    ) -> RelevanceScore {
        let key = (block.id.clone(), context.len());

        let cached = self.state.lock().scores.get(&key).cloned();
        if let Some(score) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return score;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let score = self.inner.evaluate(block, context, metadata).await;
        self.insert(key, score.clone());
        score
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
