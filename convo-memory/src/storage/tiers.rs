//! Tier Set - Hot/Warm/Cold LRU Hierarchy
//!
//! `TigerStyle`: One synchronous structure owns all three tiers, the id
//! index, and the session index. Every mutation leaves a block in exactly one
//! tier. Callers wrap it in a single lock.
//!
//! Overflow cascades downward: the LRU entry of a full tier is demoted one
//! tier. Overflowing Cold deletes the entry for good.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::codec::WarmPayload;
use super::error::{StorageError, StorageResult};
use super::lru::LruList;
use super::summary::ColdSummary;
use crate::config::TierConfig;
use crate::dst::elapsed_ms;
use crate::entities::{ConversationBlock, MemoryTier, ProcessingStatus};

// =============================================================================
// Transitions
// =============================================================================

/// Direction of a tier move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    /// Toward Hot
    Promotion,
    /// Toward Cold
    Demotion,
    /// Out of Cold, permanently
    Eviction,
}

/// One block moving between tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierTransition {
    /// Block moved
    pub block_id: String,
    /// Tier it left
    pub from: MemoryTier,
    /// Tier it entered; `None` when evicted
    pub to: Option<MemoryTier>,
}

impl TierTransition {
    /// Create a transition record.
    #[must_use]
    pub fn new(block_id: impl Into<String>, from: MemoryTier, to: Option<MemoryTier>) -> Self {
        Self {
            block_id: block_id.into(),
            from,
            to,
        }
    }

    /// Promotion, demotion, or eviction.
    #[must_use]
    pub fn kind(&self) -> TransitionKind {
        match self.to {
            None => TransitionKind::Eviction,
            Some(to) if to < self.from => TransitionKind::Promotion,
            Some(_) => TransitionKind::Demotion,
        }
    }
}

// =============================================================================
// Stats
// =============================================================================

/// Cumulative counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounters {
    /// Successful stores
    pub stored: u64,
    /// Successful retrievals
    pub retrieved: u64,
    /// Warm payloads that were gzip-compressed
    pub compressed: u64,
    /// Moves toward Hot
    pub promotions: u64,
    /// Moves toward Cold
    pub demotions: u64,
    /// Permanent deletions out of Cold
    pub evictions: u64,
    /// Bytes saved by compression
    pub bytes_saved: u64,
}

/// Usage of one tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierUsage {
    /// Blocks held
    pub count: usize,
    /// Capacity
    pub capacity: usize,
    /// Approximate bytes held
    pub bytes: usize,
}

/// Snapshot of all tiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierStats {
    /// Hot tier
    pub hot: TierUsage,
    /// Warm tier
    pub warm: TierUsage,
    /// Cold tier
    pub cold: TierUsage,
    /// Blocks across all tiers
    pub total_blocks: usize,
    /// Sessions with at least one block
    pub sessions: usize,
    /// Cumulative counters
    pub counters: TierCounters,
}

impl TierStats {
    /// Usage for `tier`.
    #[must_use]
    pub fn usage(&self, tier: MemoryTier) -> TierUsage {
        match tier {
            MemoryTier::Hot => self.hot,
            MemoryTier::Warm => self.warm,
            MemoryTier::Cold => self.cold,
        }
    }

    /// Bytes held across tiers.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.hot.bytes + self.warm.bytes + self.cold.bytes
    }
}

/// A retrieved block plus any moves the retrieval caused.
#[derive(Debug, Clone)]
pub struct Retrieval {
    /// The block, access already recorded
    pub block: ConversationBlock,
    /// Promotion and its cascade, if any
    pub transitions: Vec<TierTransition>,
}

// =============================================================================
// Tier Set
// =============================================================================

#[derive(Debug)]
struct WarmEntry {
    session_id: String,
    payload: WarmPayload,
    access_count: u64,
    last_accessed: DateTime<Utc>,
}

impl WarmEntry {
    fn to_block(&self) -> StorageResult<ConversationBlock> {
        let mut block = self.payload.decode()?;
        block.access_count = self.access_count;
        block.last_accessed = self.last_accessed;
        if self.payload.is_compressed() {
            block.processing_status = ProcessingStatus::Compressed;
        }
        Ok(block)
    }
}

/// The three tiers and their indexes.
#[derive(Debug)]
pub struct TierSet {
    hot: LruList<ConversationBlock>,
    warm: LruList<WarmEntry>,
    cold: LruList<ColdSummary>,
    index: HashMap<String, MemoryTier>,
    sessions: BTreeMap<String, BTreeSet<String>>,
    compression_threshold_bytes: usize,
    warm_promotion_access_count: u64,
    counters: TierCounters,
}

impl TierSet {
    /// Create empty tiers.
    ///
    /// # Panics
    /// Panics if any capacity is zero.
    #[must_use]
    pub fn new(config: &TierConfig) -> Self {
        Self {
            hot: LruList::new(config.hot_capacity),
            warm: LruList::new(config.warm_capacity),
            cold: LruList::new(config.cold_capacity),
            index: HashMap::new(),
            sessions: BTreeMap::new(),
            compression_threshold_bytes: config.compression_threshold_bytes,
            warm_promotion_access_count: config.warm_promotion_access_count,
            counters: TierCounters::default(),
        }
    }

    /// Blocks held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether no block is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Tier currently holding `id`.
    #[must_use]
    pub fn tier_of(&self, id: &str) -> Option<MemoryTier> {
        self.index.get(id).copied()
    }

    /// Store `block` in `tier`, replacing any block with the same id.
    ///
    /// # Errors
    /// Returns `StorageError::Validation` for malformed blocks.
    pub fn insert(
        &mut self,
        block: ConversationBlock,
        tier: MemoryTier,
        now: DateTime<Utc>,
    ) -> StorageResult<Vec<TierTransition>> {
        block.validate().map_err(StorageError::validation)?;

        self.detach(&block.id);
        let mut transitions = Vec::new();
        self.place(block, tier, now, &mut transitions)?;
        self.counters.stored += 1;
        Ok(transitions)
    }

    /// Look up `id`, record the access, and promote hot Warm blocks.
    ///
    /// # Errors
    /// Returns `StorageError::Codec` if a Warm payload is corrupt.
    pub fn retrieve(&mut self, id: &str, now: DateTime<Utc>) -> StorageResult<Option<Retrieval>> {
        let Some(tier) = self.tier_of(id) else {
            return Ok(None);
        };

        let mut transitions = Vec::new();
        let block = match tier {
            MemoryTier::Hot => {
                let block = self.hot.get_mut(id).ok_or_else(|| missing(id, tier))?;
                block.record_access(now);
                let block = block.clone();
                self.hot.touch(id);
                block
            }
            MemoryTier::Warm => {
                let entry = self.warm.get_mut(id).ok_or_else(|| missing(id, tier))?;
                entry.access_count = entry.access_count.saturating_add(1);
                entry.last_accessed = now;
                let mut block = entry.to_block()?;
                self.warm.touch(id);

                if block.access_count() > self.warm_promotion_access_count {
                    self.warm.remove(id);
                    self.counters.promotions += 1;
                    transitions.push(TierTransition::new(id, tier, Some(MemoryTier::Hot)));
                    tracing::debug!(block_id = %id, accesses = block.access_count(), "promoting warm block");
                    block.compressed_size = None;
                    self.place(block.clone(), MemoryTier::Hot, now, &mut transitions)?;
                    block.set_tier(MemoryTier::Hot);
                }
                block
            }
            MemoryTier::Cold => {
                let summary = self.cold.get_mut(id).ok_or_else(|| missing(id, tier))?;
                summary.record_access(now);
                let block = summary.to_block();
                self.cold.touch(id);
                block
            }
        };

        self.counters.retrieved += 1;
        Ok(Some(Retrieval { block, transitions }))
    }

    /// Read `id` without touching access metadata or recency.
    ///
    /// # Errors
    /// Returns `StorageError::Codec` if a Warm payload is corrupt.
    pub fn peek(&self, id: &str) -> StorageResult<Option<ConversationBlock>> {
        let Some(tier) = self.tier_of(id) else {
            return Ok(None);
        };
        let block = match tier {
            MemoryTier::Hot => self.hot.get(id).cloned().ok_or_else(|| missing(id, tier))?,
            MemoryTier::Warm => self.warm.get(id).ok_or_else(|| missing(id, tier))?.to_block()?,
            MemoryTier::Cold => self.cold.get(id).ok_or_else(|| missing(id, tier))?.to_block(),
        };
        Ok(Some(block))
    }

    /// Delete `id`. Returns whether it existed.
    pub fn remove(&mut self, id: &str) -> bool {
        self.detach(id).is_some()
    }

    /// Move `id` to `to`. The block is never held by two tiers.
    ///
    /// # Errors
    /// Returns `StorageError::NotFound` for unknown ids.
    pub fn migrate(
        &mut self,
        id: &str,
        to: MemoryTier,
        now: DateTime<Utc>,
    ) -> StorageResult<Vec<TierTransition>> {
        let from = self.tier_of(id).ok_or_else(|| StorageError::not_found(id))?;
        if from == to {
            return Ok(Vec::new());
        }

        let mut block = self.take(id)?.ok_or_else(|| StorageError::not_found(id))?;
        block.compressed_size = None;

        let mut transitions = vec![TierTransition::new(id, from, Some(to))];
        if to < from {
            self.counters.promotions += 1;
        } else {
            self.counters.demotions += 1;
        }
        self.place(block, to, now, &mut transitions)?;
        Ok(transitions)
    }

    /// Blocks filtered by tier and session, ordered by `(sequence, id)`.
    ///
    /// # Errors
    /// Returns `StorageError::Codec` if a Warm payload is corrupt.
    pub fn list(
        &self,
        tier: Option<MemoryTier>,
        session_id: Option<&str>,
    ) -> StorageResult<Vec<ConversationBlock>> {
        let mut blocks = Vec::new();
        for id in self.ids(session_id) {
            if tier.is_some_and(|t| self.tier_of(id) != Some(t)) {
                continue;
            }
            if let Some(block) = self.peek(id)? {
                blocks.push(block);
            }
        }
        blocks.sort_by(|a, b| {
            a.sequence_number
                .cmp(&b.sequence_number)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(blocks)
    }

    /// Sorted ids matching an optional prefix and session.
    #[must_use]
    pub fn list_keys(&self, prefix: Option<&str>, session_id: Option<&str>) -> Vec<String> {
        let mut keys: Vec<String> = self
            .ids(session_id)
            .filter(|id| prefix.map_or(true, |p| id.starts_with(p)))
            .map(str::to_string)
            .collect();
        keys.sort();
        keys
    }

    /// Sessions with at least one stored block.
    #[must_use]
    pub fn sessions(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    /// Drop Cold summaries archived more than `max_age_ms` ago.
    pub fn purge_cold_older_than(&mut self, max_age_ms: u64, now: DateTime<Utc>) -> Vec<String> {
        let stale: Vec<String> = self
            .cold
            .iter()
            .filter(|(_, summary)| elapsed_ms(summary.archived_at, now) > max_age_ms)
            .map(|(id, _)| id.to_string())
            .collect();
        for id in &stale {
            self.detach(id);
        }
        stale
    }

    /// Usage and counters.
    #[must_use]
    pub fn stats(&self) -> TierStats {
        TierStats {
            hot: TierUsage {
                count: self.hot.len(),
                capacity: self.hot.capacity(),
                bytes: self.hot.iter().map(|(_, b)| b.content.len()).sum(),
            },
            warm: TierUsage {
                count: self.warm.len(),
                capacity: self.warm.capacity(),
                bytes: self.warm.iter().map(|(_, e)| e.payload.stored_size()).sum(),
            },
            cold: TierUsage {
                count: self.cold.len(),
                capacity: self.cold.capacity(),
                bytes: self.cold.iter().map(|(_, s)| s.size_bytes()).sum(),
            },
            total_blocks: self.len(),
            sessions: self.sessions.len(),
            counters: self.counters,
        }
    }

    /// Check capacity, index, and session-index consistency.
    ///
    /// # Errors
    /// Returns a description of the first violation.
    pub fn check_invariants(&self) -> Result<(), String> {
        for tier in MemoryTier::ALL {
            let (len, cap) = self.len_and_capacity(tier);
            if len > cap {
                return Err(format!("{tier} holds {len} blocks, capacity {cap}"));
            }
        }

        let held = self.hot.len() + self.warm.len() + self.cold.len();
        if held != self.index.len() {
            return Err(format!("tiers hold {held} blocks, index has {}", self.index.len()));
        }

        for (id, tier) in &self.index {
            for candidate in MemoryTier::ALL {
                let present = self.holds(candidate, id);
                if present != (candidate == *tier) {
                    return Err(format!("block {id} indexed in {tier}, present in {candidate}: {present}"));
                }
            }
        }

        let in_sessions: usize = self.sessions.values().map(BTreeSet::len).sum();
        if in_sessions != self.index.len() {
            return Err(format!(
                "session index has {in_sessions} ids, index has {}",
                self.index.len()
            ));
        }
        for (session, ids) in &self.sessions {
            if ids.is_empty() {
                return Err(format!("session {session} has an empty id set"));
            }
            if let Some(id) = ids.iter().find(|id| !self.index.contains_key(*id)) {
                return Err(format!("session {session} lists unknown block {id}"));
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn place(
        &mut self,
        mut block: ConversationBlock,
        tier: MemoryTier,
        now: DateTime<Utc>,
        transitions: &mut Vec<TierTransition>,
    ) -> StorageResult<()> {
        let id = block.id.clone();
        let session_id = block.session_id.clone();
        block.set_tier(tier);

        match tier {
            MemoryTier::Hot => {
                self.hot.insert(id.clone(), block);
            }
            MemoryTier::Warm => {
                let payload = WarmPayload::encode(&block, self.compression_threshold_bytes)?;
                if payload.is_compressed() {
                    self.counters.compressed += 1;
                    self.counters.bytes_saved += payload.bytes_saved() as u64;
                }
                self.warm.insert(
                    id.clone(),
                    WarmEntry {
                        session_id: session_id.clone(),
                        payload,
                        access_count: block.access_count(),
                        last_accessed: block.last_accessed(),
                    },
                );
            }
            MemoryTier::Cold => {
                self.cold.insert(id.clone(), ColdSummary::from_block(&block, now));
            }
        }

        self.index.insert(id.clone(), tier);
        self.sessions.entry(session_id).or_default().insert(id);
        self.cascade(tier, now, transitions)
    }

    fn cascade(
        &mut self,
        tier: MemoryTier,
        now: DateTime<Utc>,
        transitions: &mut Vec<TierTransition>,
    ) -> StorageResult<()> {
        while self.is_over_capacity(tier) {
            let Some((id, block)) = self.pop_lru(tier)? else {
                break;
            };
            match tier.next_down() {
                Some(lower) => {
                    tracing::debug!(block_id = %id, from = %tier, to = %lower, "demoting lru block");
                    self.counters.demotions += 1;
                    transitions.push(TierTransition::new(id, tier, Some(lower)));
                    self.place(block, lower, now, transitions)?;
                }
                None => {
                    tracing::debug!(block_id = %id, "evicting cold summary");
                    self.forget(&id, &block.session_id);
                    self.counters.evictions += 1;
                    transitions.push(TierTransition::new(id, tier, None));
                }
            }
        }
        Ok(())
    }

    /// Pop the LRU entry of `tier` as a block. The id stays indexed until
    /// the caller re-places or forgets it.
    fn pop_lru(&mut self, tier: MemoryTier) -> StorageResult<Option<(String, ConversationBlock)>> {
        match tier {
            MemoryTier::Hot => Ok(self.hot.pop_lru()),
            MemoryTier::Warm => {
                let Some((id, entry)) = self.warm.pop_lru() else {
                    return Ok(None);
                };
                match entry.to_block() {
                    Ok(mut block) => {
                        block.compressed_size = None;
                        Ok(Some((id, block)))
                    }
                    Err(e) => {
                        tracing::error!(block_id = %id, error = %e, "dropping undecodable warm block");
                        self.forget(&id, &entry.session_id);
                        Err(e)
                    }
                }
            }
            MemoryTier::Cold => Ok(self.cold.pop_lru().map(|(id, s)| (id, s.to_block()))),
        }
    }

    /// Remove `id` from its tier and return it as a block.
    fn take(&mut self, id: &str) -> StorageResult<Option<ConversationBlock>> {
        let Some(tier) = self.tier_of(id) else {
            return Ok(None);
        };
        let (session_id, block) = match tier {
            MemoryTier::Hot => match self.hot.remove(id) {
                Some(block) => (block.session_id.clone(), Ok(block)),
                None => return Err(missing(id, tier)),
            },
            MemoryTier::Warm => match self.warm.remove(id) {
                Some(entry) => (entry.session_id.clone(), entry.to_block()),
                None => return Err(missing(id, tier)),
            },
            MemoryTier::Cold => match self.cold.remove(id) {
                Some(summary) => (summary.session_id.clone(), Ok(summary.to_block())),
                None => return Err(missing(id, tier)),
            },
        };
        self.forget(id, &session_id);
        block.map(Some)
    }

    /// Remove `id` from every structure. Returns the tier it was in.
    fn detach(&mut self, id: &str) -> Option<MemoryTier> {
        let tier = self.tier_of(id)?;
        let session_id = match tier {
            MemoryTier::Hot => self.hot.remove(id).map(|b| b.session_id),
            MemoryTier::Warm => self.warm.remove(id).map(|e| e.session_id),
            MemoryTier::Cold => self.cold.remove(id).map(|s| s.session_id),
        };
        match session_id {
            Some(session_id) => self.forget(id, &session_id),
            None => {
                self.index.remove(id);
            }
        }
        Some(tier)
    }

    fn forget(&mut self, id: &str, session_id: &str) {
        self.index.remove(id);
        if let Some(ids) = self.sessions.get_mut(session_id) {
            ids.remove(id);
            if ids.is_empty() {
                self.sessions.remove(session_id);
            }
        }
    }

    fn ids<'a>(&'a self, session_id: Option<&str>) -> Box<dyn Iterator<Item = &'a str> + 'a> {
        match session_id {
            Some(session) => match self.sessions.get(session) {
                Some(ids) => Box::new(ids.iter().map(String::as_str)),
                None => Box::new(std::iter::empty()),
            },
            None => Box::new(self.index.keys().map(String::as_str)),
        }
    }

    fn holds(&self, tier: MemoryTier, id: &str) -> bool {
        match tier {
            MemoryTier::Hot => self.hot.contains(id),
            MemoryTier::Warm => self.warm.contains(id),
            MemoryTier::Cold => self.cold.contains(id),
        }
    }

    fn is_over_capacity(&self, tier: MemoryTier) -> bool {
        match tier {
            MemoryTier::Hot => self.hot.is_over_capacity(),
            MemoryTier::Warm => self.warm.is_over_capacity(),
            MemoryTier::Cold => self.cold.is_over_capacity(),
        }
    }

    fn len_and_capacity(&self, tier: MemoryTier) -> (usize, usize) {
        match tier {
            MemoryTier::Hot => (self.hot.len(), self.hot.capacity()),
            MemoryTier::Warm => (self.warm.len(), self.warm.capacity()),
            MemoryTier::Cold => (self.cold.len(), self.cold.capacity()),
        }
    }
}

fn missing(id: &str, tier: MemoryTier) -> StorageError {
    StorageError::internal(format!("index points {id} at {tier} but the tier does not hold it"))
}

// =============================================================================
// Tests
// =============================================================================
