//! Correction History - Bounded Ring of Applied Corrections

use std::collections::VecDeque;

use super::CorrectionEntry;

/// Most recent corrections, oldest dropped first.
#[derive(Debug, Clone)]
pub struct CorrectionHistory {
    entries: VecDeque<CorrectionEntry>,
    capacity: usize,
}

impl CorrectionHistory {
    /// Create a history holding at most `capacity` entries.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "history capacity must be positive");
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, dropping the oldest entry when full.
    pub fn push(&mut self, entry: CorrectionEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        debug_assert!(self.entries.len() <= self.capacity);
    }

    /// The last `limit` entries, oldest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<CorrectionEntry> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Number of entries held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum entries held.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &CorrectionEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correction::CorrectionKind;
    use chrono::Utc;

    fn entry(i: usize) -> CorrectionEntry {
        CorrectionEntry {
            kind: CorrectionKind::Removal,
            block_ids: vec![format!("b{i}")],
            session_id: "s1".into(),
            reason: "low".into(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_ring_drops_oldest() {
        let mut history = CorrectionHistory::new(100);
        for i in 0..105 {
            history.push(entry(i));
        }

        assert_eq!(history.len(), 100);
        assert_eq!(history.iter().next().unwrap().original_id(), "b5");
        assert_eq!(history.iter().last().unwrap().original_id(), "b104");
    }

    #[test]
    fn test_recent_returns_tail_in_order() {
        let mut history = CorrectionHistory::new(10);
        for i in 0..4 {
            history.push(entry(i));
        }

        let recent: Vec<String> = history
            .recent(2)
            .into_iter()
            .map(|e| e.original_id().to_string())
            .collect();
        assert_eq!(recent, vec!["b2", "b3"]);
        assert_eq!(history.recent(50).len(), 4);
    }

    #[test]
    #[should_panic(expected = "history capacity must be positive")]
    fn test_zero_capacity_panics() {
        let _ = CorrectionHistory::new(0);
    }
}
