//! Arena LRU - Index Plus Intrusive Recency List
//!
//! `TigerStyle`: Nodes live in a `Vec` arena and link by slot index. Freed
//! slots are reused. The list never evicts on its own; callers pop the LRU
//! entry and decide where it goes.

use std::collections::HashMap;

#[derive(Debug)]
struct Node<V> {
    key: String,
    value: Option<V>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Recency-ordered map with a soft capacity.
///
/// Head is the most recently used entry, tail the least.
#[derive(Debug)]
pub struct LruList<V> {
    capacity: usize,
    nodes: Vec<Node<V>>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<V> LruList<V> {
    /// Create an empty list.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "lru capacity must be positive");
        Self {
            capacity,
            nodes: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    /// Entries held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether `len() > capacity()`.
    #[must_use]
    pub fn is_over_capacity(&self) -> bool {
        self.len() > self.capacity
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Value for `key` without changing recency.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&V> {
        let slot = *self.index.get(key)?;
        self.nodes[slot].value.as_ref()
    }

    /// Mutable value for `key` without changing recency.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        let slot = *self.index.get(key)?;
        self.nodes[slot].value.as_mut()
    }

    /// Mark `key` most recently used. Returns false if absent.
    pub fn touch(&mut self, key: &str) -> bool {
        let Some(&slot) = self.index.get(key) else {
            return false;
        };
        if self.head != Some(slot) {
            self.unlink(slot);
            self.push_front(slot);
        }
        true
    }

    /// Insert as most recently used. Returns the replaced value, if any.
    ///
    /// May leave the list over capacity.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        if let Some(&slot) = self.index.get(&key) {
            let old = self.nodes[slot].value.replace(value);
            self.touch(&key);
            return old;
        }

        let node = Node {
            key: key.clone(),
            value: Some(value),
            prev: None,
            next: None,
        };
        let slot = if let Some(slot) = self.free.pop() {
            self.nodes[slot] = node;
            slot
        } else {
            self.nodes.push(node);
            self.nodes.len() - 1
        };
        self.index.insert(key, slot);
        self.push_front(slot);
        None
    }

    /// Remove `key`.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let slot = self.index.remove(key)?;
        self.unlink(slot);
        self.release(slot)
    }

    /// Remove and return the least recently used entry.
    pub fn pop_lru(&mut self) -> Option<(String, V)> {
        let slot = self.tail?;
        let key = std::mem::take(&mut self.nodes[slot].key);
        self.index.remove(&key);
        self.unlink(slot);
        self.release(slot).map(|value| (key, value))
    }

    /// Key of the least recently used entry.
    #[must_use]
    pub fn peek_lru(&self) -> Option<&str> {
        self.tail.map(|slot| self.nodes[slot].key.as_str())
    }

    /// Entries from most to least recently used.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let slot = cursor?;
            let node = &self.nodes[slot];
            cursor = node.next;
            node.value.as_ref().map(|v| (node.key.as_str(), v))
        })
    }

    /// All values mutably, in no particular order.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.nodes.iter_mut().filter_map(|node| node.value.as_mut())
    }

    fn release(&mut self, slot: usize) -> Option<V> {
        let value = self.nodes[slot].value.take();
        self.nodes[slot].key.clear();
        self.free.push(slot);
        value
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        self.nodes[slot].prev = None;
        self.nodes[slot].next = None;
    }

    fn push_front(&mut self, slot: usize) {
        let old_head = self.head;
        self.nodes[slot].prev = None;
        self.nodes[slot].next = old_head;
        if let Some(h) = old_head {
            self.nodes[h].prev = Some(slot);
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
    }
}
