//! LRU (Least Recently Used) map backing the query cache
//!
//! Nodes live in a slab and are linked by index, so promotion and eviction
//! are O(1) without unsafe code.

use std::collections::HashMap;
use std::hash::Hash;
use ahash::RandomState;

struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Capacity-bounded map evicting the least recently used entry
pub struct Lru<K, V> {
    index: HashMap<K, usize, RandomState>,
    slots: Vec<Option<Node<K, V>>>,
    vacant: Vec<usize>,
    /// Most recently used
    head: Option<usize>,
    /// Least recently used
    tail: Option<usize>,
    capacity: usize,
}

impl<K, V> Lru<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create an empty map holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than 0");

        Self {
            index: HashMap::with_capacity_and_hasher(capacity, RandomState::new()),
            slots: Vec::with_capacity(capacity),
            vacant: Vec::new(),
            head: None,
            tail: None,
            capacity,
        }
    }

    /// Get a value and mark it most recently used
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.promote(idx);
        self.slots[idx].as_ref().map(|node| &node.value)
    }

    /// Get a mutable value and mark it most recently used
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let idx = *self.index.get(key)?;
        self.promote(idx);
        self.slots[idx].as_mut().map(|node| &mut node.value)
    }

    /// Get a value without touching recency
    pub fn peek(&self, key: &K) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.slots[idx].as_ref().map(|node| &node.value)
    }

    /// Get a mutable value without touching recency
    pub fn peek_mut(&mut self, key: &K) -> Option<&mut V> {
        let idx = *self.index.get(key)?;
        self.slots[idx].as_mut().map(|node| &mut node.value)
    }

    /// Insert or replace a value, marking it most recently used
    ///
    /// # Returns
    /// * `Option<(K, V)>` - The entry evicted to make room, if any
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&idx) = self.index.get(&key) {
            if let Some(node) = self.slots[idx].as_mut() {
                node.value = value;
            }
            self.promote(idx);
            return None;
        }

        let evicted = if self.index.len() >= self.capacity {
            self.pop_lru()
        } else {
            None
        };

        let idx = match self.vacant.pop() {
            Some(idx) => idx,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        self.slots[idx] = Some(Node {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        });
        self.push_front(idx);
        self.index.insert(key, idx);

        evicted
    }

    /// Remove an entry
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.index.remove(key)?;
        self.take(idx).map(|node| node.value)
    }

    /// Remove and return the least recently used entry
    pub fn pop_lru(&mut self) -> Option<(K, V)> {
        let idx = self.tail?;
        let node = self.take(idx)?;
        self.index.remove(&node.key);
        Some((node.key, node.value))
    }

    /// Keep only entries for which `keep` returns true
    ///
    /// # Returns
    /// * `usize` - Number of entries removed
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        let doomed: Vec<K> = self
            .slots
            .iter_mut()
            .flatten()
            .filter_map(|node| (!keep(&node.key, &mut node.value)).then(|| node.key.clone()))
            .collect();

        for key in &doomed {
            self.remove(key);
        }
        doomed.len()
    }

    /// Visit every entry mutably without touching recency
    pub fn for_each_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(&K, &mut V),
    {
        for node in self.slots.iter_mut().flatten() {
            f(&node.key, &mut node.value);
        }
    }

    /// Keys from most to least recently used
    pub fn keys(&self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.index.len());
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            match &self.slots[idx] {
                Some(node) => {
                    keys.push(node.key.clone());
                    cursor = node.next;
                }
                None => break,
            }
        }
        keys
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if the map is empty
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
        self.vacant.clear();
        self.head = None;
        self.tail = None;
    }

    fn take(&mut self, idx: usize) -> Option<Node<K, V>> {
        self.unlink(idx);
        let node = self.slots[idx].take();
        if node.is_some() {
            self.vacant.push(idx);
        }
        node
    }

    fn promote(&mut self, idx: usize) {
        if self.head != Some(idx) {
            self.unlink(idx);
            self.push_front(idx);
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(node) = self.slots[idx].as_mut() {
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            if let Some(head) = self.slots[h].as_mut() {
                head.prev = Some(idx);
            }
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let Some(node) = self.slots[idx].as_mut() else {
            return;
        };
        let (prev, next) = (node.prev.take(), node.next.take());

        match prev {
            Some(p) => {
                if let Some(prev_node) = self.slots[p].as_mut() {
                    prev_node.next = next;
                }
            }
            None if self.head == Some(idx) => self.head = next,
            None => {}
        }

        match next {
            Some(n) => {
                if let Some(next_node) = self.slots[n].as_mut() {
                    next_node.prev = prev;
                }
            }
            None if self.tail == Some(idx) => self.tail = prev,
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_basic() {
        let mut lru = Lru::new(2);

        assert!(lru.insert(1, "a").is_none());
        assert!(lru.insert(2, "b").is_none());

        assert_eq!(lru.get(&1), Some(&"a"));
        assert_eq!(lru.get(&2), Some(&"b"));
        assert_eq!(lru.len(), 2);
    }

    #[test]
    fn test_lru_eviction_returns_entry() {
        let mut lru = Lru::new(2);

        lru.insert(1, "a");
        lru.insert(2, "b");
        let evicted = lru.insert(3, "c");

        assert_eq!(evicted, Some((1, "a")));
        assert_eq!(lru.get(&1), None);
        assert_eq!(lru.keys(), vec![3, 2]);
    }

    #[test]
    fn test_get_promotes_peek_does_not() {
        let mut lru = Lru::new(2);

        lru.insert(1, "a");
        lru.insert(2, "b");
        lru.peek(&1);
        assert_eq!(lru.keys(), vec![2, 1]);

        lru.get(&1);
        assert_eq!(lru.keys(), vec![1, 2]);

        lru.insert(3, "c"); // evicts 2
        assert_eq!(lru.peek(&2), None);
        assert_eq!(lru.peek(&1), Some(&"a"));
    }

    #[test]
    fn test_overwrite_keeps_len() {
        let mut lru = Lru::new(2);

        lru.insert(1, "a");
        assert!(lru.insert(1, "b").is_none());

        assert_eq!(lru.get(&1), Some(&"b"));
        assert_eq!(lru.len(), 1);
    }

    #[test]
    fn test_remove_and_reuse_slot() {
        let mut lru = Lru::new(3);

        lru.insert(1, "a");
        lru.insert(2, "b");
        lru.insert(3, "c");

        assert_eq!(lru.remove(&2), Some("b"));
        assert_eq!(lru.len(), 2);
        assert_eq!(lru.keys(), vec![3, 1]);

        lru.insert(4, "d");
        assert_eq!(lru.keys(), vec![4, 3, 1]);
        assert_eq!(lru.slots.len(), 3);
    }

    #[test]
    fn test_retain() {
        let mut lru = Lru::new(4);
        for i in 0..4 {
            lru.insert(i, i * 10);
        }

        let removed = lru.retain(|k, _| k % 2 == 0);
        assert_eq!(removed, 2);
        assert_eq!(lru.keys(), vec![2, 0]);
    }

    #[test]
    fn test_pop_lru_until_empty() {
        let mut lru = Lru::new(2);
        lru.insert(1, "a");
        lru.insert(2, "b");

        assert_eq!(lru.pop_lru(), Some((1, "a")));
        assert_eq!(lru.pop_lru(), Some((2, "b")));
        assert_eq!(lru.pop_lru(), None);
        assert!(lru.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut lru = Lru::new(3);
        lru.insert(1, "a");
        lru.insert(2, "b");
        lru.clear();

        assert!(lru.is_empty());
        assert!(lru.keys().is_empty());
    }
}
