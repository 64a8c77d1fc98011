//! Capacity-bounded LRU map.
//!
//! Entries live in a `Vec` arena and are linked into a recency list by
//! index. Slots of removed entries go onto a free list and are reused by
//! later insertions, so the arena never grows past the capacity.

use std::collections::HashMap;

#[derive(Debug)]
struct Node<V> {
    key: String,
    value: V,
    /// Neighbour towards the most recent end.
    newer: Option<usize>,
    /// Neighbour towards the least recent end.
    older: Option<usize>,
}

/// A string-keyed map holding at most `capacity` entries.
///
/// Every lookup through [`LruCache::get_mut`] or
/// [`LruCache::get_or_insert_with`] marks the key most recently used.
/// Inserting into a full cache evicts the least recently used key.
#[derive(Debug)]
pub struct LruCache<V> {
    nodes: Vec<Option<Node<V>>>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    newest: Option<usize>,
    oldest: Option<usize>,
    capacity: usize,
}

impl<V> LruCache<V> {
    /// Creates an empty cache. A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            nodes: Vec::with_capacity(capacity),
            free: Vec::new(),
            index: HashMap::with_capacity(capacity),
            newest: None,
            oldest: None,
            capacity,
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` if `key` is cached, without touching its recency.
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Returns the value for `key` without touching its recency.
    pub fn peek(&self, key: &str) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.node(idx).map(|node| &node.value)
    }

    /// Returns the value for `key` and marks it most recently used.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        let idx = *self.index.get(key)?;
        self.touch(idx);
        self.node_mut(idx).map(|node| &mut node.value)
    }

    /// Returns the value for `key`, creating it with `make` if absent.
    ///
    /// The key becomes the most recently used entry. Creating an entry in a
    /// full cache first evicts the least recently used key.
    pub fn get_or_insert_with(&mut self, key: &str, make: impl FnOnce() -> V) -> &mut V {
        let idx = match self.index.get(key) {
            Some(&idx) => {
                self.touch(idx);
                idx
            }
            None => {
                if self.index.len() >= self.capacity {
                    self.evict_oldest();
                }
                self.insert_new(key, make())
            }
        };

        match self.nodes[idx].as_mut() {
            Some(node) => &mut node.value,
            None => unreachable!("indexed slot {idx} is vacant"),
        }
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let idx = self.index.remove(key)?;
        self.unlink(idx);
        let node = self.nodes[idx].take()?;
        self.free.push(idx);
        Some(node.value)
    }

    /// Keys ordered from most to least recently used.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.newest;
        while let Some(idx) = cursor {
            let Some(node) = self.node(idx) else { break };
            keys.push(node.key.as_str());
            cursor = node.older;
        }
        keys
    }

    fn node(&self, idx: usize) -> Option<&Node<V>> {
        self.nodes.get(idx).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, idx: usize) -> Option<&mut Node<V>> {
        self.nodes.get_mut(idx).and_then(Option::as_mut)
    }

    fn insert_new(&mut self, key: &str, value: V) -> usize {
        let node = Node {
            key: key.to_string(),
            value,
            newer: None,
            older: None,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = Some(node);
                idx
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        self.index.insert(key.to_string(), idx);
        self.push_front(idx);
        idx
    }

    fn evict_oldest(&mut self) {
        let Some(idx) = self.oldest else { return };
        self.unlink(idx);
        if let Some(node) = self.nodes[idx].take() {
            self.index.remove(&node.key);
        }
        self.free.push(idx);
    }

    fn touch(&mut self, idx: usize) {
        if self.newest == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }

    /// Detaches `idx` from the recency list, patching its neighbours.
    fn unlink(&mut self, idx: usize) {
        let Some((newer, older)) = self.node(idx).map(|n| (n.newer, n.older)) else {
            return;
        };

        match newer {
            Some(n) => {
                if let Some(node) = self.node_mut(n) {
                    node.older = older;
                }
            }
            None => self.newest = older,
        }
        match older {
            Some(o) => {
                if let Some(node) = self.node_mut(o) {
                    node.newer = newer;
                }
            }
            None => self.oldest = newer,
        }

        if let Some(node) = self.node_mut(idx) {
            node.newer = None;
            node.older = None;
        }
    }

    fn push_front(&mut self, idx: usize) {
        let previous = self.newest;
        if let Some(node) = self.node_mut(idx) {
            node.newer = None;
            node.older = previous;
        }
        if let Some(p) = previous
            && let Some(node) = self.node_mut(p)
        {
            node.newer = Some(idx);
        }
        self.newest = Some(idx);
        if self.oldest.is_none() {
            self.oldest = Some(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(cache: &mut LruCache<u32>, key: &str) {
        cache.get_or_insert_with(key, || 0);
    }

    #[test]
    fn test_evicts_least_recent() {
        let mut cache = LruCache::new(2);
        insert(&mut cache, "a");
        insert(&mut cache, "b");
        insert(&mut cache, "c");

        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_access_refreshes_recency() {
        let mut cache = LruCache::new(2);
        insert(&mut cache, "a");
        insert(&mut cache, "b");
        assert!(cache.get_mut("a").is_some());
        insert(&mut cache, "c");

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert_eq!(cache.keys(), vec!["c", "a"]);
    }

    #[test]
    fn test_existing_key_keeps_value() {
        let mut cache = LruCache::new(4);
        *cache.get_or_insert_with("x", || 1) += 10;
        assert_eq!(*cache.get_or_insert_with("x", || 100), 11);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_peek_does_not_touch() {
        let mut cache = LruCache::new(2);
        insert(&mut cache, "a");
        insert(&mut cache, "b");
        assert_eq!(cache.peek("a"), Some(&0));
        insert(&mut cache, "c");
        assert!(!cache.contains("a"));
    }

    #[test]
    fn test_slots_are_reused() {
        let mut cache = LruCache::new(3);
        for key in ["a", "b", "c", "d", "e", "f", "g"] {
            insert(&mut cache, key);
        }
        assert_eq!(cache.nodes.len(), 3);
        assert_eq!(cache.keys(), vec!["g", "f", "e"]);

        assert_eq!(cache.remove("f"), Some(0));
        assert_eq!(cache.keys(), vec!["g", "e"]);
        insert(&mut cache, "h");
        assert_eq!(cache.nodes.len(), 3);
        assert_eq!(cache.keys(), vec!["h", "g", "e"]);
    }

    #[test]
    fn test_single_entry_list() {
        let mut cache = LruCache::new(1);
        insert(&mut cache, "a");
        assert!(cache.get_mut("a").is_some());
        insert(&mut cache, "b");
        assert_eq!(cache.keys(), vec!["b"]);
        assert_eq!(cache.remove("b"), Some(0));
        assert!(cache.is_empty());
        assert!(cache.keys().is_empty());
    }
}
