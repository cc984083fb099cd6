//! A single LRU shard.
//!
//! Entries live in a slab; recency order is a doubly-linked list threaded
//! through slab indices, most-recently-used at the head. A `HashMap` maps
//! each key to its slot so every operation is O(1).

use std::collections::HashMap;

/// Sentinel for "no slot".
const NIL: usize = usize::MAX;

struct Entry {
    key: i32,
    value: Vec<u8>,
    prev: usize,
    next: usize,
}

/// One independently locked LRU partition of the cache.
///
/// The shard itself is not synchronized; [`ShardedCache`](super::ShardedCache)
/// wraps each shard in its own mutex.
pub(crate) struct LruShard {
    capacity: usize,
    map: HashMap<i32, usize>,
    slots: Vec<Entry>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
}

impl LruShard {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            map: HashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
        }
    }

    /// Look up a key; a hit moves the entry to the front and clones the value.
    pub(crate) fn get(&mut self, key: i32) -> Option<Vec<u8>> {
        let slot = *self.map.get(&key)?;
        self.unlink(slot);
        self.push_front(slot);
        Some(self.slots[slot].value.clone())
    }

    /// Insert or overwrite a key, evicting the least-recently-used entry if
    /// the shard is full. Returns `true` when an eviction happened.
    pub(crate) fn put(&mut self, key: i32, value: Vec<u8>) -> bool {
        if let Some(&slot) = self.map.get(&key) {
            self.slots[slot].value = value;
            self.unlink(slot);
            self.push_front(slot);
            return false;
        }

        let mut evicted = false;
        if self.map.len() >= self.capacity {
            self.evict_tail();
            evicted = true;
        }

        let slot = self.alloc(key, value);
        self.map.insert(key, slot);
        self.push_front(slot);
        evicted
    }

    /// Drop an entry if present.
    pub(crate) fn remove(&mut self, key: i32) {
        if let Some(slot) = self.map.remove(&key) {
            self.unlink(slot);
            self.release(slot);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    fn evict_tail(&mut self) {
        let slot = self.tail;
        debug_assert_ne!(slot, NIL);
        self.unlink(slot);
        self.map.remove(&self.slots[slot].key);
        self.release(slot);
    }

    fn alloc(&mut self, key: i32, value: Vec<u8>) -> usize {
        let entry = Entry {
            key,
            value,
            prev: NIL,
            next: NIL,
        };
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = entry;
                slot
            }
            None => {
                self.slots.push(entry);
                self.slots.len() - 1
            }
        }
    }

    fn release(&mut self, slot: usize) {
        self.slots[slot].value = Vec::new();
        self.free.push(slot);
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.slots[slot].prev, self.slots[slot].next);
        if prev != NIL {
            self.slots[prev].next = next;
        } else if self.head == slot {
            self.head = next;
        }
        if next != NIL {
            self.slots[next].prev = prev;
        } else if self.tail == slot {
            self.tail = prev;
        }
        self.slots[slot].prev = NIL;
        self.slots[slot].next = NIL;
    }

    fn push_front(&mut self, slot: usize) {
        self.slots[slot].prev = NIL;
        self.slots[slot].next = self.head;
        if self.head != NIL {
            self.slots[self.head].prev = slot;
        }
        self.head = slot;
        if self.tail == NIL {
            self.tail = slot;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get() {
        let mut shard = LruShard::new(4);
        assert!(!shard.put(1, b"one".to_vec()));
        assert_eq!(shard.get(1), Some(b"one".to_vec()));
        assert_eq!(shard.get(2), None);
        assert_eq!(shard.len(), 1);
    }

    #[test]
    fn test_overwrite_keeps_len() {
        let mut shard = LruShard::new(4);
        shard.put(1, b"a".to_vec());
        shard.put(1, b"b".to_vec());
        assert_eq!(shard.len(), 1);
        assert_eq!(shard.get(1), Some(b"b".to_vec()));
    }

    #[test]
    fn test_eviction_order() {
        let mut shard = LruShard::new(3);
        shard.put(1, b"v1".to_vec());
        shard.put(2, b"v2".to_vec());
        shard.put(3, b"v3".to_vec());

        // Touch key 1 so key 2 becomes the LRU victim.
        assert!(shard.get(1).is_some());
        assert!(shard.put(4, b"v4".to_vec()));

        assert_eq!(shard.get(2), None);
        assert!(shard.get(1).is_some());
        assert!(shard.get(3).is_some());
        assert!(shard.get(4).is_some());
        assert_eq!(shard.len(), 3);
    }

    #[test]
    fn test_remove_and_reuse() {
        let mut shard = LruShard::new(2);
        shard.put(1, b"v1".to_vec());
        shard.put(2, b"v2".to_vec());
        shard.remove(1);
        assert_eq!(shard.get(1), None);
        assert_eq!(shard.len(), 1);

        // The freed slot is reusable without evicting key 2.
        assert!(!shard.put(3, b"v3".to_vec()));
        assert!(shard.get(2).is_some());
        assert!(shard.get(3).is_some());
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut shard = LruShard::new(2);
        shard.remove(42);
        assert_eq!(shard.len(), 0);
    }

    #[test]
    fn test_capacity_one() {
        let mut shard = LruShard::new(1);
        shard.put(1, b"v1".to_vec());
        assert!(shard.put(2, b"v2".to_vec()));
        assert_eq!(shard.get(1), None);
        assert_eq!(shard.get(2), Some(b"v2".to_vec()));
    }
}
