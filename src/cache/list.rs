//! Recency List
//!
//! Doubly linked list of cache entries stored in a slab and linked by
//! `SlotId`. Head is the most recently used entry, tail the least.
//!
//! ```text
//!   slab (Vec<Option<Entry<K, V>>>)
//!   ┌────────┬────────────────────────────────────────┐
//!   │ slot 0 │ { key: a, prev: None,    next: 2 }     │
//!   │ slot 1 │ (free)                                 │
//!   │ slot 2 │ { key: b, prev: 0,       next: None }  │
//!   └────────┴────────────────────────────────────────┘
//!
//!   head ─► [0] ◄──► [2] ◄── tail
//! ```
//!
//! All operations are O(1) except `clear` and iteration. Freed slots are
//! reused, so a `SlotId` is only meaningful while its entry is linked.

use super::entry::{Entry, SlotId};

/// Slab-backed recency list
#[derive(Debug)]
pub struct RecencyList<K, V> {
    slots: Vec<Option<Entry<K, V>>>,
    free: Vec<usize>,
    head: Option<SlotId>,
    tail: Option<SlotId>,
    len: usize,
}

impl<K, V> RecencyList<K, V> {
    /// Create an empty list
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty list with room for `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Number of linked entries
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the list is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Most recently used slot
    pub fn front(&self) -> Option<SlotId> {
        self.head
    }

    /// Least recently used slot
    pub fn back(&self) -> Option<SlotId> {
        self.tail
    }

    /// Borrow an entry
    pub fn get(&self, id: SlotId) -> Option<&Entry<K, V>> {
        self.slots.get(id.0).and_then(|slot| slot.as_ref())
    }

    /// Mutably borrow an entry
    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut Entry<K, V>> {
        self.slots.get_mut(id.0).and_then(|slot| slot.as_mut())
    }

    /// Insert an entry at the head
    pub fn push_front(&mut self, mut entry: Entry<K, V>) -> SlotId {
        entry.prev = None;
        entry.next = self.head;

        let id = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(entry);
                SlotId(idx)
            }
            None => {
                self.slots.push(Some(entry));
                SlotId(self.slots.len() - 1)
            }
        };

        match self.head {
            Some(old_head) => {
                if let Some(node) = self.get_mut(old_head) {
                    node.prev = Some(id);
                }
            }
            None => self.tail = Some(id),
        }
        self.head = Some(id);
        self.len += 1;
        id
    }

    /// Unlink and return an entry, freeing its slot
    pub fn remove(&mut self, id: SlotId) -> Option<Entry<K, V>> {
        if self.get(id).is_none() {
            return None;
        }
        self.unlink(id);
        let entry = self.slots[id.0].take()?;
        self.free.push(id.0);
        self.len -= 1;
        Some(entry)
    }

    /// Remove and return the least recently used entry
    pub fn pop_back(&mut self) -> Option<Entry<K, V>> {
        let tail = self.tail?;
        self.remove(tail)
    }

    /// Move an entry to the head
    pub fn move_to_front(&mut self, id: SlotId) {
        if self.head == Some(id) || self.get(id).is_none() {
            return;
        }
        self.unlink(id);

        let old_head = self.head;
        if let Some(node) = self.get_mut(id) {
            node.prev = None;
            node.next = old_head;
        }
        if let Some(old) = old_head {
            if let Some(node) = self.get_mut(old) {
                node.prev = Some(id);
            }
        }
        self.head = Some(id);
        if self.tail.is_none() {
            self.tail = Some(id);
        }
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    /// Iterate entries from most to least recently used
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            list: self,
            current: self.head,
        }
    }

    /// Detach `id` from its neighbours without freeing the slot
    fn unlink(&mut self, id: SlotId) {
        let (prev, next) = match self.get(id) {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev {
            Some(p) => {
                if let Some(node) = self.get_mut(p) {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(node) = self.get_mut(n) {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(node) = self.get_mut(id) {
            node.prev = None;
            node.next = None;
        }
    }

    /// Panics if the links are inconsistent
    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        let mut seen = std::collections::HashSet::new();
        let mut prev: Option<SlotId> = None;
        let mut current = self.head;

        while let Some(id) = current {
            assert!(seen.insert(id), "slot {:?} visited twice", id);
            let node = self.get(id).expect("linked slot must be occupied");
            assert_eq!(node.prev, prev, "broken prev link at {:?}", id);
            prev = Some(id);
            current = node.next;
        }

        assert_eq!(self.tail, prev, "tail does not match last node");
        assert_eq!(seen.len(), self.len, "walk length differs from len");
        assert_eq!(
            self.slots.iter().filter(|slot| slot.is_some()).count(),
            self.len
        );
    }
}

impl<K, V> Default for RecencyList<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Front-to-back iterator over entries
pub struct Iter<'a, K, V> {
    list: &'a RecencyList<K, V>,
    current: Option<SlotId>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (SlotId, &'a Entry<K, V>);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current?;
        let node = self.list.get(id)?;
        self.current = node.next;
        Some((id, node))
    }
}

// =============================================================================
// Tests
// =============================================================================
