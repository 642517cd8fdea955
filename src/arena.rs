//! Arena allocation for tree nodes.
//!
//! Provides `NodeId` (a dense, total-orderable identifier) and `NodeArena`
//! (contiguous storage with free-list reuse). The arena stores node data of a
//! generic type `T`.
//!
//! Node replacement never mutates identifiers: a rewrite allocates a fresh
//! slot and repoints the parent's child slot, leaving the old node behind as
//! garbage. `retain_live` reclaims garbage after a run, given the set of
//! identifiers still reachable from the root.
//!
//! # Determinism
//! - `NodeId` ordering is by its inner `u32`.
//! - Iteration order over slots is by index (0..capacity).
//! - Free-list reuse may affect allocation order across runs, but NodeId
//!   generation is stable if the same sequence of allocations/deallocations
//!   occurs.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Dense node identifier for arena-allocated trees.
///
/// `NodeId(u32)` is `Copy`, `Eq`, `Ord`, `Hash`. The inner value is an
/// index into the arena's slot array.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    /// Creates a new `NodeId` from a raw `u32`.
    ///
    /// # Safety
    /// The caller must ensure the index is within bounds of the arena that
    /// will hold this node.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw `u32` index.
    #[inline]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Slot in the node arena.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NodeSlot<T> {
    data: Option<T>,
    next_free: Option<u32>, // index of next free slot, if any
}

/// Contiguous storage for node data with free-list reuse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeArena<T> {
    slots: Vec<NodeSlot<T>>,
    free_list_head: Option<u32>,
    /// Number of live nodes (slots with `data.is_some()`).
    live_count: usize,
}

impl<T> NodeArena<T> {
    /// Creates a new empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list_head: None,
            live_count: 0,
        }
    }

    /// Allocates a new slot and returns its `NodeId`.
    ///
    /// If a free slot is available, reuses it; otherwise pushes a new slot.
    /// The slot is initialized with `data`.
    ///
    /// # Determinism
    /// Free-list reuse order is deterministic: the first free slot in the list
    /// (which is the most recently freed) is used.
    pub fn allocate(&mut self, data: T) -> NodeId {
        if let Some(idx) = self.free_list_head {
            // Reuse free slot
            let slot = &mut self.slots[idx as usize];
            debug_assert!(slot.data.is_none(), "free slot should have no data");
            self.free_list_head = slot.next_free;
            slot.data = Some(data);
            slot.next_free = None;
            self.live_count += 1;
            NodeId(idx)
        } else {
            // Allocate new slot at the end
            let idx = self.slots.len() as u32;
            self.slots.push(NodeSlot {
                data: Some(data),
                next_free: None,
            });
            self.live_count += 1;
            NodeId(idx)
        }
    }

    /// Deallocates the slot identified by `id`.
    ///
    /// Returns `true` if the slot existed and was deallocated.
    /// The slot is added to the free list for future reuse.
    pub fn deallocate(&mut self, id: NodeId) -> bool {
        let idx = id.as_u32() as usize;
        if idx >= self.slots.len() {
            return false;
        }
        let slot = &mut self.slots[idx];
        if slot.data.is_none() {
            return false; // already free
        }
        slot.data = None;
        slot.next_free = self.free_list_head;
        self.free_list_head = Some(idx as u32);
        self.live_count -= 1;
        true
    }

    /// Returns a reference to the data stored at `id`, if present.
    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.slots
            .get(id.as_u32() as usize)
            .and_then(|slot| slot.data.as_ref())
    }

    /// Returns a mutable reference to the data stored at `id`, if present.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.slots
            .get_mut(id.as_u32() as usize)
            .and_then(|slot| slot.data.as_mut())
    }

    /// Returns `true` if `id` refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Returns the number of live nodes (slots with data).
    pub fn live_count(&self) -> usize {
        self.live_count
    }

    /// Returns the total capacity (number of slots, including free ones).
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Deallocates every live node whose id is not in `live`.
    ///
    /// This is the sweep half of compaction: the caller marks reachable nodes
    /// by walking from the root, then hands the reachable set here. Returns
    /// the number of reclaimed nodes.
    ///
    /// # Determinism
    /// Slots are swept in ascending index order, so the resulting free list
    /// is the same for the same arena contents and live set.
    pub fn retain_live(&mut self, live: &HashSet<NodeId>) -> usize {
        let mut reclaimed = 0;
        for idx in 0..self.slots.len() {
            let id = NodeId(idx as u32);
            if self.slots[idx].data.is_some() && !live.contains(&id) {
                self.deallocate(id);
                reclaimed += 1;
            }
        }
        reclaimed
    }

    /// Iterates over all live nodes in deterministic order (by index).
    ///
    /// Yields `(NodeId, &T)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.data.as_ref().map(|data| (NodeId(idx as u32), data)))
    }

    /// Iterates over all live nodes mutably in deterministic order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (NodeId, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(idx, slot)| slot.data.as_mut().map(|data| (NodeId(idx as u32), data)))
    }
}

impl<T> Default for NodeArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_basic() {
        let mut arena: NodeArena<&'static str> = NodeArena::new();
        assert_eq!(arena.live_count(), 0);
        assert_eq!(arena.capacity(), 0);

        let id1 = arena.allocate("hello");
        assert_eq!(id1.as_u32(), 0);
        assert_eq!(arena.live_count(), 1);
        assert_eq!(arena.get(id1), Some(&"hello"));

        let id2 = arena.allocate("world");
        assert_eq!(id2.as_u32(), 1);
        assert_eq!(arena.live_count(), 2);

        arena.deallocate(id1);
        assert_eq!(arena.live_count(), 1);
        assert_eq!(arena.get(id1), None);
        assert!(!arena.contains(id1));

        let id3 = arena.allocate("reused");
        assert_eq!(id3.as_u32(), 0); // reused freed slot
        assert_eq!(arena.live_count(), 2);
        assert_eq!(arena.get(id3), Some(&"reused"));
    }

    #[test]
    fn deterministic_iteration() {
        let mut arena: NodeArena<i32> = NodeArena::new();
        let ids: Vec<_> = (0..5).map(|i| arena.allocate(i)).collect();
        // Deallocate some to create free list
        arena.deallocate(ids[1]);
        arena.deallocate(ids[3]);
        // Reallocate, which will reuse free slots in LIFO order
        let _id_new1 = arena.allocate(100);
        let _id_new2 = arena.allocate(200);
        // Iteration order should be by index regardless of allocation order
        let collected: Vec<_> = arena.iter().map(|(id, &val)| (id.as_u32(), val)).collect();
        let expected = vec![(0, 0), (1, 200), (2, 2), (3, 100), (4, 4)];
        assert_eq!(collected, expected);
    }

    #[test]
    fn retain_live_sweeps_garbage() {
        let mut arena: NodeArena<i32> = NodeArena::new();
        let ids: Vec<_> = (0..6).map(|i| arena.allocate(i)).collect();
        let live: HashSet<NodeId> = [ids[0], ids[2], ids[5]].into_iter().collect();
        let reclaimed = arena.retain_live(&live);
        assert_eq!(reclaimed, 3);
        assert_eq!(arena.live_count(), 3);
        assert!(arena.contains(ids[0]));
        assert!(!arena.contains(ids[1]));
        assert!(arena.contains(ids[2]));
        assert!(!arena.contains(ids[3]));
        assert!(!arena.contains(ids[4]));
        assert!(arena.contains(ids[5]));
    }
}
