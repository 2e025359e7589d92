//! Dense, append-only storage addressed by typed IDs.
//!
//! Signals and clock domains live in [`Arena`]s owned by a
//! [`Fragment`](crate::fragment::Fragment). IDs are allocation indices, so they
//! stay valid for the arena's lifetime and can be used to index parallel
//! tables such as the simulator's value table.

use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::ops::Index;

/// Conversion between a typed ID and its raw allocation index.
pub trait ArenaId: Copy {
    /// Wraps a raw index.
    fn from_raw(index: u32) -> Self;

    /// Unwraps the raw index.
    fn as_raw(self) -> u32;

    /// The raw index as a `usize`, for indexing parallel vectors.
    fn index(self) -> usize {
        self.as_raw() as usize
    }
}

/// Append-only vector keyed by `I`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arena<I: ArenaId, T> {
    items: Vec<T>,
    #[serde(skip)]
    _marker: PhantomData<I>,
}

impl<I: ArenaId, T> Default for Arena<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: ArenaId, T> Arena<I, T> {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Stores `item` and returns its ID.
    pub fn alloc(&mut self, item: T) -> I {
        let id = I::from_raw(self.items.len() as u32);
        self.items.push(item);
        id
    }

    /// Looks up an item, returning `None` for IDs this arena never issued.
    pub fn try_get(&self, id: I) -> Option<&T> {
        self.items.get(id.index())
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing has been allocated.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// `(ID, &T)` pairs in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| (I::from_raw(i as u32), item))
    }

    /// Items in allocation order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<I: ArenaId, T> Index<I> for Arena<I, T> {
    type Output = T;

    /// # Panics
    ///
    /// Panics if the ID was not issued by this arena.
    fn index(&self, id: I) -> &T {
        &self.items[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SignalId;

    #[test]
    fn alloc_returns_sequential_ids() {
        let mut arena: Arena<SignalId, &str> = Arena::new();
        let a = arena.alloc("a");
        let b = arena.alloc("b");
        assert_eq!(a.as_raw(), 0);
        assert_eq!(b.as_raw(), 1);
        assert_eq!(arena[b], "b");
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn try_get_rejects_foreign_ids() {
        let mut arena: Arena<SignalId, u32> = Arena::new();
        arena.alloc(7);
        assert_eq!(arena.try_get(SignalId::from_raw(0)), Some(&7));
        assert_eq!(arena.try_get(SignalId::from_raw(3)), None);
    }

    #[test]
    fn iteration_follows_allocation_order() {
        let mut arena: Arena<SignalId, u32> = Arena::default();
        assert!(arena.is_empty());
        arena.alloc(10);
        arena.alloc(20);
        let pairs: Vec<(u32, u32)> = arena.iter().map(|(id, v)| (id.as_raw(), *v)).collect();
        assert_eq!(pairs, vec![(0, 10), (1, 20)]);
        assert_eq!(arena.values().sum::<u32>(), 30);
    }

    #[test]
    fn serde_roundtrip() {
        let mut arena: Arena<SignalId, String> = Arena::new();
        arena.alloc("clk".to_string());
        let json = serde_json::to_string(&arena).unwrap();
        let back: Arena<SignalId, String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back[SignalId::from_raw(0)], "clk");
    }
}
