//! Indexed slot storage with stable ids and holes.
//!
//! Removing an entry leaves an empty slot behind instead of compacting, so an
//! id handed out earlier never starts pointing at a different value.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable handle of a node stored in a [`Slots`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Arena mapping [`NodeId`] to an optional value.
#[derive(Debug)]
pub struct Slots<T> {
    slots: Vec<Option<T>>,
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> Slots<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` in a fresh slot. Slots are never reused.
    pub fn insert(&mut self, value: T) -> NodeId {
        self.slots.push(Some(value));
        NodeId(self.slots.len() - 1)
    }

    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Take the value out, leaving a hole.
    pub fn remove(&mut self, id: NodeId) -> Option<T> {
        self.slots.get_mut(id.0).and_then(Option::take)
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate occupied slots in id order, skipping holes.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|value| (NodeId(index), value)))
    }
}

/// Occupied entries of a follower list, in list order.
pub fn occupied(list: &[Option<NodeId>]) -> impl Iterator<Item = NodeId> + '_ {
    list.iter().filter_map(|slot| *slot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_slot_keeps_later_ids_stable() {
        let mut slots = Slots::new();
        let a = slots.insert("a");
        let b = slots.insert("b");
        let c = slots.insert("c");

        assert_eq!(slots.remove(b), Some("b"));
        assert_eq!(slots.get(a), Some(&"a"));
        assert_eq!(slots.get(b), None);
        assert_eq!(slots.get(c), Some(&"c"));
        assert_eq!(slots.len(), 2);

        let d = slots.insert("d");
        assert_ne!(d, b);
        let ids: Vec<NodeId> = slots.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![a, c, d]);
    }

    #[test]
    fn occupied_skips_holes() {
        let list = vec![Some(NodeId(3)), None, Some(NodeId(1))];
        let ids: Vec<NodeId> = occupied(&list).collect();
        assert_eq!(ids, vec![NodeId(3), NodeId(1)]);
    }
}
