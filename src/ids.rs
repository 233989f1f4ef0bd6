//! Arena indices and small shared numeric helpers.
//!
//! Nodes and edges are never owned outside the `Graph`; everything else —
//! frontier sets, edge endpoint lists, the payload-hash index — refers to
//! them by these indices.

use std::fmt;

/// Index of a [`crate::node::Node`] within a [`crate::graph::Graph`]'s node
/// arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Index of an [`crate::edge::Edge`] within a [`crate::graph::Graph`]'s edge
/// arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct EdgeId(pub usize);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EdgeId({})", self.0)
    }
}

/// A bounded history of recent scalar deltas, used to feed C1's adaptive
/// statistics functions. Oldest entries are evicted once the history
/// reaches its capacity so memory stays flat regardless of how long a node
/// or edge has been alive; the capacity itself is a fixed memory bound
/// (like a `Vec::with_capacity` hint), not a decision threshold used in any
/// comparison.
const HISTORY_CAPACITY: usize = 32;

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct History {
    recent: std::collections::VecDeque<f32>,
}

impl History {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: f32) {
        if self.recent.len() >= HISTORY_CAPACITY {
            self.recent.pop_front();
        }
        self.recent.push_back(delta);
    }

    #[must_use]
    pub fn as_slice(&self) -> Vec<f32> {
        self.recent.iter().copied().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.recent.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_evicts_oldest_beyond_capacity() {
        let mut h = History::new();
        for i in 0..HISTORY_CAPACITY + 5 {
            h.push(i as f32);
        }
        assert_eq!(h.len(), HISTORY_CAPACITY);
        assert_eq!(h.as_slice()[0], 5.0);
    }

    #[test]
    fn node_id_display() {
        assert_eq!(format!("{}", NodeId(3)), "NodeId(3)");
    }
}
