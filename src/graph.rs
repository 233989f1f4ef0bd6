//! # Graph container (C3)
//!
//! Owns every node and edge. Nodes and edges are addressed by their index
//! in [`Graph::nodes`] / [`Graph::edges`]; both arenas store `Option<T>` so
//! that `remove_node_cascade` can tombstone a slot without invalidating
//! every other index that still refers to it (NodeId/EdgeId are positions,
//! not generations — the spec's node/edge lifecycle never deletes nodes in
//! normal operation, so tombstoning only matters for the cascade-remove API
//! itself).
//!
//! The payload-hash index maps a payload fingerprint to the set of nodes
//! whose payload hashed to that bucket; it is a superset of true matches
//! (invariant 4) — callers verify exact equality themselves.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::edge::{Direction, Edge};
use crate::error::MelvinError;
use crate::ids::{EdgeId, NodeId};
use crate::measure;
use crate::node::{self, Node, StableId};
use crate::stats::adaptive_bucket_growth_trigger;

/// Hashes `payload` into a 64-bit fingerprint using the same
/// `DefaultHasher`-over-bytes approach the engine uses elsewhere for
/// content addressing.
fn fingerprint(payload: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    payload.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Clone, Default)]
struct PayloadHashIndex {
    buckets: Vec<Vec<(u64, NodeId)>>,
}

impl PayloadHashIndex {
    fn new() -> Self {
        PayloadHashIndex {
            buckets: vec![Vec::new()],
        }
    }

    fn bucket_index(&self, fp: u64) -> usize {
        (fp as usize) % self.buckets.len().max(1)
    }

    fn insert(&mut self, node_id: NodeId, payload: &[u8]) {
        if self.buckets.is_empty() {
            self.buckets.push(Vec::new());
        }
        let fp = fingerprint(payload);
        let idx = self.bucket_index(fp);
        self.buckets[idx].push((fp, node_id));
        self.maybe_grow();
    }

    fn remove(&mut self, node_id: NodeId, payload: &[u8]) {
        if self.buckets.is_empty() {
            return;
        }
        let fp = fingerprint(payload);
        let idx = self.bucket_index(fp);
        self.buckets[idx].retain(|&(_, nid)| nid != node_id);
    }

    fn lookup(&self, payload: &[u8]) -> Vec<NodeId> {
        if self.buckets.is_empty() {
            return Vec::new();
        }
        let fp = fingerprint(payload);
        let idx = self.bucket_index(fp);
        self.buckets[idx].iter().map(|&(_, nid)| nid).collect()
    }

    fn maybe_grow(&mut self) {
        let lengths: Vec<usize> = self.buckets.iter().map(Vec::len).collect();
        let trigger = adaptive_bucket_growth_trigger(&lengths);
        let max_len = lengths.iter().copied().max().unwrap_or(0);
        if max_len as f32 > trigger {
            self.grow();
        }
    }

    fn grow(&mut self) {
        let new_len = (self.buckets.len() * 2).max(2);
        let mut new_buckets: Vec<Vec<(u64, NodeId)>> = vec![Vec::new(); new_len];
        for bucket in self.buckets.drain(..) {
            for (fp, nid) in bucket {
                let idx = (fp as usize) % new_len;
                new_buckets[idx].push((fp, nid));
            }
        }
        self.buckets = new_buckets;
    }

    fn all_node_payload_pairs(&self) -> impl Iterator<Item = (u64, NodeId)> + '_ {
        self.buckets.iter().flatten().copied()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Option<Node>>,
    edges: Vec<Option<Edge>>,
    payload_index: PayloadHashIndex,
    adaptation_count: u64,
    dirty: bool,
}

impl Graph {
    #[must_use]
    pub fn new() -> Self {
        Graph {
            nodes: Vec::with_capacity(1),
            edges: Vec::with_capacity(1),
            payload_index: PayloadHashIndex::new(),
            adaptation_count: 0,
            dirty: false,
        }
    }

    /// Rebuilds a `Graph` from node/edge arenas read back from a knowledge
    /// file (C10). The payload-hash index is rebuilt from the node arena
    /// rather than persisted (§4.10, §5: "the payload-hash index rebuilds
    /// lazily under the pass lock").
    pub(crate) fn from_arenas(
        nodes: Vec<Option<Node>>,
        edges: Vec<Option<Edge>>,
        adaptation_count: u64,
    ) -> Self {
        let mut payload_index = PayloadHashIndex::new();
        for (i, slot) in nodes.iter().enumerate() {
            if let Some(n) = slot {
                if !n.payload.is_empty() {
                    payload_index.insert(NodeId(i), &n.payload);
                }
            }
        }
        Graph {
            nodes,
            edges,
            payload_index,
            adaptation_count,
            dirty: false,
        }
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.iter().filter(|e| e.is_some()).count()
    }

    #[must_use]
    pub fn adaptation_count(&self) -> u64 {
        self.adaptation_count
    }

    pub fn bump_adaptation_count(&mut self) {
        self.adaptation_count += 1;
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    #[must_use]
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    #[must_use]
    pub fn get_edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_edge_mut(&mut self, id: EdgeId) -> Option<&mut Edge> {
        self.edges.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Iterates every live node with its id, in arena order (the order used
    /// for persistence §6 and for edge from_index/to_index references).
    pub fn iter_nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|n| (NodeId(i), n)))
    }

    /// Iterates every live edge with its id, in arena order.
    pub fn iter_edges(&self) -> impl Iterator<Item = (EdgeId, &Edge)> {
        self.edges
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (EdgeId(i), e)))
    }

    /// Creates a concrete node holding `payload` and indexes it by
    /// fingerprint (invariant 4). Use `create_blank_node` for P=0 nodes,
    /// which are never indexed.
    pub fn create_node(&mut self, payload: Vec<u8>) -> NodeId {
        let id = NodeId(self.nodes.len());
        let stable_id = node::stable_id_for(id.0);
        self.payload_index.insert(id, &payload);
        self.nodes.push(Some(Node::create(stable_id, payload)));
        self.mark_dirty();
        id
    }

    /// Creates a blank (generalization) node. Never indexed by payload.
    pub fn create_blank_node(&mut self) -> NodeId {
        let id = NodeId(self.nodes.len());
        let stable_id = node::stable_id_for(id.0);
        self.nodes.push(Some(Node::create_blank(stable_id)));
        self.mark_dirty();
        id
    }

    /// Combines two existing nodes into a new hierarchy node (C8's only
    /// construction path for abstraction level > 0). Copies and averages
    /// incoming/outgoing edges of both constituents onto the new node,
    /// merging into an existing `new_id`-side edge rather than adding a
    /// parallel one when both constituents shared the same neighbor
    /// (enforces "no duplicate outgoing edge between any ordered pair").
    pub fn combine_nodes(&mut self, a: NodeId, b: NodeId) -> Result<NodeId, MelvinError> {
        let (a_node, b_node) = (
            self.get_node(a)
                .ok_or_else(|| MelvinError::invariant(format!("combine: missing node {a}")))?
                .clone(),
            self.get_node(b)
                .ok_or_else(|| MelvinError::invariant(format!("combine: missing node {b}")))?
                .clone(),
        );
        let new_id = NodeId(self.nodes.len());
        let stable_id = node::stable_id_for(new_id.0);
        let combined = Node::combine_payloads(stable_id, &a_node, &b_node);
        if !combined.payload.is_empty() {
            self.payload_index.insert(new_id, &combined.payload);
        }
        self.nodes.push(Some(combined));
        self.mark_dirty();

        let mut targets = Vec::new();
        for &eid in a_node.outgoing.iter().chain(b_node.outgoing.iter()) {
            if let Some(e) = self.get_edge(eid) {
                targets.push((e.to, e.weight, e.direction));
            }
        }
        let mut sources = Vec::new();
        for &eid in a_node.incoming.iter().chain(b_node.incoming.iter()) {
            if let Some(e) = self.get_edge(eid) {
                sources.push((e.from, e.weight, e.direction));
            }
        }
        for (to, weight, direction) in targets {
            let contribution = weight / 2.0;
            match self.find_edge(new_id, to) {
                Some(eid) => {
                    let old_weight = self.get_edge(eid).map(|e| e.weight).unwrap_or(0.0);
                    let new_weight = (old_weight + contribution) / 2.0;
                    let delta = new_weight - old_weight;
                    if let Some(e) = self.get_edge_mut(eid) {
                        e.weight = new_weight;
                    }
                    if let Some(n) = self.get_node_mut(new_id) {
                        n.bump_outgoing_sum(delta);
                    }
                    if let Some(n) = self.get_node_mut(to) {
                        n.bump_incoming_sum(delta);
                    }
                }
                None => {
                    let eid = self.add_edge(new_id, to, direction)?;
                    if let Some(e) = self.get_edge_mut(eid) {
                        e.weight = contribution;
                    }
                    if let Some(n) = self.get_node_mut(new_id) {
                        n.bump_outgoing_sum(contribution);
                    }
                    if let Some(n) = self.get_node_mut(to) {
                        n.bump_incoming_sum(contribution);
                    }
                }
            }
        }
        for (from, weight, direction) in sources {
            let contribution = weight / 2.0;
            match self.find_edge(from, new_id) {
                Some(eid) => {
                    let old_weight = self.get_edge(eid).map(|e| e.weight).unwrap_or(0.0);
                    let new_weight = (old_weight + contribution) / 2.0;
                    let delta = new_weight - old_weight;
                    if let Some(e) = self.get_edge_mut(eid) {
                        e.weight = new_weight;
                    }
                    if let Some(n) = self.get_node_mut(from) {
                        n.bump_outgoing_sum(delta);
                    }
                    if let Some(n) = self.get_node_mut(new_id) {
                        n.bump_incoming_sum(delta);
                    }
                }
                None => {
                    let eid = self.add_edge(from, new_id, direction)?;
                    if let Some(e) = self.get_edge_mut(eid) {
                        e.weight = contribution;
                    }
                    if let Some(n) = self.get_node_mut(from) {
                        n.bump_outgoing_sum(contribution);
                    }
                    if let Some(n) = self.get_node_mut(new_id) {
                        n.bump_incoming_sum(contribution);
                    }
                }
            }
        }

        Ok(new_id)
    }

    /// Finds candidate nodes whose payload fingerprint matches `bytes`
    /// (invariant 4: superset of true matches, caller verifies equality).
    #[must_use]
    pub fn find_nodes_by_payload(&self, bytes: &[u8]) -> Vec<NodeId> {
        self.payload_index
            .lookup(bytes)
            .into_iter()
            .filter(|&id| self.get_node(id).is_some())
            .collect()
    }

    /// Returns every concrete (non-blank) node currently indexed, used by
    /// similarity scans (C7 step 3) that must consider the whole
    /// population rather than one bucket.
    pub fn all_indexed_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.payload_index
            .all_node_payload_pairs()
            .map(|(_, id)| id)
            .filter(|&id| self.get_node(id).is_some())
    }

    /// O(outgoing_count) scan for an existing `from -> to` edge (§4.7:
    /// creating a duplicate is forbidden, the correct response is to
    /// strengthen).
    #[must_use]
    pub fn find_edge(&self, from: NodeId, to: NodeId) -> Option<EdgeId> {
        let node = self.get_node(from)?;
        node.outgoing.iter().copied().find(|&eid| {
            self.get_edge(eid).map(|e| e.to == to).unwrap_or(false)
        })
    }

    /// Unconditionally creates a new `from -> to` edge with weight 0 and
    /// registers it on both endpoints. Callers that must respect the
    /// no-duplicate-edge invariant should call `find_edge` first or use
    /// `strengthen_or_create`.
    pub fn add_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        direction: Direction,
    ) -> Result<EdgeId, MelvinError> {
        if self.get_node(from).is_none() {
            return Err(MelvinError::invariant(format!("add_edge: missing source {from}")));
        }
        if self.get_node(to).is_none() {
            return Err(MelvinError::invariant(format!("add_edge: missing target {to}")));
        }
        let id = EdgeId(self.edges.len());
        self.edges.push(Some(Edge::create(from, to, direction)));
        if let Some(n) = self.get_node_mut(from) {
            n.add_outgoing(id, 0.0);
        }
        if let Some(n) = self.get_node_mut(to) {
            n.add_incoming(id, 0.0);
        }
        self.mark_dirty();
        Ok(id)
    }

    /// Strengthens the `from -> to` edge if it exists, otherwise creates
    /// it, then applies the §4.2 edge weight update with activation `x`.
    /// This is the only edge-formation entry point C7/C8 should use; it
    /// enforces "no duplicate edges" unconditionally, closing the gap the
    /// source left open at some call sites (§9).
    pub fn strengthen_or_create(
        &mut self,
        from: NodeId,
        to: NodeId,
        direction: Direction,
        x: f32,
    ) -> Result<EdgeId, MelvinError> {
        let eid = match self.find_edge(from, to) {
            Some(eid) => eid,
            None => self.add_edge(from, to, direction)?,
        };
        self.apply_edge_weight_update(eid, x)?;
        Ok(eid)
    }

    /// Applies the §4.2 edge weight update to `edge_id`, keeping both
    /// endpoints' cached sums exact.
    pub fn apply_edge_weight_update(&mut self, edge_id: EdgeId, x: f32) -> Result<(), MelvinError> {
        let (from, old_weight) = {
            let e = self
                .get_edge(edge_id)
                .ok_or_else(|| MelvinError::invariant(format!("unknown edge {edge_id}")))?;
            (e.from, e.weight)
        };
        let sibling_weights = measure::sibling_edge_weights(self, from, edge_id);
        let epsilon = crate::stats::adaptive_epsilon(&sibling_weights);
        let sibling_avg = measure::mean(&sibling_weights);

        let (to, new_weight) = {
            let e = self
                .get_edge_mut(edge_id)
                .ok_or_else(|| MelvinError::invariant(format!("unknown edge {edge_id}")))?;
            e.apply_weight_update(sibling_avg, epsilon, x);
            (e.to, e.weight)
        };
        let delta = new_weight - old_weight;
        if let Some(n) = self.get_node_mut(from) {
            n.bump_outgoing_sum(delta);
        }
        if let Some(n) = self.get_node_mut(to) {
            n.bump_incoming_sum(delta);
        }
        self.mark_dirty();
        Ok(())
    }

    /// Removes `node_id` and every edge touching it, updating the other
    /// endpoints' sums (invariant 2). Tombstones the slot; indices of
    /// other nodes/edges are unaffected.
    pub fn remove_node_cascade(&mut self, node_id: NodeId) -> Result<(), MelvinError> {
        let node = match self.nodes.get(node_id.0).and_then(Option::as_ref) {
            Some(n) => n.clone(),
            None => return Ok(()),
        };
        if !node.payload.is_empty() {
            self.payload_index.remove(node_id, &node.payload);
        }
        for &eid in &node.outgoing {
            if let Some(e) = self.get_edge(eid).cloned() {
                let weight = e.weight;
                if let Some(other) = self.get_node_mut(e.to) {
                    other.remove_incoming(eid, weight);
                }
                if let Some(slot) = self.edges.get_mut(eid.0) {
                    *slot = None;
                }
            }
        }
        for &eid in &node.incoming {
            if let Some(e) = self.get_edge(eid).cloned() {
                let weight = e.weight;
                if let Some(other) = self.get_node_mut(e.from) {
                    other.remove_outgoing(eid, weight);
                }
                if let Some(slot) = self.edges.get_mut(eid.0) {
                    *slot = None;
                }
            }
        }
        if let Some(slot) = self.nodes.get_mut(node_id.0) {
            *slot = None;
        }
        self.mark_dirty();
        Ok(())
    }

    /// Returns the stable identifier currently bound to `node_id` (needed
    /// by C10 to write node records).
    #[must_use]
    pub fn stable_id_of(&self, node_id: NodeId) -> Option<StableId> {
        self.get_node(node_id).map(|n| n.stable_id)
    }

    /// Iterates the ids of every live blank (P=0) node. Blanks are never in
    /// the payload-hash index, so this is the only enumeration path for
    /// C6's blank-node acceptance step and C7's generalization step.
    pub fn blank_node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().enumerate().filter_map(|(i, n)| {
            n.as_ref()
                .filter(|node| node.is_blank())
                .map(|_| NodeId(i))
        })
    }

    /// Promotes a blank node to a concrete one holding `payload`, and
    /// indexes it (invariant 4 requires every P>0 node to be indexed).
    pub fn promote_blank(&mut self, node_id: NodeId, payload: Vec<u8>) -> Result<(), MelvinError> {
        {
            let node = self
                .get_node_mut(node_id)
                .ok_or_else(|| MelvinError::invariant(format!("promote_blank: missing node {node_id}")))?;
            node.fill_blank(payload.clone())?;
        }
        self.payload_index.insert(node_id, &payload);
        self.mark_dirty();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_node_assigns_sequential_ids() {
        let mut g = Graph::new();
        let a = g.create_node(b"a".to_vec());
        let b = g.create_node(b"b".to_vec());
        assert_eq!(a.0, 0);
        assert_eq!(b.0, 1);
        assert_eq!(g.node_count(), 2);
    }

    #[test]
    fn find_nodes_by_payload_returns_inserted_node() {
        let mut g = Graph::new();
        let a = g.create_node(b"hello".to_vec());
        let candidates = g.find_nodes_by_payload(b"hello");
        assert!(candidates.contains(&a));
    }

    #[test]
    fn blank_nodes_are_never_indexed() {
        let mut g = Graph::new();
        g.create_blank_node();
        let candidates = g.find_nodes_by_payload(b"");
        assert!(candidates.is_empty());
    }

    #[test]
    fn add_edge_updates_both_endpoint_sums_on_weight_change() {
        let mut g = Graph::new();
        let a = g.create_node(b"a".to_vec());
        let b = g.create_node(b"b".to_vec());
        let eid = g.add_edge(a, b, Direction::FromTo).expect("edge");
        g.apply_edge_weight_update(eid, 1.0).expect("update");
        let weight = g.get_edge(eid).expect("edge").weight;
        assert_eq!(g.get_node(a).expect("a").outgoing_weight_sum, weight);
        assert_eq!(g.get_node(b).expect("b").incoming_weight_sum, weight);
    }

    #[test]
    fn strengthen_or_create_never_duplicates() {
        let mut g = Graph::new();
        let a = g.create_node(b"a".to_vec());
        let b = g.create_node(b"b".to_vec());
        g.strengthen_or_create(a, b, Direction::FromTo, 1.0).expect("e1");
        g.strengthen_or_create(a, b, Direction::FromTo, 1.0).expect("e2");
        assert_eq!(g.get_node(a).expect("a").outgoing.len(), 1);
    }

    #[test]
    fn strengthen_or_create_increases_weight_on_repeat() {
        let mut g = Graph::new();
        let a = g.create_node(b"a".to_vec());
        let b = g.create_node(b"b".to_vec());
        let e1 = g.strengthen_or_create(a, b, Direction::FromTo, 1.0).expect("e1");
        let w1 = g.get_edge(e1).expect("edge").weight;
        g.strengthen_or_create(a, b, Direction::FromTo, 1.0).expect("e2");
        let w2 = g.get_edge(e1).expect("edge").weight;
        assert!(w2 >= w1);
    }

    #[test]
    fn combine_nodes_sets_abstraction_level_and_averages_weight() {
        let mut g = Graph::new();
        let a = g.create_node(b"cat".to_vec());
        let b = g.create_node(b"dog".to_vec());
        g.get_node_mut(a).expect("a").weight = 2.0;
        g.get_node_mut(b).expect("b").weight = 4.0;
        let combined = g.combine_nodes(a, b).expect("combine");
        let node = g.get_node(combined).expect("combined");
        assert_eq!(node.payload, b"catdog");
        assert_eq!(node.abstraction_level, 1);
        assert_eq!(node.weight, 3.0);
    }

    #[test]
    fn combine_nodes_merges_shared_neighbor_instead_of_duplicating() {
        let mut g = Graph::new();
        let n = g.create_node(b"n".to_vec());
        let a = g.create_node(b"a".to_vec());
        let b = g.create_node(b"b".to_vec());
        let e_na = g.add_edge(n, a, Direction::FromTo).expect("n->a");
        let e_nb = g.add_edge(n, b, Direction::FromTo).expect("n->b");
        g.apply_edge_weight_update(e_na, 1.0).expect("warm n->a");
        g.apply_edge_weight_update(e_nb, 1.0).expect("warm n->b");

        let combined = g.combine_nodes(a, b).expect("combine");
        // Both constituents had an incoming edge from `n`; the merge must
        // collapse that into a single n -> combined edge, not two.
        let outgoing_to_combined: Vec<_> = g
            .get_node(n)
            .expect("n")
            .outgoing
            .iter()
            .filter(|&&eid| g.get_edge(eid).map(|e| e.to == combined).unwrap_or(false))
            .collect();
        assert_eq!(outgoing_to_combined.len(), 1);
    }

    #[test]
    fn remove_node_cascade_clears_edges_and_sums() {
        let mut g = Graph::new();
        let a = g.create_node(b"a".to_vec());
        let b = g.create_node(b"b".to_vec());
        let eid = g.add_edge(a, b, Direction::FromTo).expect("edge");
        g.apply_edge_weight_update(eid, 1.0).expect("update");
        g.remove_node_cascade(a).expect("remove");
        assert!(g.get_node(a).is_none());
        assert!(g.get_edge(eid).is_none());
        assert_eq!(g.get_node(b).expect("b").incoming_weight_sum, 0.0);
        assert_eq!(g.node_count(), 1);
    }

    #[test]
    fn payload_index_grows_and_preserves_lookups() {
        let mut g = Graph::new();
        let mut ids = Vec::new();
        for i in 0..64u32 {
            ids.push(g.create_node(i.to_le_bytes().to_vec()));
        }
        for (i, &id) in ids.iter().enumerate() {
            let payload = (i as u32).to_le_bytes();
            let candidates = g.find_nodes_by_payload(&payload);
            assert!(candidates.contains(&id));
        }
    }
}
