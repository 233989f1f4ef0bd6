//! # Local measurement and similarity (C4)
//!
//! Everything here is O(1) or O(local neighborhood) — never a whole-graph
//! scan. `local_outgoing_avg`/`local_incoming_avg` read the cached sums
//! `Graph` keeps exact (invariant 1); `payload_similarity` compares two
//! byte slices using a chunked, branch-light loop (the spec's "SIMD
//! optional" byte-parallel comparison, realized portably via
//! `chunks_exact`).

use crate::edge::Edge;
use crate::graph::Graph;
use crate::ids::{EdgeId, NodeId};

/// Arithmetic mean of `values`, `0.0` when empty. Shared with `stats` so
/// callers in this module and `graph` do not need a separate copy.
#[must_use]
pub fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

/// `outgoing_weight_sum / outgoing_count`, `0.0` if the node has no
/// outgoing edges.
#[must_use]
pub fn local_outgoing_avg(graph: &Graph, node_id: NodeId) -> f32 {
    match graph.get_node(node_id) {
        Some(n) if !n.outgoing.is_empty() => n.outgoing_weight_sum / n.outgoing.len() as f32,
        _ => 0.0,
    }
}

/// `incoming_weight_sum / incoming_count`, `0.0` if the node has no
/// incoming edges.
#[must_use]
pub fn local_incoming_avg(graph: &Graph, node_id: NodeId) -> f32 {
    match graph.get_node(node_id) {
        Some(n) if !n.incoming.is_empty() => n.incoming_weight_sum / n.incoming.len() as f32,
        _ => 0.0,
    }
}

/// `payload_similarity(n, bytes)` for a concrete node's payload: equal-byte
/// count over the first `min(P, len(bytes))` positions, divided by `P`.
/// `0.0` if `m = 0` or `P > len(bytes)`.
#[must_use]
pub fn payload_similarity(payload: &[u8], bytes: &[u8]) -> f32 {
    let p = payload.len();
    if p == 0 || p > bytes.len() {
        return 0.0;
    }
    let m = p.min(bytes.len());
    if m == 0 {
        return 0.0;
    }
    let a = &payload[..m];
    let b = &bytes[..m];

    let mut equal: usize = 0;
    let chunks_a = a.chunks_exact(16);
    let chunks_b = b.chunks_exact(16);
    let rem_a = chunks_a.remainder();
    let rem_b = chunks_b.remainder();
    for (ca, cb) in chunks_a.zip(chunks_b) {
        for i in 0..16 {
            if ca[i] == cb[i] {
                equal += 1;
            }
        }
    }
    for (x, y) in rem_a.iter().zip(rem_b.iter()) {
        if x == y {
            equal += 1;
        }
    }

    equal as f32 / p as f32
}

/// Weighted similarity of `bytes` against each non-blank neighbor connected
/// to a blank node, weighted by edge weight; returns the weighted average.
/// This is how blank nodes "match through connections, not payload"
/// (§4.5). `neighbors` is the list of (neighbor payload, edge weight)
/// pairs for the blank node's edges, in either direction.
#[must_use]
pub fn blank_match_strength(bytes: &[u8], neighbors: &[(&[u8], f32)]) -> f32 {
    let mut weighted_sum = 0.0f32;
    let mut weight_total = 0.0f32;
    for &(payload, weight) in neighbors {
        if payload.is_empty() {
            continue;
        }
        let sim = payload_similarity(payload, bytes);
        weighted_sum += sim * weight;
        weight_total += weight;
    }
    if weight_total > 0.0 {
        weighted_sum / weight_total
    } else {
        0.0
    }
}

/// Collects the weights of `node_id`'s outgoing edges other than
/// `excluding` — the "sibling edges" context an edge's own weight update
/// (§4.2) is computed from.
#[must_use]
pub fn sibling_edge_weights(graph: &Graph, node_id: NodeId, excluding: EdgeId) -> Vec<f32> {
    match graph.get_node(node_id) {
        Some(n) => n
            .outgoing
            .iter()
            .filter(|&&eid| eid != excluding)
            .filter_map(|&eid| graph.get_edge(eid))
            .map(|e: &Edge| e.weight)
            .collect(),
        None => Vec::new(),
    }
}

/// Collects the weights of every outgoing edge of `node_id`, used by edge
/// transform's similarity/primary-path boosts which reason over *all*
/// sibling edges of the source node (not excluding the one being
/// transformed, since those boosts are read-only measurements).
#[must_use]
pub fn outgoing_edge_weights(graph: &Graph, node_id: NodeId) -> Vec<f32> {
    match graph.get_node(node_id) {
        Some(n) => n
            .outgoing
            .iter()
            .filter_map(|&eid| graph.get_edge(eid))
            .map(|e: &Edge| e.weight)
            .collect(),
        None => Vec::new(),
    }
}

/// Collects the payload-similarity of `edge`'s two endpoints against each
/// sibling edge's own two endpoints, used to compute `local_sim_threshold`
/// in `edge_transform` (§4.5 step 2). Only edges whose endpoints both have
/// P>0 contribute.
#[must_use]
pub fn sibling_payload_similarities(graph: &Graph, node_id: NodeId) -> Vec<f32> {
    let node = match graph.get_node(node_id) {
        Some(n) => n,
        None => return Vec::new(),
    };
    let mut sims = Vec::new();
    for &eid in &node.outgoing {
        if let Some(e) = graph.get_edge(eid) {
            if let (Some(src), Some(dst)) = (graph.get_node(e.from), graph.get_node(e.to)) {
                if !src.payload.is_empty() && !dst.payload.is_empty() {
                    sims.push(payload_similarity(&src.payload, &dst.payload));
                }
            }
        }
    }
    sims
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::Direction;

    #[test]
    fn local_outgoing_avg_is_zero_without_edges() {
        let mut g = Graph::new();
        let a = g.create_node(b"a".to_vec());
        assert_eq!(local_outgoing_avg(&g, a), 0.0);
    }

    #[test]
    fn local_outgoing_avg_divides_sum_by_count() {
        let mut g = Graph::new();
        let a = g.create_node(b"a".to_vec());
        let b = g.create_node(b"b".to_vec());
        let c = g.create_node(b"c".to_vec());
        let e1 = g.add_edge(a, b, Direction::FromTo).expect("e1");
        let e2 = g.add_edge(a, c, Direction::FromTo).expect("e2");
        g.apply_edge_weight_update(e1, 1.0).expect("u1");
        g.apply_edge_weight_update(e2, 1.0).expect("u2");
        let avg = local_outgoing_avg(&g, a);
        let expected = g.get_node(a).expect("a").outgoing_weight_sum / 2.0;
        assert_eq!(avg, expected);
    }

    #[test]
    fn payload_similarity_identical_is_one() {
        assert_eq!(payload_similarity(b"hello", b"hello"), 1.0);
    }

    #[test]
    fn payload_similarity_partial_overlap() {
        let sim = payload_similarity(b"aaaa", b"aaab");
        assert!((sim - 0.75).abs() < 1e-6);
    }

    #[test]
    fn payload_similarity_zero_when_payload_longer_than_input() {
        assert_eq!(payload_similarity(b"abcdef", b"ab"), 0.0);
    }

    #[test]
    fn payload_similarity_handles_long_payloads_across_chunk_boundary() {
        let a = vec![7u8; 33];
        let mut b = vec![7u8; 33];
        b[32] = 9;
        let sim = payload_similarity(&a, &b);
        assert!((sim - (32.0 / 33.0)).abs() < 1e-6);
    }

    #[test]
    fn blank_match_strength_weights_by_edge_weight() {
        let neighbors = [(&b"apple"[..], 1.0), (&b"maple"[..], 3.0)];
        let s = blank_match_strength(b"apple", &neighbors);
        assert!(s > 0.0 && s < 1.0);
    }

    #[test]
    fn blank_match_strength_zero_without_neighbors() {
        assert_eq!(blank_match_strength(b"apple", &[]), 0.0);
    }
}
