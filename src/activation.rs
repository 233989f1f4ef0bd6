//! # Node activation and edge transform (C5)
//!
//! The "mini-neuron"/"mini-transformer" pair the rest of the pipeline
//! drives: `node_activation` folds a node's incoming edges (already
//! transformed) into a soft-squashed `[0,1]` scalar; `edge_transform`
//! shapes what an edge carries forward using similarity and primary-path
//! boosts measured from the edge's own sibling context; `match_strength`
//! scores how well a node represents a candidate byte string, the
//! currency C6 spends to pick among candidates.

use crate::graph::Graph;
use crate::ids::{EdgeId, NodeId};
use crate::measure;
use crate::stats::{adaptive_epsilon, percentile};

/// Computes the transformed activation an edge carries, given the
/// activation `x` its source currently holds. Non-negative (§4.5 step 4).
#[must_use]
pub fn edge_transform(graph: &Graph, edge_id: EdgeId, x: f32) -> f32 {
    let edge = match graph.get_edge(edge_id) {
        Some(e) => e,
        None => return 0.0,
    };
    let mut value = edge.weight * x;

    if let (Some(src), Some(dst)) = (graph.get_node(edge.from), graph.get_node(edge.to)) {
        if !src.payload.is_empty() && !dst.payload.is_empty() {
            let sim = measure::payload_similarity(&src.payload, &dst.payload);
            let sibling_sims = measure::sibling_payload_similarities(graph, edge.from);
            let local_sim_threshold = measure::mean(&sibling_sims);
            value += edge.weight * x * (sim - local_sim_threshold).max(0.0);
        }
    }

    let sibling_weights = measure::outgoing_edge_weights(graph, edge.from);
    let q = percentile(&sibling_weights, 0.75);
    if edge.weight > q {
        let epsilon = adaptive_epsilon(&sibling_weights);
        value *= 1.0 + (edge.weight - q) / (q + epsilon);
    }

    value.max(0.0)
}

/// Computes the activation a node would take on this pass and the bias it
/// would be assigned, from its incoming edges' sources' current
/// activations. Does not mutate the graph; the caller decides when to
/// commit the result to the node (propagation order matters: sources must
/// already carry their own settled activation).
#[must_use]
pub fn node_activation(graph: &Graph, node_id: NodeId) -> (f32, f32) {
    let node = match graph.get_node(node_id) {
        Some(n) => n,
        None => return (0.0, 0.0),
    };

    let mut raw_in = 0.0f32;
    let mut total_w = 0.0f32;
    let mut incoming_weights = Vec::with_capacity(node.incoming.len());
    for &eid in &node.incoming {
        if let Some(e) = graph.get_edge(eid) {
            if let Some(src) = graph.get_node(e.from) {
                raw_in += edge_transform(graph, eid, src.activation);
                total_w += e.weight;
                incoming_weights.push(e.weight);
            }
        }
    }
    let in_epsilon = adaptive_epsilon(&incoming_weights);
    let input_sum = if total_w > 0.0 {
        raw_in / (total_w + in_epsilon)
    } else {
        0.0
    };

    let local_outgoing_avg = measure::local_outgoing_avg(graph, node_id);
    let outgoing_weights = measure::outgoing_edge_weights(graph, node_id);
    let bias_epsilon = adaptive_epsilon(&outgoing_weights);
    let bias_denom = node.weight + local_outgoing_avg + bias_epsilon;
    let bias = if bias_denom > 0.0 {
        node.weight / bias_denom
    } else {
        0.0
    };

    let raw = input_sum + bias;
    let activation = raw / (1.0 + raw);
    (activation, bias)
}

/// Scores how well `node_id` represents `bytes`. For concrete nodes,
/// similarity weighted by local dominance; for blank nodes, the weighted
/// similarity of `bytes` against connected non-blank neighbors (§4.5).
#[must_use]
pub fn match_strength(graph: &Graph, node_id: NodeId, bytes: &[u8]) -> f32 {
    let node = match graph.get_node(node_id) {
        Some(n) => n,
        None => return 0.0,
    };

    if !node.payload.is_empty() {
        let sim = measure::payload_similarity(&node.payload, bytes);
        let local_avg = measure::local_outgoing_avg(graph, node_id);
        let weights = measure::outgoing_edge_weights(graph, node_id);
        let epsilon = adaptive_epsilon(&weights);
        let denom = node.weight + local_avg + epsilon;
        let dominance = if denom > 0.0 { node.weight / denom } else { 0.0 };
        return sim * dominance;
    }

    let mut neighbor_payloads: Vec<(Vec<u8>, f32)> = Vec::new();
    for &eid in node.outgoing.iter().chain(node.incoming.iter()) {
        if let Some(e) = graph.get_edge(eid) {
            let other = if e.from == node_id { e.to } else { e.from };
            if let Some(n) = graph.get_node(other) {
                if !n.payload.is_empty() {
                    neighbor_payloads.push((n.payload.clone(), e.weight));
                }
            }
        }
    }
    let refs: Vec<(&[u8], f32)> = neighbor_payloads
        .iter()
        .map(|(p, w)| (p.as_slice(), *w))
        .collect();
    measure::blank_match_strength(bytes, &refs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::Direction;

    #[test]
    fn edge_transform_is_nonnegative() {
        let mut g = Graph::new();
        let a = g.create_node(b"a".to_vec());
        let b = g.create_node(b"b".to_vec());
        let eid = g.add_edge(a, b, Direction::FromTo).expect("edge");
        g.apply_edge_weight_update(eid, 1.0).expect("update");
        let value = edge_transform(&g, eid, 1.0);
        assert!(value >= 0.0);
    }

    #[test]
    fn edge_transform_zero_for_missing_edge() {
        let g = Graph::new();
        assert_eq!(edge_transform(&g, EdgeId(99), 1.0), 0.0);
    }

    #[test]
    fn node_activation_is_bounded() {
        let mut g = Graph::new();
        let a = g.create_node(b"a".to_vec());
        let b = g.create_node(b"b".to_vec());
        let eid = g.add_edge(a, b, Direction::FromTo).expect("edge");
        g.apply_edge_weight_update(eid, 1.0).expect("update");
        g.get_node_mut(a).expect("a").activation = 1.0;
        let (activation, bias) = node_activation(&g, b);
        assert!((0.0..=1.0).contains(&activation));
        assert!((0.0..=1.0).contains(&bias));
    }

    #[test]
    fn node_activation_zero_without_incoming_edges_or_weight() {
        let mut g = Graph::new();
        let a = g.create_node(b"a".to_vec());
        let (activation, _) = node_activation(&g, a);
        assert_eq!(activation, 0.0);
    }

    #[test]
    fn match_strength_favors_exact_payload() {
        let mut g = Graph::new();
        let a = g.create_node(b"apple".to_vec());
        g.get_node_mut(a).expect("a").weight = 1.0;
        let exact = match_strength(&g, a, b"apple");
        let partial = match_strength(&g, a, b"apply");
        assert!(exact >= partial);
    }

    #[test]
    fn match_strength_for_blank_uses_connections() {
        let mut g = Graph::new();
        let blank = g.create_blank_node();
        let apple = g.create_node(b"apple".to_vec());
        let eid = g.add_edge(blank, apple, Direction::FromTo).expect("edge");
        g.apply_edge_weight_update(eid, 1.0).expect("update");
        let strength = match_strength(&g, blank, b"apple");
        assert!(strength > 0.0);
    }
}
