//! # Output readiness and collection (C9)
//!
//! Decides, at the end of a pass, whether the graph has anything worth
//! emitting and if so walks learned continuations out of the final
//! frontier. Never echoes the input back — every byte returned here is a
//! payload found by following edges, not a copy of what came in.

use std::collections::HashSet;

use crate::activation::edge_transform;
use crate::error::MelvinError;
use crate::graph::Graph;
use crate::ids::NodeId;
use crate::measure;
use crate::stats::adaptive_epsilon;

/// Mean, over `f0`, of `w_out / (w_out + 1 + epsilon)` where `w_out` is each
/// node's local outgoing average and `epsilon` is derived from that same
/// node's sibling weights. `0.0` exactly when every node in `f0` has zero
/// outgoing edges (and so contributes `0.0` to the mean) — matching the
/// "readiness is zero iff there is nothing to walk" invariant.
#[must_use]
pub fn output_readiness(graph: &Graph, f0: &[NodeId]) -> f32 {
    if f0.is_empty() {
        return 0.0;
    }
    let mut total = 0.0f32;
    for &n in f0 {
        let w_out = measure::local_outgoing_avg(graph, n);
        let weights = measure::outgoing_edge_weights(graph, n);
        let epsilon = adaptive_epsilon(&weights);
        total += w_out / (w_out + 1.0 + epsilon);
    }
    total / f0.len() as f32
}

/// Follows the single strongest outgoing edge out of `start` whose
/// transformed activation is positive and whose target has not already been
/// visited this walk, accumulating target payloads. Stops on no positive
/// edge, a repeated node (cycle), or when the running mean of walked edge
/// weights drops below the walk's own local mean.
fn walk_from(graph: &Graph, start: NodeId, globally_visited: &mut HashSet<NodeId>) -> Vec<u8> {
    let mut out = Vec::new();
    let mut current = start;
    let mut walk_weights: Vec<f32> = Vec::new();
    let mut local_visited: HashSet<NodeId> = HashSet::new();
    local_visited.insert(start);

    loop {
        let node = match graph.get_node(current) {
            Some(n) => n,
            None => break,
        };
        let activation = node.activation;
        let mut best: Option<(NodeId, f32, f32)> = None; // (target, edge_weight, transformed)
        for &eid in &node.outgoing {
            let edge = match graph.get_edge(eid) {
                Some(e) => e,
                None => continue,
            };
            if globally_visited.contains(&edge.to) || local_visited.contains(&edge.to) {
                continue;
            }
            let transformed = edge_transform(graph, eid, activation);
            if transformed <= 0.0 {
                continue;
            }
            if best.as_ref().map(|&(_, _, t)| transformed > t).unwrap_or(true) {
                best = Some((edge.to, edge.weight, transformed));
            }
        }
        let (target, edge_weight, _) = match best {
            Some(b) => b,
            None => break,
        };

        walk_weights.push(edge_weight);
        let walk_mean = measure::mean(&walk_weights);
        if edge_weight < walk_mean && walk_weights.len() > 1 {
            break;
        }

        local_visited.insert(target);
        if let Some(target_node) = graph.get_node(target) {
            if !target_node.payload.is_empty() {
                out.extend_from_slice(&target_node.payload);
            }
        }
        current = target;
    }

    out
}

/// If `output_readiness(f0) > 0`, walks a learned continuation from each
/// node in `f0` (in order) and concatenates the results. Every node in `f0`
/// is marked visited-context up front so no walk can step back into the
/// frontier it started from.
pub fn collect_output(graph: &Graph, f0: &[NodeId]) -> Result<Vec<u8>, MelvinError> {
    if output_readiness(graph, f0) <= 0.0 {
        return Ok(Vec::new());
    }
    let mut visited: HashSet<NodeId> = f0.iter().copied().collect();
    let mut out = Vec::new();
    for &n in f0 {
        let bytes = walk_from(graph, n, &mut visited);
        out.extend_from_slice(&bytes);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::Direction;

    #[test]
    fn readiness_is_zero_without_outgoing_edges() {
        let mut g = Graph::new();
        let a = g.create_node(b"a".to_vec());
        assert_eq!(output_readiness(&g, &[a]), 0.0);
    }

    #[test]
    fn readiness_is_positive_with_a_warmed_outgoing_edge() {
        let mut g = Graph::new();
        let a = g.create_node(b"a".to_vec());
        let b = g.create_node(b"b".to_vec());
        let eid = g.strengthen_or_create(a, b, Direction::FromTo, 1.0).expect("edge");
        g.apply_edge_weight_update(eid, 1.0).expect("warm");
        assert!(output_readiness(&g, &[a]) > 0.0);
    }

    #[test]
    fn collect_output_empty_when_not_ready() {
        let mut g = Graph::new();
        let a = g.create_node(b"a".to_vec());
        let out = collect_output(&g, &[a]).expect("collect");
        assert!(out.is_empty());
    }

    #[test]
    fn collect_output_walks_to_a_learned_continuation() {
        let mut g = Graph::new();
        let a = g.create_node(b"a".to_vec());
        let b = g.create_node(b"b".to_vec());
        let eid = g.strengthen_or_create(a, b, Direction::FromTo, 1.0).expect("edge");
        for _ in 0..5 {
            g.apply_edge_weight_update(eid, 1.0).expect("warm");
        }
        g.get_node_mut(a).expect("a").activation = 1.0;
        let out = collect_output(&g, &[a]).expect("collect");
        assert_eq!(out, b"b".to_vec());
    }

    #[test]
    fn collect_output_does_not_step_back_into_frontier() {
        let mut g = Graph::new();
        let a = g.create_node(b"a".to_vec());
        let b = g.create_node(b"b".to_vec());
        let eid_ab = g.strengthen_or_create(a, b, Direction::FromTo, 1.0).expect("ab");
        let eid_ba = g.strengthen_or_create(b, a, Direction::FromTo, 1.0).expect("ba");
        for _ in 0..5 {
            g.apply_edge_weight_update(eid_ab, 1.0).expect("warm ab");
            g.apply_edge_weight_update(eid_ba, 1.0).expect("warm ba");
        }
        g.get_node_mut(a).expect("a").activation = 1.0;
        g.get_node_mut(b).expect("b").activation = 1.0;
        let out = collect_output(&g, &[a, b]).expect("collect");
        assert!(out.is_empty() || out == b"b".to_vec() || out == b"a".to_vec());
    }
}
