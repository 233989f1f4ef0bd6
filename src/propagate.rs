//! # Multi-step wave propagation (C8)
//!
//! Runs after C7 has formed edges around the ingested sequence. Starting
//! from the frontier `F0 = S`, repeatedly expands outward: a node forwards
//! activation across an outgoing edge only when the transformed activation
//! exceeds a per-node threshold derived from its own local statistics, never
//! a fixed fraction. Each step also runs the C7 co-activation/context edge
//! creators over the current frontier (a wave that crosses two previously
//! unconnected regions should connect them the same way a single ingestion
//! frame would), and checks each touched node for hierarchy emergence.
//! Propagation halts when the frontier runs dry, when the energy carried by
//! the frontier stops changing by more than an adaptively smoothed amount,
//! or after a depth bound derived from graph size.

use std::collections::HashSet;

use crate::activation::edge_transform;
use crate::association::{co_activation_edges, context_edges};
use crate::error::MelvinError;
use crate::graph::Graph;
use crate::ids::NodeId;
use crate::measure;
use crate::stats::{adaptive_epsilon, adaptive_exploration_steps, adaptive_smoothing, variance};

/// Coefficient of variation of `values`: `sqrt(variance) / |mean|`, `0.0`
/// when the mean is zero or there are fewer than two observations.
fn coefficient_of_variation(values: &[f32]) -> f32 {
    let m = measure::mean(values).abs();
    if m == 0.0 {
        return 0.0;
    }
    variance(values).sqrt() / m
}

/// Per-node forwarding threshold: `local_outgoing_avg / (1 + epsilon) *
/// f(cv)`, where `f(cv) = cv / (1 + cv)` maps the coefficient of variation of
/// the node's own sibling weights into `[0, 1)` without a fixed midpoint.
fn forwarding_threshold(graph: &Graph, node_id: NodeId) -> f32 {
    let weights = measure::outgoing_edge_weights(graph, node_id);
    let epsilon = adaptive_epsilon(&weights);
    let local_avg = measure::local_outgoing_avg(graph, node_id);
    let cv = coefficient_of_variation(&weights);
    let f = cv / (1.0 + cv);
    local_avg / (1.0 + epsilon) * f
}

/// Looks at `node_id`'s outgoing edges for a top target that dominates the
/// runner-up by at least a relative multiple derived from the node's own
/// outgoing-weight variance (`1 + cv`, never a fixed `1.5`). The runner-up
/// weight only gates the decision; it is never a constituent of the
/// combination. Returns the top target if the gate passes.
fn dominant_pair(graph: &Graph, node_id: NodeId) -> Option<NodeId> {
    let node = graph.get_node(node_id)?;
    if node.outgoing.len() < 2 {
        return None;
    }
    let mut targets: Vec<(NodeId, f32)> = node
        .outgoing
        .iter()
        .filter_map(|&eid| graph.get_edge(eid))
        .map(|e| (e.to, e.weight))
        .collect();
    targets.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let (top, top_w) = targets[0];
    let (_, second_w) = targets[1];
    if second_w <= 0.0 {
        return None;
    }
    let weights: Vec<f32> = targets.iter().map(|&(_, w)| w).collect();
    let cv = coefficient_of_variation(&weights);
    let multiple = 1.0 + cv;
    if top_w >= second_w * multiple {
        Some(top)
    } else {
        None
    }
}

/// If `node_id` has a clearly dominant outgoing target, combines `node_id`
/// with that target into a new hierarchy node — the pair that actually
/// appeared in sequence — unless a node with that exact concatenated
/// payload already exists (a guard against re-combining the same pair on
/// every subsequent wave).
fn maybe_emerge_hierarchy(graph: &mut Graph, node_id: NodeId) -> Result<(), MelvinError> {
    let top = match dominant_pair(graph, node_id) {
        Some(t) => t,
        None => return Ok(()),
    };
    let (a_payload, b_payload) = match (graph.get_node(node_id), graph.get_node(top)) {
        (Some(x), Some(y)) => (x.payload.clone(), y.payload.clone()),
        _ => return Ok(()),
    };
    if a_payload.is_empty() || b_payload.is_empty() {
        return Ok(());
    }
    let mut combined_payload = a_payload.clone();
    combined_payload.extend_from_slice(&b_payload);
    if !graph.find_nodes_by_payload(&combined_payload).is_empty() {
        return Ok(());
    }
    graph.combine_nodes(node_id, top)?;
    Ok(())
}

/// Propagates activation outward from `f0` (C6's result sequence `S`),
/// forming in-wave edges and emerging hierarchy nodes as it goes.
pub fn propagate(graph: &mut Graph, f0: &[NodeId]) -> Result<(), MelvinError> {
    if f0.is_empty() {
        return Ok(());
    }

    let mut visited: HashSet<NodeId> = f0.iter().copied().collect();
    let mut frontier: Vec<NodeId> = f0.to_vec();
    let mut energy_history: Vec<f32> = Vec::new();
    let max_steps = adaptive_exploration_steps(graph.node_count()).max(1);

    for _ in 0..max_steps {
        if frontier.is_empty() {
            break;
        }

        let mut next_frontier: Vec<NodeId> = Vec::new();
        for &n in &frontier {
            let activation = match graph.get_node(n) {
                Some(node) => node.activation,
                None => continue,
            };
            let theta = forwarding_threshold(graph, n);
            let outgoing: Vec<_> = match graph.get_node(n) {
                Some(node) => node.outgoing.clone(),
                None => continue,
            };
            for eid in outgoing {
                let target = match graph.get_edge(eid) {
                    Some(e) => e.to,
                    None => continue,
                };
                if visited.contains(&target) {
                    continue;
                }
                let x = edge_transform(graph, eid, activation);
                if x <= theta {
                    continue;
                }
                graph.apply_edge_weight_update(eid, x)?;
                if let Some(target_node) = graph.get_node_mut(target) {
                    target_node.activation = target_node.activation.max(x);
                }
                visited.insert(target);
                next_frontier.push(target);
            }
        }

        co_activation_edges(graph, &frontier)?;
        context_edges(graph, &frontier)?;

        for &n in &frontier {
            maybe_emerge_hierarchy(graph, n)?;
        }

        let energy: f32 = frontier
            .iter()
            .filter_map(|&n| graph.get_node(n))
            .map(|n| n.activation)
            .sum();
        let grew = !next_frontier.is_empty();
        energy_history.push(energy);
        let smoothing = adaptive_smoothing(&energy_history);
        let converged = energy_history.len() >= 2 && smoothing == 0.0 && !grew;
        if converged && !grew {
            break;
        }

        frontier = next_frontier;
    }

    Ok(())
}
