//! # Intelligent edge formation (C7)
//!
//! Invoked once after C6 has produced `S`. Runs the five edge creators in
//! order — co-activation, context, similarity, generalization, homeostatic
//! — each of which goes through [`Graph::strengthen_or_create`] so a
//! duplicate is never created; an existing edge is always strengthened
//! instead (§4.7, and the duplicate-check gap the source spec's design
//! notes call out at several of these exact call sites).

use std::collections::HashSet;

use crate::edge::Direction;
use crate::error::MelvinError;
use crate::graph::Graph;
use crate::ids::NodeId;
use crate::measure;
use crate::stats::{adaptive_epsilon, adaptive_exploration_steps};

/// Strengthens or creates an edge between adjacent elements of `S`.
pub(crate) fn co_activation_edges(graph: &mut Graph, s: &[NodeId]) -> Result<(), MelvinError> {
    for pair in s.windows(2) {
        graph.strengthen_or_create(pair[0], pair[1], Direction::FromTo, 1.0)?;
    }
    Ok(())
}

/// Strengthens or creates edges (both directions) between pairs of `S`
/// within an adaptive window that tracks how long the current sequence is
/// — the window grows sub-linearly with `S`'s length, the same growth law
/// C1 uses for exploration depth, so a short frame never reaches far and a
/// long one reaches proportionally further without a fixed cap.
pub(crate) fn context_edges(graph: &mut Graph, s: &[NodeId]) -> Result<(), MelvinError> {
    let window = adaptive_exploration_steps(s.len()).max(1);
    for i in 0..s.len() {
        let hi = (i + 1 + window).min(s.len());
        for j in (i + 1)..hi {
            graph.strengthen_or_create(s[i], s[j], Direction::FromTo, 1.0)?;
            graph.strengthen_or_create(s[j], s[i], Direction::ToFrom, 1.0)?;
        }
    }
    Ok(())
}

/// For each `S[i]`, strengthens or creates edges (both directions) toward
/// every indexed node whose payload similarity to `S[i]` exceeds
/// `S[i]`'s own local similarity threshold (the mean payload similarity
/// across its existing sibling edges — the same quantity `edge_transform`
/// uses, kept here so the two stay in lockstep).
fn similarity_edges(graph: &mut Graph, s: &[NodeId]) -> Result<(), MelvinError> {
    let mut seen: HashSet<NodeId> = HashSet::new();
    for &node_id in s {
        if !seen.insert(node_id) {
            continue;
        }
        let payload = match graph.get_node(node_id) {
            Some(n) if !n.payload.is_empty() => n.payload.clone(),
            _ => continue,
        };
        let threshold = measure::mean(&measure::sibling_payload_similarities(graph, node_id));
        let candidates: Vec<NodeId> = graph.all_indexed_nodes().collect();
        for other in candidates {
            if other == node_id {
                continue;
            }
            let other_payload = match graph.get_node(other) {
                Some(n) => n.payload.clone(),
                None => continue,
            };
            let sim = measure::payload_similarity(&payload, &other_payload);
            if sim > threshold {
                graph.strengthen_or_create(node_id, other, Direction::FromTo, sim)?;
                graph.strengthen_or_create(other, node_id, Direction::ToFrom, sim)?;
            }
        }
    }
    Ok(())
}

/// When two nodes in `S` sit at the same abstraction level (so neither is
/// an ancestor of the other) and their mutual similarity exceeds the mean
/// pairwise similarity of the whole sequence, looks for a third node in
/// `S` already strongly co-activated with both (an existing edge to each
/// above that node's own local average) and, if found, bridges all three
/// through a fresh blank node.
fn generalization_edges(graph: &mut Graph, s: &[NodeId]) -> Result<(), MelvinError> {
    if s.len() < 3 {
        return Ok(());
    }
    let unique: Vec<NodeId> = {
        let mut seen = HashSet::new();
        s.iter().copied().filter(|id| seen.insert(*id)).collect()
    };

    let mut pairwise_sims = Vec::new();
    for i in 0..unique.len() {
        for j in (i + 1)..unique.len() {
            if let (Some(a), Some(b)) = (graph.get_node(unique[i]), graph.get_node(unique[j])) {
                if !a.payload.is_empty() && !b.payload.is_empty() {
                    pairwise_sims.push(measure::payload_similarity(&a.payload, &b.payload));
                }
            }
        }
    }
    let global_mean = measure::mean(&pairwise_sims);

    for i in 0..unique.len() {
        for j in (i + 1)..unique.len() {
            let (a, b) = (unique[i], unique[j]);
            let (a_node, b_node) = match (graph.get_node(a), graph.get_node(b)) {
                (Some(x), Some(y)) => (x.clone(), y.clone()),
                _ => continue,
            };
            if a_node.abstraction_level != b_node.abstraction_level {
                continue;
            }
            if a_node.payload.is_empty() || b_node.payload.is_empty() {
                continue;
            }
            let sim = measure::payload_similarity(&a_node.payload, &b_node.payload);
            if sim <= global_mean {
                continue;
            }
            if let Some(c) = find_shared_co_activated(graph, a, b, &unique) {
                let blank = graph.create_blank_node();
                graph.strengthen_or_create(blank, a, Direction::FromTo, sim)?;
                graph.strengthen_or_create(blank, b, Direction::FromTo, sim)?;
                graph.strengthen_or_create(blank, c, Direction::FromTo, sim)?;
            }
        }
    }
    Ok(())
}

fn find_shared_co_activated(graph: &Graph, a: NodeId, b: NodeId, pool: &[NodeId]) -> Option<NodeId> {
    for &c in pool {
        if c == a || c == b {
            continue;
        }
        let a_avg = measure::local_outgoing_avg(graph, a);
        let b_avg = measure::local_outgoing_avg(graph, b);
        let a_to_c = graph.find_edge(a, c).and_then(|e| graph.get_edge(e)).map(|e| e.weight);
        let b_to_c = graph.find_edge(b, c).and_then(|e| graph.get_edge(e)).map(|e| e.weight);
        if let (Some(wa), Some(wb)) = (a_to_c, b_to_c) {
            if wa > a_avg && wb > b_avg {
                return Some(c);
            }
        }
    }
    None
}

/// For any node touched this pass whose total edge count falls below the
/// mean of its neighbors' edge counts by more than an adaptive slack,
/// creates one weak (zero-activation) edge to the most similar node
/// reachable two hops away that is not already a direct neighbor. This is
/// the only edge-formation step allowed to create a zero-weight edge on
/// purpose — its job is topological, not reinforcement.
fn homeostatic_edges(graph: &mut Graph, s: &[NodeId]) -> Result<(), MelvinError> {
    let mut seen: HashSet<NodeId> = HashSet::new();
    for &node_id in s {
        if !seen.insert(node_id) {
            continue;
        }
        let node = match graph.get_node(node_id) {
            Some(n) => n.clone(),
            None => continue,
        };
        let mut neighbors: HashSet<NodeId> = HashSet::new();
        for &eid in node.outgoing.iter().chain(node.incoming.iter()) {
            if let Some(e) = graph.get_edge(eid) {
                neighbors.insert(if e.from == node_id { e.to } else { e.from });
            }
        }
        if neighbors.is_empty() {
            continue;
        }
        let neighbor_counts: Vec<f32> = neighbors
            .iter()
            .filter_map(|&n| graph.get_node(n))
            .map(|n| (n.outgoing.len() + n.incoming.len()) as f32)
            .collect();
        let mean_count = measure::mean(&neighbor_counts);
        let slack = adaptive_epsilon(&neighbor_counts);
        let own_count = (node.outgoing.len() + node.incoming.len()) as f32;
        if own_count >= mean_count - slack {
            continue;
        }

        let mut best: Option<(NodeId, f32)> = None;
        for &nb in &neighbors {
            if let Some(nb_node) = graph.get_node(nb) {
                for &eid in nb_node.outgoing.iter().chain(nb_node.incoming.iter()) {
                    if let Some(e) = graph.get_edge(eid) {
                        let candidate = if e.from == nb { e.to } else { e.from };
                        if candidate == node_id || neighbors.contains(&candidate) {
                            continue;
                        }
                        if let (Some(cn), true) = (graph.get_node(candidate), !node.payload.is_empty()) {
                            if cn.payload.is_empty() {
                                continue;
                            }
                            let sim = measure::payload_similarity(&node.payload, &cn.payload);
                            if best.as_ref().map(|(_, s)| sim > *s).unwrap_or(true) {
                                best = Some((candidate, sim));
                            }
                        }
                    }
                }
            }
        }
        if let Some((sibling, _)) = best {
            graph.strengthen_or_create(node_id, sibling, Direction::FromTo, 0.0)?;
        }
    }
    Ok(())
}

/// Runs all five edge creators over `S`, in the order specified.
pub fn form_edges(graph: &mut Graph, s: &[NodeId]) -> Result<(), MelvinError> {
    co_activation_edges(graph, s)?;
    context_edges(graph, s)?;
    similarity_edges(graph, s)?;
    generalization_edges(graph, s)?;
    homeostatic_edges(graph, s)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn co_activation_creates_edges_between_adjacent_nodes() {
        let mut g = Graph::new();
        let a = g.create_node(b"a".to_vec());
        let b = g.create_node(b"b".to_vec());
        let c = g.create_node(b"c".to_vec());
        form_edges(&mut g, &[a, b, c]).expect("form");
        assert!(g.find_edge(a, b).is_some());
        assert!(g.find_edge(b, c).is_some());
    }

    #[test]
    fn repeated_formation_never_duplicates_edges() {
        let mut g = Graph::new();
        let a = g.create_node(b"a".to_vec());
        let b = g.create_node(b"b".to_vec());
        form_edges(&mut g, &[a, b]).expect("first");
        form_edges(&mut g, &[a, b]).expect("second");
        assert_eq!(g.get_node(a).expect("a").outgoing.len(), 1);
    }

    #[test]
    fn homeostatic_step_does_not_panic_on_isolated_sequence() {
        let mut g = Graph::new();
        let a = g.create_node(b"a".to_vec());
        form_edges(&mut g, &[a]).expect("form single");
    }
}
