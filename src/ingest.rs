//! # Sequential pattern ingestion (C6)
//!
//! Consumes one frame's bytes (already stripped of its 13-byte header) and
//! produces `S`, the per-pass sequence of nodes activated in consumption
//! order. Tries, at each position, the longest adaptively-bounded pattern
//! first: an exact match already reachable from recent context (fast
//! path), a match found by bounded breadth-first exploration (wave
//! exploration), or a blank-node bridge whose connection-based match
//! strength exceeds its own neighborhood baseline. Only when nothing
//! matches at any length does it fall back to creating a brand-new
//! single-byte node.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::activation::match_strength;
use crate::edge::Direction;
use crate::error::MelvinError;
use crate::graph::Graph;
use crate::ids::NodeId;
use crate::measure;
use crate::stats::{adaptive_epsilon, adaptive_exploration_steps};

/// The adaptively-bounded maximum pattern length to try at the current
/// position: the largest concrete-node payload length observed in the
/// graph so far (so it grows only once a node that long actually exists),
/// clamped to at least 1 and to the bytes actually remaining.
fn current_max_pattern_length(graph: &Graph, remaining: usize) -> usize {
    let longest = graph
        .iter_nodes()
        .map(|(_, n)| n.payload.len())
        .max()
        .unwrap_or(1)
        .max(1);
    longest.min(remaining.max(1))
}

fn candidate_rank(graph: &Graph, node_id: NodeId, s: &[NodeId]) -> (u32, f32, usize) {
    let node = graph.get_node(node_id);
    let abstraction = node.map(|n| n.abstraction_level).unwrap_or(0);
    let weight = node.map(|n| n.weight).unwrap_or(0.0);
    let recency = s.iter().rposition(|&id| id == node_id).unwrap_or(0);
    (abstraction, weight, recency)
}

fn better_candidate(graph: &Graph, a: NodeId, b: NodeId, s: &[NodeId]) -> Ordering {
    let (a_abs, a_w, a_rec) = candidate_rank(graph, a, s);
    let (b_abs, b_w, b_rec) = candidate_rank(graph, b, s);
    a_abs
        .cmp(&b_abs)
        .then_with(|| a_w.partial_cmp(&b_w).unwrap_or(Ordering::Equal))
        .then_with(|| a_rec.cmp(&b_rec))
}

/// Nodes directly eligible for the fast path: everything already in `S`,
/// plus nodes directly reachable by an outgoing edge from the most
/// recently activated node.
fn fast_path_candidates(graph: &Graph, s: &[NodeId]) -> Vec<NodeId> {
    let mut candidates: Vec<NodeId> = s.to_vec();
    if let Some(&last) = s.last() {
        if let Some(node) = graph.get_node(last) {
            for &eid in &node.outgoing {
                if let Some(e) = graph.get_edge(eid) {
                    candidates.push(e.to);
                }
            }
        }
    }
    candidates
}

fn find_fast_path_match(graph: &Graph, s: &[NodeId], target: &[u8]) -> Option<NodeId> {
    let mut best: Option<NodeId> = None;
    for nid in fast_path_candidates(graph, s) {
        if let Some(n) = graph.get_node(nid) {
            if n.payload == target {
                best = Some(match best {
                    None => nid,
                    Some(cur) => {
                        if better_candidate(graph, nid, cur, s) == Ordering::Greater {
                            nid
                        } else {
                            cur
                        }
                    }
                });
            }
        }
    }
    best
}

/// Bounded breadth-first search from the most recent node in `S`, by
/// outgoing edge direction, returning the first payload-equal match.
fn wave_exploration_match(graph: &Graph, s: &[NodeId], target: &[u8], max_depth: usize) -> Option<NodeId> {
    let start = *s.last()?;
    let mut visited: HashSet<NodeId> = HashSet::new();
    visited.insert(start);
    let mut frontier = vec![start];
    for _ in 0..max_depth {
        if frontier.is_empty() {
            break;
        }
        let mut next = Vec::new();
        for nid in frontier {
            let node = match graph.get_node(nid) {
                Some(n) => n,
                None => continue,
            };
            for &eid in &node.outgoing {
                let e = match graph.get_edge(eid) {
                    Some(e) => e,
                    None => continue,
                };
                if !visited.insert(e.to) {
                    continue;
                }
                if let Some(tn) = graph.get_node(e.to) {
                    if tn.payload == target {
                        return Some(e.to);
                    }
                }
                next.push(e.to);
            }
        }
        frontier = next;
    }
    None
}

/// The mean pairwise payload similarity among a blank node's non-blank
/// neighbors — the "local connection mean" a candidate byte string's
/// match strength must exceed for the blank to accept it (relative, not
/// absolute, per §4.6d).
fn blank_local_connection_mean(graph: &Graph, blank_id: NodeId) -> f32 {
    let node = match graph.get_node(blank_id) {
        Some(n) => n,
        None => return 0.0,
    };
    let mut payloads: Vec<Vec<u8>> = Vec::new();
    for &eid in node.outgoing.iter().chain(node.incoming.iter()) {
        if let Some(e) = graph.get_edge(eid) {
            let other = if e.from == blank_id { e.to } else { e.from };
            if let Some(n) = graph.get_node(other) {
                if !n.payload.is_empty() {
                    payloads.push(n.payload.clone());
                }
            }
        }
    }
    if payloads.len() < 2 {
        return 0.0;
    }
    let mut sims = Vec::new();
    for i in 0..payloads.len() {
        for j in (i + 1)..payloads.len() {
            sims.push(measure::payload_similarity(&payloads[i], &payloads[j]));
        }
    }
    measure::mean(&sims)
}

fn find_blank_match(graph: &Graph, target: &[u8]) -> Option<(NodeId, f32, f32)> {
    let mut best: Option<(NodeId, f32, f32)> = None;
    for blank_id in graph.blank_node_ids() {
        let strength = match_strength(graph, blank_id, target);
        let baseline = blank_local_connection_mean(graph, blank_id);
        if strength > baseline && strength > 0.0 {
            let is_better = match &best {
                None => true,
                Some((_, s, _)) => strength > *s,
            };
            if is_better {
                best = Some((blank_id, strength, baseline));
            }
        }
    }
    best
}

/// Discards entries from the front of `s` whose weight falls far below the
/// local average of the sequence's own weights — "far" meaning more than
/// one `adaptive_epsilon`-derived stability margin below the mean, which
/// degenerates to "never discard" on a sparse or uniform sequence.
fn trim_sequence(graph: &Graph, s: &mut Vec<NodeId>) {
    if s.len() < 2 {
        return;
    }
    let weights: Vec<f32> = s
        .iter()
        .filter_map(|&id| graph.get_node(id).map(|n| n.weight))
        .collect();
    if weights.is_empty() {
        return;
    }
    let avg = measure::mean(&weights);
    let margin = adaptive_epsilon(&weights);
    let floor = avg - margin;
    let last = s.last().copied();
    s.retain(|&id| graph.get_node(id).map(|n| n.weight).unwrap_or(0.0) >= floor);
    if s.is_empty() {
        // never fully discard the working context; keep the most recent.
        if let Some(last) = last {
            s.push(last);
        }
    }
}

fn activate_and_weight(graph: &mut Graph, node_id: NodeId) {
    let local_avg = measure::local_outgoing_avg(graph, node_id);
    let weights = measure::outgoing_edge_weights(graph, node_id);
    let epsilon = adaptive_epsilon(&weights);
    if let Some(node) = graph.get_node_mut(node_id) {
        node.activation = 1.0;
        node.apply_weight_update(local_avg, epsilon);
    }
}

/// Optionally bridges a freshly-created single-byte node to a similar
/// existing pattern reachable from the previous context, via a new blank
/// node, when connection similarity finds one.
fn maybe_bridge_new_node(graph: &mut Graph, s: &[NodeId], new_node: NodeId) -> Result<(), MelvinError> {
    let prev = match s.iter().rev().find(|&&id| id != new_node) {
        Some(&id) => id,
        None => return Ok(()),
    };
    let new_payload = match graph.get_node(new_node) {
        Some(n) => n.payload.clone(),
        None => return Ok(()),
    };
    let prev_node = match graph.get_node(prev) {
        Some(n) => n.clone(),
        None => return Ok(()),
    };
    let mut best: Option<(NodeId, f32)> = None;
    for &eid in &prev_node.outgoing {
        if let Some(e) = graph.get_edge(eid) {
            if let Some(n) = graph.get_node(e.to) {
                if n.payload.is_empty() || e.to == new_node {
                    continue;
                }
                let sim = measure::payload_similarity(&n.payload, &new_payload);
                if sim > 0.0 && best.as_ref().map(|(_, s)| sim > *s).unwrap_or(true) {
                    best = Some((e.to, sim));
                }
            }
        }
    }
    if let Some((similar, _)) = best {
        let bridge = graph.create_blank_node();
        graph.strengthen_or_create(prev, bridge, Direction::FromTo, 1.0)?;
        graph.strengthen_or_create(bridge, new_node, Direction::FromTo, 1.0)?;
        graph.strengthen_or_create(bridge, similar, Direction::FromTo, 1.0)?;
    }
    Ok(())
}

/// Ingests `bytes` (a frame's data, header already stripped), mutating
/// `graph` by activating or creating nodes, and returns `S` in consumption
/// order.
pub fn ingest_sequence(graph: &mut Graph, bytes: &[u8]) -> Result<Vec<NodeId>, MelvinError> {
    let mut s: Vec<NodeId> = Vec::new();
    let mut pos = 0usize;

    while pos < bytes.len() {
        let remaining = bytes.len() - pos;
        let max_len = current_max_pattern_length(graph, remaining);
        let l = remaining.min(max_len).max(1);

        let mut consumed: Option<usize> = None;

        for k in (1..=l).rev() {
            let target = &bytes[pos..pos + k];

            if let Some(nid) = find_fast_path_match(graph, &s, target) {
                activate_and_weight(graph, nid);
                s.push(nid);
                consumed = Some(k);
                break;
            }

            let depth = adaptive_exploration_steps(graph.node_count());
            if depth > 0 {
                if let Some(nid) = wave_exploration_match(graph, &s, target, depth) {
                    activate_and_weight(graph, nid);
                    s.push(nid);
                    consumed = Some(k);
                    break;
                }
            }

            if let Some((blank_id, strength, baseline)) = find_blank_match(graph, target) {
                // relative strength dominates its neighborhood: promote to concrete.
                let dominates = (strength - baseline) > baseline;
                if dominates {
                    graph.promote_blank(blank_id, target.to_vec())?;
                }
                activate_and_weight(graph, blank_id);
                s.push(blank_id);
                consumed = Some(k);
                break;
            }
        }

        match consumed {
            Some(k) => pos += k,
            None => {
                let byte_payload = bytes[pos..pos + 1].to_vec();
                let new_node = graph.create_node(byte_payload);
                activate_and_weight(graph, new_node);
                maybe_bridge_new_node(graph, &s, new_node)?;
                s.push(new_node);
                pos += 1;
            }
        }

        trim_sequence(graph, &mut s);
    }

    Ok(s)
}
