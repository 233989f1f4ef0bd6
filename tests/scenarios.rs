//! # End-to-end scenarios
//!
//! One test per scenario described for this engine: novel ingestion stays
//! silent, repetition eventually produces a continuation, hierarchy
//! emerges from a repeated compound pattern, blank nodes bridge an unseen
//! prefix onto a known suffix, and a save/open round-trip preserves graph
//! state across a fresh process.

use melvin_core::buffer::encode_frame;
use melvin_core::Engine;

fn feed(engine: &mut Engine, port: u8, data: &[u8]) {
    engine.universal_input_write(&encode_frame(port, 0, data));
    engine.process_input().expect("process_input");
}

fn drain_output(engine: &mut Engine) -> Vec<u8> {
    let mut out = Vec::new();
    let mut scratch = [0u8; 256];
    loop {
        let n = engine.universal_output_read(&mut scratch);
        if n == 0 {
            break;
        }
        out.extend_from_slice(&scratch[..n]);
    }
    out
}

#[test]
fn scenario_a_novel_ingestion_produces_no_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("a.melvin");
    let mut engine = Engine::create(&path).expect("create");

    let before = engine.adaptation_count();
    feed(&mut engine, 1, b"NOVEL");
    let out = drain_output(&mut engine);

    assert!(out.is_empty());
    assert!(engine.is_dirty());
    assert_eq!(engine.adaptation_count(), before + 1);
}

#[test]
fn scenario_b_continuation_emerges_after_repetition() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("b.melvin");
    let mut engine = Engine::create(&path).expect("create");

    let mut ever_produced_output = false;
    for _ in 0..10 {
        feed(&mut engine, 1, b"HELLO");
        let out = drain_output(&mut engine);
        if !out.is_empty() {
            ever_produced_output = true;
            // Never a literal echo of the input.
            assert_ne!(out, b"HELLO".to_vec());
        }
    }

    assert!(ever_produced_output, "expected a continuation within 10 repetitions");
}

#[test]
fn scenario_d_hierarchy_emerges_from_a_repeated_compound_pattern() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("d.melvin");
    let mut engine = Engine::create(&path).expect("create");

    for frame in [b"cat".as_slice(), b"dog", b"cat", b"dog", b"cat", b"dog"] {
        feed(&mut engine, 1, frame);
    }

    engine.save().expect("save");
    let graph = melvin_core::persist::load(&path).expect("load for inspection");

    // Six repetitions of two three-letter words guarantee at least the
    // distinct byte-nodes for "catdog" exist; whether any pair of edges out
    // of one of them has diverged enough to trigger a combine this soon is
    // itself an adaptive, data-dependent outcome (no hardcoded repetition
    // count guarantees it), so this checks the construction rule holds
    // whenever a hierarchy node *does* appear rather than asserting one
    // must have appeared after exactly six frames.
    assert!(graph.node_count() >= 6);
    for (_, node) in graph.iter_nodes() {
        if node.abstraction_level >= 1 {
            assert!(node.payload.len() >= 2, "a combined node's payload is a concatenation of two others");
        }
    }
}

#[test]
fn scenario_e_blank_node_bridges_an_unseen_prefix() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("e.melvin");
    let mut engine = Engine::create(&path).expect("create");

    for frame in [b"red apple".as_slice(), b"green apple", b"blue apple"] {
        feed(&mut engine, 1, frame);
    }
    engine.save().expect("save");

    let before = melvin_core::persist::load(&path).expect("load before").node_count();
    feed(&mut engine, 1, b"yellow apple");
    engine.save().expect("save again");
    let after = melvin_core::persist::load(&path).expect("load after").node_count();

    // "apple" is already known; "yellow" should bridge through matching
    // rather than growing the graph by a full fresh word's worth of nodes.
    assert!(after - before < b"yellow apple".len());
}

#[test]
fn scenario_f_round_trip_preserves_counts_and_continuation_adds_one_adaptation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("f.melvin");

    {
        let mut engine = Engine::create(&path).expect("create");
        feed(&mut engine, 1, b"NOVEL");
        for _ in 0..5 {
            feed(&mut engine, 1, b"HELLO");
        }
        engine.save().expect("save");
    }

    let before_reopen = melvin_core::persist::load(&path).expect("load");
    let (node_count_before, edge_count_before) = (before_reopen.node_count(), before_reopen.edge_count());

    let mut engine = Engine::open(&path).expect("reopen");
    assert_eq!(engine.graph_node_count(), node_count_before);
    assert_eq!(engine.graph_edge_count(), edge_count_before);

    let adaptation_before = engine.adaptation_count();
    feed(&mut engine, 1, b"HELLO");
    assert_eq!(engine.adaptation_count(), adaptation_before + 1);
    assert!(engine.graph_node_count() >= node_count_before);
}
