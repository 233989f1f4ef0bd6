//! # melvin-core
//!
//! Adaptive associative-memory graph engine: ingests byte-stream input into
//! a self-growing directed weighted graph, forms edges between co-activated
//! and similar nodes, propagates activation outward in waves, and emits
//! learned continuations — never an echo of the input — when the graph is
//! ready to. Every decision threshold the engine uses is derived from
//! locally observed statistics (`stats`); none are hardcoded.
//!
//! ## Architectural constraints
//!
//! - Single-writer per knowledge file: one logical pass (ingest → form
//!   edges → propagate → collect output) is serialized with respect to the
//!   graph. `Engine::process_input` is the only mutation entry point.
//! - No async, no network dependency: file I/O may block, computation
//!   performs no I/O in the hot path.
//! - No hardcoded numeric thresholds: anything that looks like a constant
//!   elsewhere in this crate is a value computed from an observed
//!   distribution in `stats`, reducing to a neutral default when that
//!   distribution is empty or degenerate.

// =============================================================================
// MODULES
// =============================================================================

pub mod activation;
pub mod association;
pub mod buffer;
pub mod edge;
pub mod engine;
pub mod error;
pub mod graph;
pub mod ids;
pub mod ingest;
pub mod measure;
pub mod node;
pub mod output;
pub mod persist;
pub mod propagate;
pub mod stats;

// =============================================================================
// RE-EXPORTS: Core types
// =============================================================================

pub use edge::{Direction, Edge};
pub use error::MelvinError;
pub use graph::Graph;
pub use ids::{EdgeId, History, NodeId};
pub use node::{Node, StableId};

// =============================================================================
// RE-EXPORTS: Engine facade and buffers
// =============================================================================

pub use buffer::{InputBuffer, InputFrame, OutputBuffer};
pub use engine::Engine;

// =============================================================================
// RE-EXPORTS: Pipeline stages
// =============================================================================

pub use association::form_edges;
pub use ingest::ingest_sequence;
pub use output::{collect_output, output_readiness};
pub use propagate::propagate;
