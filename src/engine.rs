//! # Engine facade (C11)
//!
//! Grounded in the teacher's `Session`/`StorageBackend` split — one owning
//! façade over a storage backend plus a volatile buffer — generalized to
//! own one [`Graph`] plus the two universal byte buffers (§3) and to drive
//! the full ingestion → edge formation → propagation → output pipeline per
//! frame under the single-writer rule (§5), rather than exposing graph
//! primitives directly to callers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::association;
use crate::buffer::{InputBuffer, OutputBuffer};
use crate::error::{log_warn, MelvinError};
use crate::graph::Graph;
use crate::ingest;
use crate::output;
use crate::persist;
use crate::propagate;

/// Owns one knowledge-file-backed graph and the per-session universal
/// buffers. All graph mutation happens inside `process_input`, which is the
/// only place the single-writer rule of §5 needs to be enforced — callers
/// are expected not to call it concurrently from multiple threads against
/// the same `Engine`.
pub struct Engine {
    path: PathBuf,
    graph: Graph,
    input: InputBuffer,
    output: OutputBuffer,
    routing_table: HashMap<u8, u8>,
    malformed_frames: u64,
}

impl Engine {
    /// Creates a fresh knowledge file at `path` (or adopts an empty graph if
    /// one already exists there) and opens it.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, MelvinError> {
        let path = path.into();
        persist::create_if_absent(&path)?;
        Self::open(path)
    }

    /// Opens an existing knowledge file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, MelvinError> {
        let path = path.into();
        let graph = persist::load(&path)?;
        Ok(Engine {
            path,
            graph,
            input: InputBuffer::new(),
            output: OutputBuffer::new(),
            routing_table: HashMap::new(),
            malformed_frames: 0,
        })
    }

    /// Registers that frames arriving on `input_port` should have their
    /// output addressed to `output_port`. Ports with no explicit route
    /// output to the same port id they arrived on.
    pub fn route(&mut self, input_port: u8, output_port: u8) {
        self.routing_table.insert(input_port, output_port);
    }

    fn routed_port(&self, input_port: u8) -> u8 {
        *self.routing_table.get(&input_port).unwrap_or(&input_port)
    }

    /// Appends raw frame bytes (port_id | timestamp | data_size | data) to
    /// the input buffer for the next `process_input` call.
    pub fn universal_input_write(&mut self, bytes: &[u8]) {
        self.input.write(bytes);
    }

    /// Drains up to `into_buf.len()` bytes of accumulated output, returning
    /// how many bytes were written.
    pub fn universal_output_read(&mut self, into_buf: &mut [u8]) -> usize {
        self.output.read(into_buf)
    }

    #[must_use]
    pub fn adaptation_count(&self) -> u64 {
        self.graph.adaptation_count()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.graph.is_dirty()
    }

    #[must_use]
    pub fn malformed_frame_count(&self) -> u64 {
        self.malformed_frames
    }

    #[must_use]
    pub fn graph_node_count(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn graph_edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Persists the graph to its knowledge file and clears the dirty flag.
    pub fn save(&mut self) -> Result<(), MelvinError> {
        persist::save(&self.graph, &self.path)?;
        self.graph.clear_dirty();
        Ok(())
    }

    /// Saves if dirty, matching "save on explicit request or graceful
    /// shutdown" (§4.10).
    pub fn close(mut self) -> Result<(), MelvinError> {
        if self.graph.is_dirty() {
            self.save()?;
        }
        Ok(())
    }

    /// Drains every complete frame currently buffered and runs the full
    /// C6→C7→C8→C9 pipeline on each. A malformed frame is skipped and
    /// counted rather than propagated (§7).
    pub fn process_input(&mut self) -> Result<(), MelvinError> {
        loop {
            let frame = match self.input.pop_frame() {
                Ok(Some(f)) => f,
                Ok(None) => break,
                Err(e) => {
                    self.malformed_frames += 1;
                    log_warn("engine", format!("skipping malformed input frame: {e}"));
                    break;
                }
            };

            let sequence = ingest::ingest_sequence(&mut self.graph, &frame.data)?;
            if sequence.is_empty() {
                self.graph.bump_adaptation_count();
                continue;
            }
            association::form_edges(&mut self.graph, &sequence)?;
            propagate::propagate(&mut self.graph, &sequence)?;
            let out_bytes = output::collect_output(&self.graph, &sequence)?;
            self.graph.bump_adaptation_count();

            if !out_bytes.is_empty() {
                let out_port = self.routed_port(frame.port_id);
                self.output
                    .push(&crate::buffer::encode_frame(out_port, frame.timestamp, &out_bytes));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
