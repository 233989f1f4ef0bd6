//! # Bit-exact knowledge-file persistence (C10)
//!
//! Header (magic, version, last-modified, adaptation count) followed by a
//! length-prefixed node table and a length-prefixed edge table, in arena
//! order, little-endian throughout. Edges reference nodes by their position
//! in the node table. Grounded in the teacher's
//! `formats::persistence::PersistenceHeader` validate-before-parse idiom,
//! generalized from postcard-serialized bodies to this hand-rolled,
//! externally-specified layout.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::edge::{Direction, Edge};
use crate::error::MelvinError;
use crate::graph::Graph;
use crate::ids::{EdgeId, History, NodeId};
use crate::node::{Node, StableId};

const MAGIC: &[u8; 8] = b"MELVIN\0\0";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 8 + 4 + 8 + 8;

fn current_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn write_stable_id(out: &mut Vec<u8>, id: &StableId) {
    out.extend_from_slice(id);
    out.push(0);
}

fn read_stable_id(bytes: &[u8; 9]) -> StableId {
    let mut id = [0u8; 8];
    id.copy_from_slice(&bytes[..8]);
    id
}

/// Serializes `graph` into the bit-exact knowledge-file layout. Live nodes
/// are written in arena-iteration order (skipping tombstoned slots); their
/// positions in the node table become the indices edge records refer to.
#[must_use]
pub fn serialize(graph: &Graph) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&current_unix_seconds().to_le_bytes());
    out.extend_from_slice(&graph.adaptation_count().to_le_bytes());

    let mut remap: HashMap<NodeId, u64> = HashMap::new();
    let live_nodes: Vec<(NodeId, &Node)> = graph.iter_nodes().collect();
    out.extend_from_slice(&(live_nodes.len() as u64).to_le_bytes());
    for (new_index, &(old_id, node)) in live_nodes.iter().enumerate() {
        remap.insert(old_id, new_index as u64);
        write_stable_id(&mut out, &node.stable_id);
        out.extend_from_slice(&(node.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&node.abstraction_level.to_le_bytes());
        out.extend_from_slice(&node.weight.to_le_bytes());
        out.extend_from_slice(&node.bias.to_le_bytes());
        out.extend_from_slice(&node.outgoing_weight_sum.to_le_bytes());
        out.extend_from_slice(&node.incoming_weight_sum.to_le_bytes());
        out.extend_from_slice(&node.payload);
    }

    let live_edges: Vec<(EdgeId, &Edge)> = graph.iter_edges().collect();
    out.extend_from_slice(&(live_edges.len() as u64).to_le_bytes());
    for &(_, edge) in &live_edges {
        let from_index = *remap.get(&edge.from).unwrap_or(&0);
        let to_index = *remap.get(&edge.to).unwrap_or(&0);
        out.extend_from_slice(&from_index.to_le_bytes());
        out.extend_from_slice(&to_index.to_le_bytes());
        out.push(edge.direction.as_byte());
        out.extend_from_slice(&edge.weight.to_le_bytes());
    }

    out
}

fn take<'a>(bytes: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8], MelvinError> {
    if bytes.len() < *pos + n {
        return Err(MelvinError::format(*pos as u64, "unexpected end of file"));
    }
    let slice = &bytes[*pos..*pos + n];
    *pos += n;
    Ok(slice)
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> Result<u32, MelvinError> {
    let s = take(bytes, pos, 4)?;
    Ok(u32::from_le_bytes(s.try_into().map_err(|_| {
        MelvinError::format(*pos as u64, "malformed u32 field")
    })?))
}

fn read_u64(bytes: &[u8], pos: &mut usize) -> Result<u64, MelvinError> {
    let s = take(bytes, pos, 8)?;
    Ok(u64::from_le_bytes(s.try_into().map_err(|_| {
        MelvinError::format(*pos as u64, "malformed u64 field")
    })?))
}

fn read_f32(bytes: &[u8], pos: &mut usize) -> Result<f32, MelvinError> {
    let s = take(bytes, pos, 4)?;
    Ok(f32::from_le_bytes(s.try_into().map_err(|_| {
        MelvinError::format(*pos as u64, "malformed f32 field")
    })?))
}

/// Parses a knowledge file's bytes into a fresh `Graph`. A short read, a
/// magic mismatch, or a payload/length overrun fails with a `FormatError`
/// and leaves no partially-built graph behind (§7: "format errors abort
/// loading, in-memory graph stays empty").
pub fn deserialize(bytes: &[u8]) -> Result<Graph, MelvinError> {
    if bytes.len() < HEADER_LEN {
        return Err(MelvinError::format(0, "file shorter than header"));
    }
    let mut pos = 0usize;
    let magic = take(bytes, &mut pos, 8)?;
    if magic != MAGIC {
        return Err(MelvinError::format(0, "magic mismatch"));
    }
    let version = read_u32(bytes, &mut pos)?;
    if version != FORMAT_VERSION {
        return Err(MelvinError::format(pos as u64, format!("unsupported version {version}")));
    }
    let _last_modified = read_u64(bytes, &mut pos)?;
    let adaptation_count = read_u64(bytes, &mut pos)?;

    let node_count = read_u64(bytes, &mut pos)? as usize;
    let mut nodes: Vec<Option<Node>> = Vec::with_capacity(node_count);
    for _ in 0..node_count {
        let id_bytes = take(bytes, &mut pos, 9)?;
        let id_array: [u8; 9] = id_bytes
            .try_into()
            .map_err(|_| MelvinError::format(pos as u64, "malformed stable id"))?;
        let stable_id = read_stable_id(&id_array);
        let payload_size = read_u32(bytes, &mut pos)? as usize;
        let abstraction_level = read_u32(bytes, &mut pos)?;
        let weight = read_f32(bytes, &mut pos)?;
        let bias = read_f32(bytes, &mut pos)?;
        let outgoing_weight_sum = read_f32(bytes, &mut pos)?;
        let incoming_weight_sum = read_f32(bytes, &mut pos)?;
        let payload = take(bytes, &mut pos, payload_size)?.to_vec();
        nodes.push(Some(Node {
            stable_id,
            payload,
            abstraction_level,
            activation: 0.0,
            weight,
            bias,
            outgoing: Vec::new(),
            incoming: Vec::new(),
            outgoing_weight_sum,
            incoming_weight_sum,
            history: History::new(),
        }));
    }

    let edge_count = read_u64(bytes, &mut pos)? as usize;
    let mut edges: Vec<Option<Edge>> = Vec::with_capacity(edge_count);
    for i in 0..edge_count {
        let from_index = read_u64(bytes, &mut pos)? as usize;
        let to_index = read_u64(bytes, &mut pos)? as usize;
        let direction_byte = take(bytes, &mut pos, 1)?[0];
        let weight = read_f32(bytes, &mut pos)?;
        if from_index >= nodes.len() || to_index >= nodes.len() {
            return Err(MelvinError::format(pos as u64, "edge references unknown node index"));
        }
        let from = NodeId(from_index);
        let to = NodeId(to_index);
        let eid = EdgeId(i);
        if let Some(Some(n)) = nodes.get_mut(from_index) {
            n.outgoing.push(eid);
        }
        if let Some(Some(n)) = nodes.get_mut(to_index) {
            n.incoming.push(eid);
        }
        edges.push(Some(Edge {
            from,
            to,
            direction: Direction::from_byte(direction_byte),
            active: false,
            weight,
            history: History::new(),
        }));
    }

    Ok(Graph::from_arenas(nodes, edges, adaptation_count))
}

/// Loads a knowledge file from `path`. A missing file or a short/corrupt
/// read surfaces as a distinguishable `FileError`/`FormatError`.
pub fn load(path: &Path) -> Result<Graph, MelvinError> {
    let mut file = File::open(path).map_err(|e| MelvinError::file_io(path, e))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| MelvinError::file_io(path, e))?;
    deserialize(&bytes)
}

/// Saves `graph` to `path` via write-to-temp, fsync, rename, so a crash
/// mid-write leaves the previous file intact (§4.10, §7).
pub fn save(graph: &Graph, path: &Path) -> Result<(), MelvinError> {
    let bytes = serialize(graph);
    let tmp_path = temp_path_for(path);
    {
        let mut tmp = File::create(&tmp_path).map_err(|e| MelvinError::file_io(&tmp_path, e))?;
        tmp.write_all(&bytes)
            .map_err(|e| MelvinError::file_io(&tmp_path, e))?;
        tmp.sync_all().map_err(|e| MelvinError::file_io(&tmp_path, e))?;
    }
    fs::rename(&tmp_path, path).map_err(|e| MelvinError::file_io(path, e))?;
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Creates an empty knowledge file at `path` if one does not already exist,
/// so `Engine::create` and `Engine::open` can share one code path.
pub fn create_if_absent(path: &Path) -> Result<(), MelvinError> {
    match fs::metadata(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => save(&Graph::new(), path),
        Err(e) => Err(MelvinError::file_io(path, e)),
    }
}
