//! # Error taxonomy
//!
//! The four language-neutral error kinds the engine can raise, and nothing
//! else: file I/O, knowledge-file format, resource exhaustion while growing
//! a container, and internal invariant violations. Every public fallible
//! operation in this crate returns `Result<T, MelvinError>`.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors raised by the engine.
///
/// `FileError` and `FormatError` are expected to occur during normal
/// operation (a missing file, a foreign or truncated knowledge file) and
/// are meant to be handled by the caller. `ResourceError` aborts the
/// current pass cleanly. `InvariantError` indicates a bug: the engine
/// refuses to continue rather than silently corrupt the graph.
#[derive(Debug, thiserror::Error)]
pub enum MelvinError {
    /// Could not read, write, or rename the knowledge file.
    #[error("file error at {path}: {detail}")]
    FileError {
        path: PathBuf,
        detail: String,
        #[source]
        source: Option<io::Error>,
    },

    /// The knowledge file's bytes do not describe a valid graph.
    #[error("format error at byte {position}: {detail}")]
    FormatError { position: u64, detail: String },

    /// An allocation failed while growing an array or the payload-hash
    /// index. The in-progress pass is aborted; already-applied weight
    /// updates are left in place.
    #[error("resource error: {0}")]
    ResourceError(String),

    /// A structural operation would have violated a graph invariant.
    /// This is a bug, not a runtime condition.
    #[error("invariant violated: {0}")]
    InvariantError(String),
}

impl MelvinError {
    pub fn file(path: impl Into<PathBuf>, detail: impl fmt::Display) -> Self {
        MelvinError::FileError {
            path: path.into(),
            detail: detail.to_string(),
            source: None,
        }
    }

    pub fn file_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        MelvinError::FileError {
            path: path.into(),
            detail: source.to_string(),
            source: Some(source),
        }
    }

    pub fn format(position: u64, detail: impl fmt::Display) -> Self {
        MelvinError::FormatError {
            position,
            detail: detail.to_string(),
        }
    }

    pub fn resource(detail: impl fmt::Display) -> Self {
        MelvinError::ResourceError(detail.to_string())
    }

    pub fn invariant(detail: impl fmt::Display) -> Self {
        MelvinError::InvariantError(detail.to_string())
    }
}

/// Writes a single structured diagnostic line to stderr for a condition
/// that is swallowed rather than propagated (a skipped malformed frame, a
/// non-fatal I/O hiccup during a best-effort read). Mirrors the pseudo-JSON
/// convention the rest of the crate's non-fatal diagnostics use; this crate
/// carries no logging dependency.
pub(crate) fn log_warn(target: &str, message: impl fmt::Display) {
    eprintln!(
        "{{\"level\":\"warn\",\"target\":\"melvin_core::{target}\",\"message\":\"{message}\"}}"
    );
}
