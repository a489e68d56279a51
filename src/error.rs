//! Error and Result types for fileset storage.

use std::io;

use thiserror::Error;

/// A convenience `Result` type for fileset operations.
pub type Result<T> = std::result::Result<T, FilesetError>;

/// The error type shared by every fileset component.
///
/// End-of-stream is never reported through this type: exhausted readers
/// return `Ok(None)` (or `Ok(0)` for content reads).
#[derive(Debug, Error)]
pub enum FilesetError {
    /// A writer received a header whose path does not sort after the previous one.
    #[error("headers out of order: {next:?} written after {previous:?}")]
    OutOfOrder {
        /// Path of the previously written header.
        previous: String,
        /// Path that violated the ordering.
        next: String,
    },

    /// The bytes written for a file do not match the size declared in its header.
    #[error("size mismatch for {path:?}: declared {declared} bytes, wrote {written}")]
    SizeMismatch {
        /// File path.
        path: String,
        /// Size declared in the header.
        declared: u64,
        /// Bytes actually written.
        written: u64,
    },

    /// Content or tag operations were issued before any header.
    #[error("no file header is open")]
    NoHeader,

    /// Content was written before a tag was started for the current file.
    #[error("no tag is open for the current file")]
    NoTag,

    /// The named object does not exist in the object store.
    #[error("object not found: {0}")]
    NotFound(String),

    /// A stored record failed structural validation.
    #[error("corrupt record: {0}")]
    Corrupt(&'static str),

    /// A stored record decoded but its contents are inconsistent.
    #[error("malformed record: {0}")]
    Malformed(String),

    /// An object or fileset name cannot be mapped onto the backend.
    #[error("invalid object name: {0}")]
    InvalidName(String),

    /// A compacted level object does not carry a numeric level name.
    #[error("invalid compaction level name: {0}")]
    InvalidLevel(String),

    /// Underlying I/O error.
    #[error("fileset io error: {0}")]
    Io(#[from] io::Error),

    /// Error surfaced by a fusio backend.
    #[error("fileset fusio error: {0}")]
    Fusio(#[from] fusio::Error),

    /// The operation scope was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}
