//! Content-addressed chunk storage.
//!
//! Chunks are immutable byte ranges named by the SHA-256 of their content and
//! stored as `chunk/<hex id>` objects. Files never own chunks: they reference
//! sub-ranges of them through [`DataRef`]s, which is what lets a compaction
//! relocate untouched bytes by reference.

mod reader;
mod writer;

use std::{fmt, sync::Arc};

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

pub use self::{reader::ChunkReader, writer::ChunkWriter};
use crate::fs::ObjectClient;

/// Prefix under which chunk objects are stored.
pub const CHUNK_PREFIX: &str = "chunk";

/// Identifier of a chunk: the SHA-256 of its bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId([u8; 32]);

impl ChunkId {
    pub fn of(data: &[u8]) -> Self {
        ChunkId(Sha256::digest(data).into())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        ChunkId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Object name holding this chunk.
    pub fn object_name(&self) -> String {
        format!("{CHUNK_PREFIX}/{self}")
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({})", &hex::encode(self.0)[..12])
    }
}

/// A contiguous byte range inside one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRef {
    pub chunk: ChunkId,
    /// Total size of the referenced chunk.
    pub chunk_size: u64,
    pub offset: u64,
    pub size: u64,
}

impl DataRef {
    /// The sub-range `[start, start + len)` of this reference.
    pub(crate) fn slice(&self, start: u64, len: u64) -> DataRef {
        debug_assert!(start + len <= self.size);
        DataRef {
            chunk: self.chunk,
            chunk_size: self.chunk_size,
            offset: self.offset + start,
            size: len,
        }
    }
}

/// Already-stored bytes handed from a [`ChunkReader`] to a [`ChunkWriter`]
/// without being read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentCopy {
    pub data_refs: Vec<DataRef>,
}

impl ContentCopy {
    /// Number of bytes covered by the copy.
    pub fn size(&self) -> u64 {
        self.data_refs.iter().map(|data_ref| data_ref.size).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

/// Entry point for chunk readers and writers over an object client.
#[derive(Clone)]
pub struct ChunkStorage {
    objects: Arc<dyn ObjectClient>,
    chunk_size: usize,
}

impl ChunkStorage {
    pub fn new(objects: Arc<dyn ObjectClient>, chunk_size: usize) -> Self {
        Self {
            objects,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn new_reader(&self, cancel: CancellationToken) -> ChunkReader {
        ChunkReader::new(self.objects.clone(), cancel)
    }

    pub fn new_writer(&self, cancel: CancellationToken) -> ChunkWriter {
        ChunkWriter::new(self.objects.clone(), self.chunk_size, cancel)
    }
}
