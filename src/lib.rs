//! Chunked, content-addressed file collections with leveled compaction.
//!
//! A *fileset* is an ordered, immutable collection of files. Each file carries
//! its content plus named byte ranges called tags. Content is stored as
//! content-addressed chunks; each fileset is one index object listing, per
//! file, the chunk ranges covering it. Filesets are merged by path, split into
//! path-range shards, and compacted into exponentially sized levels, with
//! unchanged tag ranges relocated by reference rather than rewritten.
//!
//! [`Storage`] is the entry point:
//!
//! - [`Storage::new_writer`] / [`Storage::new_reader`] write and read one fileset.
//! - [`Storage::new_fileset`] buffers unordered puts and spills sorted parts.
//! - [`Storage::new_merge_reader`] reads the merge of several filesets.
//! - [`Storage::shard`] cuts a merge into [`PathRange`]s.
//! - [`Storage::compact_spec`] plans a compaction; [`Storage::execute`] runs it.
//! - [`Storage::compact`] merges any filesets into one output.

/// Content-addressed chunk storage.
pub mod chunk;

/// Leveled compaction planning.
pub mod compaction;

/// Error and Result types.
pub mod error;

/// Fileset readers, writers and the in-memory builder.
pub mod fileset;

/// Object client contract and backends.
pub mod fs;

/// Index records and the index object format.
pub mod index;

mod observability;

/// Storage configuration.
pub mod option;

mod storage;

/// K-way merge over filesets.
pub mod stream;

pub use crate::{
    compaction::CompactSpec,
    error::{FilesetError, Result},
    fileset::{CopyTags, FileSet, Reader, Writer},
    fs::{FusioObjectClient, MemoryObjectClient, ObjectClient, ObjectWriter},
    index::{Header, IndexSummary, PathRange, Tag},
    option::StorageOptions,
    storage::Storage,
    stream::{MergeFunc, MergeReader, ShardFunc},
};
