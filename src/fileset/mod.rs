//! Serialized filesets: ordered files with tagged content.
//!
//! A fileset is one index object plus the chunks its headers reference. The
//! [`Writer`] produces both, the [`Reader`] walks them back, and the
//! [`FileSet`] builder accepts unordered puts and spills sorted parts.

mod builder;
mod reader;
mod writer;

pub use self::{builder::FileSet, reader::Reader, writer::Writer};
use crate::{chunk::ContentCopy, index::Tag};

/// Suffix of the object holding a fileset's unmerged writes.
pub const DIFF: &str = "diff";
/// Suffix under which a fileset's compaction levels live.
pub const COMPACTED: &str = "compacted";

/// Tags of one file together with a by-reference copy of their bytes.
///
/// Produced by [`Reader::read_copy_tags`] and consumed by
/// [`Writer::copy_tags`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyTags {
    /// Path of the file the tags were copied from.
    pub path: String,
    pub tags: Vec<Tag>,
    pub content: ContentCopy,
}

impl CopyTags {
    /// Bytes covered by the copied tags.
    pub fn size(&self) -> u64 {
        self.tags.iter().map(|tag| tag.size).sum()
    }
}
