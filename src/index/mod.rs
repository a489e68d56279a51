//! Index records for filesets.
//!
//! An index is an ordered, path-sorted sequence of [`Header`]s stored as one
//! object, followed by a summary footer. The content each header points at
//! lives in chunk storage.

mod codec;
mod reader;
mod writer;

use std::fmt;

pub use self::{
    reader::{top_level, IndexReader},
    writer::IndexWriter,
};
pub(crate) use codec::{decode_framing, encode_framing};
use crate::{
    chunk::DataRef,
    error::{FilesetError, Result},
};

/// Identifier of the reserved first tag covering a file's framing record.
pub const HEADER_TAG: &str = "";

/// A named sub-range of a file's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: String,
    pub size: u64,
}

impl Tag {
    pub fn new(id: impl Into<String>, size: u64) -> Self {
        Tag {
            id: id.into(),
            size,
        }
    }
}

/// Chunk references covering a file's stored bytes plus its tags.
///
/// The first tag is always [`HEADER_TAG`] and covers the framing record; the
/// remaining tags partition the file content in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataOp {
    pub data_refs: Vec<DataRef>,
    pub tags: Vec<Tag>,
}

impl DataOp {
    /// Stored bytes, framing record included.
    pub fn size_bytes(&self) -> u64 {
        self.tags.iter().map(|tag| tag.size).sum()
    }

    /// Tags visible to readers (the header tag excluded).
    pub fn content_tags(&self) -> &[Tag] {
        self.tags.get(1..).unwrap_or(&[])
    }
}

/// Per-file index record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub path: String,
    /// Content size: the sum of the content tags.
    pub size: u64,
    pub data_op: DataOp,
}

impl Header {
    /// Content tags of this file.
    pub fn tags(&self) -> &[Tag] {
        self.data_op.content_tags()
    }

    /// Checks that tags and data references agree with the declared sizes.
    pub(crate) fn validate(&self) -> Result<()> {
        let malformed =
            |reason: &str| FilesetError::Malformed(format!("{}: {reason}", self.path));
        match self.data_op.tags.first() {
            Some(tag) if tag.id == HEADER_TAG => {}
            _ => return Err(malformed("missing header tag")),
        }
        let content: u64 = self.tags().iter().map(|tag| tag.size).sum();
        if content != self.size {
            return Err(malformed("tag sizes do not sum to the file size"));
        }
        let stored: u64 = self.data_op.data_refs.iter().map(|r| r.size).sum();
        if stored != self.data_op.size_bytes() {
            return Err(malformed("data references do not cover the tags"));
        }
        Ok(())
    }
}

/// Top-level summary of an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSummary {
    /// Stored bytes of every file, framing records included.
    pub size_bytes: u64,
    pub num_files: u64,
}

/// A half-open range of paths `[lower, upper)`.
///
/// An empty `lower` starts at the first path; a missing `upper` is unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathRange {
    pub lower: String,
    pub upper: Option<String>,
}

impl PathRange {
    pub fn contains(&self, path: &str) -> bool {
        path >= self.lower.as_str() && self.upper.as_deref().map_or(true, |upper| path < upper)
    }
}

impl fmt::Display for PathRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.upper {
            Some(upper) => write!(f, "[{:?}, {:?})", self.lower, upper),
            None => write!(f, "[{:?}, ..)", self.lower),
        }
    }
}

/// Returns true when `id` sorts strictly before `bound`, or when there is no bound.
pub fn before_bound(id: &str, bound: Option<&str>) -> bool {
    bound.map_or(true, |bound| id < bound)
}

#[cfg(test)]
mod tests {
    use super::{before_bound, DataOp, Header, PathRange, Tag, HEADER_TAG};

    #[test]
    fn bounds_are_exclusive() {
        assert!(before_bound("a", None));
        assert!(before_bound("a", Some("b")));
        assert!(!before_bound("b", Some("b")));
        assert!(!before_bound("c", Some("b")));
    }

    #[test]
    fn path_ranges_are_half_open() {
        let range = PathRange {
            lower: "/b".into(),
            upper: Some("/d".into()),
        };
        assert!(!range.contains("/a"));
        assert!(range.contains("/b"));
        assert!(range.contains("/c/x"));
        assert!(!range.contains("/d"));
        assert!(PathRange::default().contains(""));
        assert_eq!(range.to_string(), "[\"/b\", \"/d\")");
    }

    #[test]
    fn header_tag_is_hidden() {
        let header = Header {
            path: "/f".into(),
            size: 3,
            data_op: DataOp {
                data_refs: Vec::new(),
                tags: vec![Tag::new(HEADER_TAG, 10), Tag::new("t1", 3)],
            },
        };
        assert_eq!(header.tags(), &[Tag::new("t1", 3)]);
        assert_eq!(header.data_op.size_bytes(), 13);
        // no data references cover the 13 tagged bytes
        assert!(header.validate().is_err());
    }
}
