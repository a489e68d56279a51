//! Ordered k-way merge over stored filesets.
//!
//! [`merge`] groups the files of several path-sorted [`Reader`]s by path and
//! hands each group to a [`MergeFunc`]: either the content policy, which
//! writes the coalesced file through a [`Writer`], or the shard policy, which
//! cuts the merged key space into [`PathRange`]s. [`MergeReader`] exposes the
//! same merge as a readable view.

mod group;
mod reader;

use std::mem;

pub use self::reader::MergeReader;
pub(crate) use group::{Group, MergeStream};
use crate::{
    error::Result,
    fileset::{Reader, Writer},
    index::PathRange,
    observability::log_debug,
};

/// Callback receiving each shard produced by [`MergeFunc::Shard`].
pub type ShardCallback<'a> = Box<dyn FnMut(PathRange) -> Result<()> + Send + 'a>;

/// Accumulates merged sizes and emits a [`PathRange`] each time they reach
/// the threshold.
pub struct ShardFunc<'a> {
    threshold: u64,
    size: u64,
    lower: String,
    emit: ShardCallback<'a>,
}

impl<'a> ShardFunc<'a> {
    pub fn new(
        threshold: u64,
        emit: impl FnMut(PathRange) -> Result<()> + Send + 'a,
    ) -> Self {
        Self {
            threshold,
            size: 0,
            lower: String::new(),
            emit: Box::new(emit),
        }
    }

    fn apply(&mut self, size: u64, next: Option<&str>) -> Result<()> {
        self.size += size;
        match next {
            Some(next) if self.size >= self.threshold => {
                let range = PathRange {
                    lower: mem::replace(&mut self.lower, next.to_string()),
                    upper: Some(next.to_string()),
                };
                log_debug!(
                    component = "merge",
                    event = "shard_emitted",
                    range = %range,
                    size_bytes = self.size,
                );
                self.size = 0;
                (self.emit)(range)
            }
            _ => Ok(()),
        }
    }

    fn finish(&mut self) -> Result<()> {
        let range = PathRange {
            lower: mem::take(&mut self.lower),
            upper: None,
        };
        log_debug!(
            component = "merge",
            event = "shard_emitted",
            range = %range,
            size_bytes = self.size,
        );
        self.size = 0;
        (self.emit)(range)
    }
}

/// What [`merge`] does with each group of same-path files.
pub enum MergeFunc<'a> {
    /// Writes the coalesced file, copying every member's tags by reference.
    Content(&'a mut Writer),
    /// Computes shard boundaries without touching content.
    Shard(ShardFunc<'a>),
}

impl MergeFunc<'_> {
    async fn apply(&mut self, group: &Group, stream: &mut MergeStream) -> Result<()> {
        match self {
            MergeFunc::Content(writer) => {
                let size = group
                    .offsets
                    .iter()
                    .filter_map(|&offset| stream.reader(offset).header())
                    .map(|header| header.size)
                    .sum();
                writer.write_header(&group.path, size).await?;
                for &offset in &group.offsets {
                    let copy = stream.reader_mut(offset).read_copy_tags(None).await?;
                    writer.copy_tags(copy).await?;
                }
                Ok(())
            }
            MergeFunc::Shard(shard) => {
                let size = group
                    .offsets
                    .iter()
                    .filter_map(|&offset| stream.reader(offset).header())
                    .map(|header| header.data_op.size_bytes())
                    .sum();
                shard.apply(size, group.next.as_deref())
            }
        }
    }

    fn finish(&mut self) -> Result<()> {
        match self {
            MergeFunc::Content(_) => Ok(()),
            MergeFunc::Shard(shard) => shard.finish(),
        }
    }
}

/// Merges `readers` in path order, feeding every path group to `func`.
///
/// Files sharing a path are coalesced with their tags concatenated in reader
/// order. The first reader error aborts the merge.
pub async fn merge(readers: Vec<Reader>, func: &mut MergeFunc<'_>) -> Result<()> {
    let mut stream = MergeStream::from_vec(readers).await?;
    while let Some(group) = stream.next_group().await? {
        func.apply(&group, &mut stream).await?;
    }
    func.finish()?;
    stream.close()
}
