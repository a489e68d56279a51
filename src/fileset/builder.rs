use std::collections::BTreeMap;

use ulid::Ulid;

use super::Writer;
use crate::{
    error::Result,
    index::IndexSummary,
    observability::{log_debug, log_warn},
    storage::Storage,
    stream::{merge, MergeFunc},
};

/// Directory, relative to the storage prefix, holding spilled parts.
const SCRATCH: &str = "scratch";

/// Bytes appended to one tag of a buffered file.
#[derive(Debug)]
struct TaggedData {
    id: String,
    data: Vec<u8>,
}

/// In-memory fileset builder.
///
/// Files may be put in any order and appended to repeatedly; they are kept
/// sorted by path. Once the buffered content reaches the memory threshold the
/// buffer is written out as a sorted part. [`FileSet::close`] merges every
/// part into the target fileset by reference and removes the parts.
pub struct FileSet {
    storage: Storage,
    name: String,
    memory_threshold: usize,
    files: BTreeMap<String, Vec<TaggedData>>,
    buffered: usize,
    scratch: String,
    parts: Vec<String>,
}

impl FileSet {
    pub(crate) fn new(storage: Storage, name: String, memory_threshold: usize) -> Self {
        let scratch = storage.apply_prefix(&format!("{SCRATCH}/{}", Ulid::new()));
        Self {
            storage,
            name,
            memory_threshold,
            files: BTreeMap::new(),
            buffered: 0,
            scratch,
            parts: Vec::new(),
        }
    }

    /// Object name the fileset is written to on close.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends `data` to `path` under tag `tag`.
    ///
    /// Consecutive puts with the same tag extend that tag.
    pub async fn put(&mut self, path: &str, tag: &str, data: &[u8]) -> Result<()> {
        let tags = self.files.entry(path.to_string()).or_default();
        match tags.last_mut() {
            Some(last) if last.id == tag => last.data.extend_from_slice(data),
            _ => tags.push(TaggedData {
                id: tag.to_string(),
                data: data.to_vec(),
            }),
        }
        self.buffered += data.len();
        if self.buffered >= self.memory_threshold {
            self.spill().await?;
        }
        Ok(())
    }

    /// Writes the fileset and returns its summary.
    pub async fn close(mut self) -> Result<IndexSummary> {
        if self.parts.is_empty() {
            let mut writer = self.storage.writer_at(self.name.clone());
            write_files(&mut writer, &self.files).await?;
            return writer.close().await;
        }
        if !self.files.is_empty() {
            self.spill().await?;
        }
        let result = self.merge_parts().await;
        for part in &self.parts {
            if let Err(err) = self.storage.objects().delete(part).await {
                log_warn!(
                    component = "fileset",
                    event = "part_delete_failed",
                    part = %part,
                    error = %err,
                );
            }
        }
        result
    }

    async fn merge_parts(&self) -> Result<IndexSummary> {
        let readers = self
            .parts
            .iter()
            .map(|part| self.storage.reader_at(part.clone()))
            .collect();
        let mut writer = self.storage.writer_at(self.name.clone());
        merge(readers, &mut MergeFunc::Content(&mut writer)).await?;
        writer.close().await
    }

    async fn spill(&mut self) -> Result<()> {
        let part = format!("{}/{:08}", self.scratch, self.parts.len());
        let mut writer = self.storage.writer_at(part.clone());
        write_files(&mut writer, &self.files).await?;
        let summary = writer.close().await?;
        log_debug!(
            component = "fileset",
            event = "part_spilled",
            fileset = %self.name,
            part = %part,
            num_files = summary.num_files,
            buffered_bytes = self.buffered,
        );
        self.parts.push(part);
        self.files.clear();
        self.buffered = 0;
        Ok(())
    }
}

async fn write_files(
    writer: &mut Writer,
    files: &BTreeMap<String, Vec<TaggedData>>,
) -> Result<()> {
    for (path, tags) in files {
        let size = tags.iter().map(|tag| tag.data.len() as u64).sum();
        writer.write_header(path, size).await?;
        for tag in tags {
            writer.start_tag(tag.id.as_str())?;
            writer.write(&tag.data).await?;
        }
    }
    Ok(())
}
