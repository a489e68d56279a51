use std::{collections::VecDeque, sync::Arc};

use tokio_util::sync::CancellationToken;

use super::CopyTags;
use crate::{
    chunk::{ChunkStorage, ChunkWriter},
    error::{FilesetError, Result},
    fs::ObjectClient,
    index::{self, DataOp, Header, IndexSummary, IndexWriter, Tag, HEADER_TAG},
    observability::{log_debug, log_info},
};

/// File whose header has been written and whose content is still streaming.
struct OpenFile {
    path: String,
    declared: u64,
    /// Stream offset of the file's framing record.
    start: u64,
    /// Header tag first, content tags after.
    tags: Vec<Tag>,
    written: u64,
}

/// Finished file waiting for its bytes to be stored.
struct PendingFile {
    path: String,
    size: u64,
    start: u64,
    end: u64,
    tags: Vec<Tag>,
}

/// Serializes an ordered stream of files into chunk storage and an index.
///
/// Usage per file: [`Writer::write_header`], then one or more
/// [`Writer::start_tag`] / [`Writer::write`] rounds (or
/// [`Writer::copy_tags`]). Nothing becomes visible until
/// [`Writer::close`] publishes the index.
pub struct Writer {
    name: String,
    chunks: ChunkWriter,
    index: IndexWriter,
    memory_threshold: usize,
    last_path: Option<String>,
    current: Option<OpenFile>,
    pending: VecDeque<PendingFile>,
}

impl Writer {
    pub(crate) fn new(
        objects: Arc<dyn ObjectClient>,
        chunks: &ChunkStorage,
        name: String,
        memory_threshold: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            chunks: chunks.new_writer(cancel.clone()),
            index: IndexWriter::new(objects, name.clone(), cancel),
            name,
            memory_threshold,
            last_path: None,
            current: None,
            pending: VecDeque::new(),
        }
    }

    /// Object name of the index this writer publishes.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Starts a new file of `size` content bytes.
    ///
    /// Paths must be strictly increasing across calls.
    pub async fn write_header(&mut self, path: &str, size: u64) -> Result<()> {
        self.finish_file().await?;
        if let Some(previous) = &self.last_path {
            if path <= previous.as_str() {
                return Err(FilesetError::OutOfOrder {
                    previous: previous.clone(),
                    next: path.to_string(),
                });
            }
        }
        let start = self.chunks.offset();
        let framing = index::encode_framing(path, size);
        self.chunks.write(&framing).await?;
        self.last_path = Some(path.to_string());
        self.current = Some(OpenFile {
            path: path.to_string(),
            declared: size,
            start,
            tags: vec![Tag::new(HEADER_TAG, framing.len() as u64)],
            written: 0,
        });
        Ok(())
    }

    /// Opens a tag; subsequent writes are attributed to it.
    pub fn start_tag(&mut self, id: impl Into<String>) -> Result<()> {
        let file = self.current.as_mut().ok_or(FilesetError::NoHeader)?;
        file.tags.push(Tag::new(id, 0));
        Ok(())
    }

    /// Appends content to the current tag.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        let file = self.current.as_mut().ok_or(FilesetError::NoHeader)?;
        if file.tags.len() < 2 {
            return Err(FilesetError::NoTag);
        }
        self.chunks.write(data).await?;
        let len = data.len() as u64;
        file.written += len;
        if let Some(tag) = file.tags.last_mut() {
            tag.size += len;
        }
        Ok(())
    }

    /// Appends already-stored tags to the current file by reference.
    pub async fn copy_tags(&mut self, copy: CopyTags) -> Result<()> {
        let file = self.current.as_mut().ok_or(FilesetError::NoHeader)?;
        let size = copy.size();
        if copy.content.size() != size {
            return Err(FilesetError::Malformed(format!(
                "copy of {} covers {} bytes but its tags declare {size}",
                copy.path,
                copy.content.size()
            )));
        }
        self.chunks.write_copy(copy.content).await?;
        file.written += size;
        file.tags.extend(copy.tags);
        Ok(())
    }

    /// Flushes every buffered byte and publishes the index.
    pub async fn close(mut self) -> Result<IndexSummary> {
        self.finish_file().await?;
        self.chunks.flush().await?;
        self.index_stored().await?;
        let summary = self.index.close().await?;
        log_info!(
            component = "writer",
            event = "writer_closed",
            fileset = %self.name,
            num_files = summary.num_files,
            size_bytes = summary.size_bytes,
            chunks_written = self.chunks.chunks_written(),
        );
        Ok(summary)
    }

    async fn finish_file(&mut self) -> Result<()> {
        let Some(file) = self.current.take() else {
            return Ok(());
        };
        if file.written != file.declared {
            return Err(FilesetError::SizeMismatch {
                path: file.path,
                declared: file.declared,
                written: file.written,
            });
        }
        self.pending.push_back(PendingFile {
            path: file.path,
            size: file.declared,
            start: file.start,
            end: self.chunks.offset(),
            tags: file.tags,
        });
        if self.chunks.buffered_bytes() >= self.memory_threshold {
            log_debug!(
                component = "writer",
                event = "writer_flush",
                fileset = %self.name,
                buffered_bytes = self.chunks.buffered_bytes(),
                pending_files = self.pending.len(),
            );
            self.chunks.flush().await?;
        }
        self.index_stored().await
    }

    /// Indexes every pending file whose bytes are fully stored.
    async fn index_stored(&mut self) -> Result<()> {
        while self
            .pending
            .front()
            .is_some_and(|file| file.end <= self.chunks.flushed_offset())
        {
            let Some(file) = self.pending.pop_front() else {
                break;
            };
            let header = Header {
                data_op: DataOp {
                    data_refs: self.chunks.resolve(file.start, file.end)?,
                    tags: file.tags,
                },
                path: file.path,
                size: file.size,
            };
            self.index.write_header(&header).await?;
        }
        Ok(())
    }
}
