use std::{collections::VecDeque, sync::Arc};

use tokio_util::sync::CancellationToken;

use super::{ChunkId, ContentCopy, DataRef};
use crate::{
    error::{FilesetError, Result},
    fs::{self, ObjectClient},
};

/// One stored range of the writer's logical byte stream.
#[derive(Debug)]
struct Segment {
    start: u64,
    data_ref: DataRef,
}

impl Segment {
    fn end(&self) -> u64 {
        self.start + self.data_ref.size
    }
}

/// Appends a logical byte stream to chunk storage.
///
/// Bytes are buffered and cut into chunks of `chunk_size`; copies splice
/// already-stored ranges into the stream by reference. Offsets of the stream
/// are resolved to [`DataRef`]s with [`ChunkWriter::resolve`] once the bytes
/// covering them have been flushed.
pub struct ChunkWriter {
    objects: Arc<dyn ObjectClient>,
    chunk_size: usize,
    cancel: CancellationToken,
    buf: Vec<u8>,
    /// Stream offset of `buf[0]`.
    buf_start: u64,
    segments: VecDeque<Segment>,
    chunks_written: usize,
}

impl ChunkWriter {
    pub(crate) fn new(
        objects: Arc<dyn ObjectClient>,
        chunk_size: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            objects,
            chunk_size,
            cancel,
            buf: Vec::with_capacity(chunk_size.min(64 * 1024)),
            buf_start: 0,
            segments: VecDeque::new(),
            chunks_written: 0,
        }
    }

    /// Length of the logical stream written so far.
    pub fn offset(&self) -> u64 {
        self.buf_start + self.buf.len() as u64
    }

    /// Stream offset up to which every byte is stored and resolvable.
    pub fn flushed_offset(&self) -> u64 {
        self.buf_start
    }

    /// Bytes held in memory and not yet stored.
    pub fn buffered_bytes(&self) -> usize {
        self.buf.len()
    }

    /// Number of chunk objects this writer uploaded (deduplicated chunks excluded).
    pub fn chunks_written(&self) -> usize {
        self.chunks_written
    }

    pub async fn write(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let room = self.chunk_size - self.buf.len();
            let take = room.min(data.len());
            self.buf.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.buf.len() == self.chunk_size {
                self.cut().await?;
            }
        }
        Ok(())
    }

    /// Appends the copied ranges to the stream without reading them.
    pub async fn write_copy(&mut self, copy: ContentCopy) -> Result<()> {
        self.cut().await?;
        for data_ref in copy.data_refs {
            if data_ref.size == 0 {
                continue;
            }
            let start = self.buf_start;
            self.buf_start += data_ref.size;
            self.segments.push_back(Segment { start, data_ref });
        }
        Ok(())
    }

    /// Stores any buffered bytes so every written offset becomes resolvable.
    pub async fn flush(&mut self) -> Result<()> {
        self.cut().await
    }

    /// Data references covering the flushed stream range `[start, end)`.
    ///
    /// Segments that end at or before `start` are released: callers resolve
    /// ranges in increasing order.
    pub fn resolve(&mut self, start: u64, end: u64) -> Result<Vec<DataRef>> {
        if end > self.buf_start {
            return Err(FilesetError::Malformed(format!(
                "range {start}..{end} is not flushed (flushed up to {})",
                self.buf_start
            )));
        }
        while self
            .segments
            .front()
            .is_some_and(|segment| segment.end() <= start)
        {
            self.segments.pop_front();
        }
        let mut refs = Vec::new();
        for segment in &self.segments {
            if segment.start >= end {
                break;
            }
            let lo = start.max(segment.start);
            let hi = end.min(segment.end());
            if lo < hi {
                refs.push(segment.data_ref.slice(lo - segment.start, hi - lo));
            }
        }
        Ok(refs)
    }

    async fn cut(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            return Err(FilesetError::Cancelled);
        }
        let data = std::mem::take(&mut self.buf);
        let id = ChunkId::of(&data);
        let name = id.object_name();
        if !self.objects.exists(&name).await? {
            fs::put(self.objects.as_ref(), &name, &data).await?;
            self.chunks_written += 1;
        }
        let size = data.len() as u64;
        self.segments.push_back(Segment {
            start: self.buf_start,
            data_ref: DataRef {
                chunk: id,
                chunk_size: size,
                offset: 0,
                size,
            },
        });
        self.buf_start += size;
        self.buf = data;
        self.buf.clear();
        Ok(())
    }
}
