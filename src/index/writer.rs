use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{
    codec::{self, FrameKind},
    Header, IndexSummary,
};
use crate::{
    error::{FilesetError, Result},
    fs::{ObjectClient, ObjectWriter},
};

/// Frames are handed to the object sink in batches of at least this many bytes.
const WRITE_BATCH: usize = 64 * 1024;

/// Sequential writer of one index object.
///
/// Headers must be appended in strictly increasing path order. The object is
/// published by [`IndexWriter::close`], which appends the summary footer.
pub struct IndexWriter {
    objects: Arc<dyn ObjectClient>,
    name: String,
    cancel: CancellationToken,
    sink: Option<Box<dyn ObjectWriter>>,
    buf: Vec<u8>,
    /// Bytes already handed to `sink`.
    written: u64,
    last_path: Option<String>,
    summary: IndexSummary,
}

impl IndexWriter {
    pub fn new(
        objects: Arc<dyn ObjectClient>,
        name: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        let mut buf = Vec::with_capacity(WRITE_BATCH);
        codec::encode_preamble(&mut buf);
        Self {
            objects,
            name: name.into(),
            cancel,
            sink: None,
            buf,
            written: 0,
            last_path: None,
            summary: IndexSummary::default(),
        }
    }

    /// Summary of the headers appended so far.
    pub fn summary(&self) -> IndexSummary {
        self.summary
    }

    pub async fn write_header(&mut self, header: &Header) -> Result<()> {
        if let Some(previous) = &self.last_path {
            if header.path.as_str() <= previous.as_str() {
                return Err(FilesetError::OutOfOrder {
                    previous: previous.clone(),
                    next: header.path.clone(),
                });
            }
        }
        header.validate()?;
        codec::encode_frame(&mut self.buf, FrameKind::Header, &codec::encode_header(header));
        self.summary.size_bytes += header.data_op.size_bytes();
        self.summary.num_files += 1;
        self.last_path = Some(header.path.clone());
        if self.buf.len() >= WRITE_BATCH {
            self.drain().await?;
        }
        Ok(())
    }

    /// Appends the footer and publishes the index object.
    pub async fn close(mut self) -> Result<IndexSummary> {
        let footer_offset = self.written + self.buf.len() as u64;
        codec::encode_frame(
            &mut self.buf,
            FrameKind::Footer,
            &codec::encode_summary(&self.summary),
        );
        self.buf.extend_from_slice(&footer_offset.to_le_bytes());
        self.drain().await?;
        match self.sink.take() {
            Some(sink) => sink.close().await?,
            None => {
                return Err(FilesetError::Malformed(format!(
                    "index {} was never opened",
                    self.name
                )))
            }
        }
        Ok(self.summary)
    }

    async fn drain(&mut self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(FilesetError::Cancelled);
        }
        if self.sink.is_none() {
            self.sink = Some(self.objects.writer(&self.name).await?);
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.write(&self.buf).await?;
        }
        self.written += self.buf.len() as u64;
        self.buf.clear();
        Ok(())
    }
}
