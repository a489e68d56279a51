use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use super::{
    codec::{self, FrameKind, FRAME_HEADER_SIZE, PREAMBLE_SIZE, TRAILER_SIZE},
    Header, IndexSummary,
};
use crate::{
    error::{FilesetError, Result},
    fs::ObjectClient,
};

/// Forward-only reader over the headers of one index object.
///
/// The object is fetched on the first call to [`IndexReader::next`].
pub struct IndexReader {
    objects: Arc<dyn ObjectClient>,
    name: String,
    cancel: CancellationToken,
    state: Option<Loaded>,
}

struct Loaded {
    data: Bytes,
    /// Offset of the next unread frame.
    pos: usize,
    /// Offset of the footer frame; header frames end here.
    end: usize,
    summary: IndexSummary,
}

impl IndexReader {
    pub fn new(
        objects: Arc<dyn ObjectClient>,
        name: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            objects,
            name: name.into(),
            cancel,
            state: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next header, or `None` once every header has been returned.
    pub async fn next(&mut self) -> Result<Option<Header>> {
        let state = self.load().await?;
        if state.pos >= state.end {
            return Ok(None);
        }
        let (kind, payload, _) = codec::decode_frame(&state.data[state.pos..state.end])?;
        if kind != FrameKind::Header {
            return Err(FilesetError::Corrupt("unexpected frame before index footer"));
        }
        let header = codec::decode_header(payload)?;
        state.pos += FRAME_HEADER_SIZE + payload.len();
        Ok(Some(header))
    }

    /// Summary stored in the footer.
    pub async fn summary(&mut self) -> Result<IndexSummary> {
        Ok(self.load().await?.summary)
    }

    async fn load(&mut self) -> Result<&mut Loaded> {
        if self.state.is_none() {
            if self.cancel.is_cancelled() {
                return Err(FilesetError::Cancelled);
            }
            let data = self.objects.read(&self.name, 0, None).await?;
            codec::decode_preamble(&data)?;
            let end = footer_offset(&data)?;
            if end < PREAMBLE_SIZE || end > data.len() - TRAILER_SIZE {
                return Err(FilesetError::Corrupt("index footer offset out of bounds"));
            }
            let summary = decode_footer(&data[end..data.len() - TRAILER_SIZE])?;
            self.state = Some(Loaded {
                data,
                pos: PREAMBLE_SIZE,
                end,
                summary,
            });
        }
        self.state
            .as_mut()
            .ok_or(FilesetError::Corrupt("index state missing after load"))
    }
}

/// Reads the summary of the index `name` without fetching its headers.
pub async fn top_level(objects: &dyn ObjectClient, name: &str) -> Result<IndexSummary> {
    let size = objects.size(name).await?;
    if size < (PREAMBLE_SIZE + TRAILER_SIZE) as u64 {
        return Err(FilesetError::Corrupt("index object too small"));
    }
    codec::decode_preamble(&objects.read(name, 0, Some(PREAMBLE_SIZE as u64)).await?)?;
    let trailer = objects
        .read(name, size - TRAILER_SIZE as u64, Some(TRAILER_SIZE as u64))
        .await?;
    let offset = footer_offset(&trailer)? as u64;
    if offset < PREAMBLE_SIZE as u64 || offset > size - TRAILER_SIZE as u64 {
        return Err(FilesetError::Corrupt("index footer offset out of bounds"));
    }
    let footer = objects
        .read(name, offset, Some(size - TRAILER_SIZE as u64 - offset))
        .await?;
    decode_footer(&footer)
}

/// Footer offset from the last eight bytes of `data`.
fn footer_offset(data: &[u8]) -> Result<usize> {
    let tail = data
        .len()
        .checked_sub(TRAILER_SIZE)
        .map(|start| &data[start..])
        .ok_or(FilesetError::Corrupt("index object too small"))?;
    let mut raw = [0u8; TRAILER_SIZE];
    raw.copy_from_slice(tail);
    usize::try_from(u64::from_le_bytes(raw))
        .map_err(|_| FilesetError::Corrupt("index footer offset out of bounds"))
}

fn decode_footer(bytes: &[u8]) -> Result<IndexSummary> {
    match codec::decode_frame(bytes)? {
        (FrameKind::Footer, payload, rest) if rest.is_empty() => codec::decode_summary(payload),
        _ => Err(FilesetError::Corrupt("index footer frame missing")),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use crate::{
        chunk::{ChunkId, DataRef},
        error::FilesetError,
        fs::{self, MemoryObjectClient, ObjectClient},
        index::{top_level, DataOp, Header, IndexReader, IndexWriter, Tag, HEADER_TAG},
    };

    fn header(path: &str, framing: u64, tags: &[(&str, u64)]) -> Header {
        let mut all = vec![Tag::new(HEADER_TAG, framing)];
        all.extend(tags.iter().map(|(id, size)| Tag::new(*id, *size)));
        let size = tags.iter().map(|(_, size)| size).sum();
        let stored = framing + size;
        Header {
            path: path.to_string(),
            size,
            data_op: DataOp {
                data_refs: vec![DataRef {
                    chunk: ChunkId::of(path.as_bytes()),
                    chunk_size: stored,
                    offset: 0,
                    size: stored,
                }],
                tags: all,
            },
        }
    }

    #[tokio::test]
    async fn headers_come_back_in_order() {
        let objects = Arc::new(MemoryObjectClient::new());
        let headers = vec![
            header("/a", 10, &[("t1", 3)]),
            header("/b", 10, &[("t1", 1), ("t2", 2)]),
            header("/c", 10, &[]),
        ];
        let mut writer = IndexWriter::new(objects.clone(), "pfs/x/diff", CancellationToken::new());
        for header in &headers {
            writer.write_header(header).await.unwrap();
        }
        let summary = writer.close().await.unwrap();
        assert_eq!(summary.num_files, 3);
        assert_eq!(summary.size_bytes, 36);

        let mut reader = IndexReader::new(objects.clone(), "pfs/x/diff", CancellationToken::new());
        let mut read = Vec::new();
        while let Some(header) = reader.next().await.unwrap() {
            read.push(header);
        }
        assert_eq!(read, headers);
        assert!(reader.next().await.unwrap().is_none());
        assert_eq!(
            top_level(objects.as_ref(), "pfs/x/diff").await.unwrap(),
            summary
        );
    }

    #[tokio::test]
    async fn empty_index_has_zero_summary() {
        let objects = Arc::new(MemoryObjectClient::new());
        IndexWriter::new(objects.clone(), "empty", CancellationToken::new())
            .close()
            .await
            .unwrap();
        let summary = top_level(objects.as_ref(), "empty").await.unwrap();
        assert_eq!(summary.num_files, 0);
        let mut reader = IndexReader::new(objects, "empty", CancellationToken::new());
        assert!(reader.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn out_of_order_headers_are_rejected() {
        let objects = Arc::new(MemoryObjectClient::new());
        let mut writer = IndexWriter::new(objects.clone(), "i", CancellationToken::new());
        writer.write_header(&header("/b", 4, &[])).await.unwrap();
        let err = writer.write_header(&header("/a", 4, &[])).await.unwrap_err();
        assert!(matches!(err, FilesetError::OutOfOrder { .. }));
        let err = writer.write_header(&header("/b", 4, &[])).await.unwrap_err();
        assert!(matches!(err, FilesetError::OutOfOrder { .. }));
    }

    #[tokio::test]
    async fn truncated_objects_are_corrupt() {
        let objects = Arc::new(MemoryObjectClient::new());
        let mut writer = IndexWriter::new(objects.clone(), "i", CancellationToken::new());
        writer.write_header(&header("/a", 4, &[("t", 1)])).await.unwrap();
        writer.close().await.unwrap();

        let data = objects.read("i", 0, None).await.unwrap();
        fs::put(objects.as_ref(), "cut", &data[..data.len() - 3])
            .await
            .unwrap();
        assert!(matches!(
            top_level(objects.as_ref(), "cut").await,
            Err(FilesetError::Corrupt(_))
        ));
        let mut reader = IndexReader::new(objects.clone(), "cut", CancellationToken::new());
        assert!(reader.next().await.is_err());
    }

    #[tokio::test]
    async fn missing_index_is_not_found() {
        let objects = Arc::new(MemoryObjectClient::new());
        let mut reader = IndexReader::new(objects.clone(), "nope", CancellationToken::new());
        assert!(matches!(
            reader.next().await,
            Err(FilesetError::NotFound(_))
        ));
    }
}
