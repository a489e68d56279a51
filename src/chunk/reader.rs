use std::{collections::VecDeque, sync::Arc};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use super::{ContentCopy, DataRef};
use crate::{
    error::{FilesetError, Result},
    fs::ObjectClient,
};

/// Sequential reader over a list of [`DataRef`]s.
///
/// Only the referenced range of a chunk is fetched, never the whole chunk.
/// [`ChunkReader::read_copy`] and [`ChunkReader::skip`] advance the cursor
/// without fetching anything.
pub struct ChunkReader {
    objects: Arc<dyn ObjectClient>,
    cancel: CancellationToken,
    refs: VecDeque<DataRef>,
    /// Reference under the cursor and the bytes of it already consumed.
    current: Option<(DataRef, u64)>,
    /// Fetched bytes of `current`, from its start.
    loaded: Option<Bytes>,
}

impl ChunkReader {
    pub(crate) fn new(objects: Arc<dyn ObjectClient>, cancel: CancellationToken) -> Self {
        Self {
            objects,
            cancel,
            refs: VecDeque::new(),
            current: None,
            loaded: None,
        }
    }

    /// Replaces the pending range with `refs`, discarding any unread bytes.
    pub fn next_range(&mut self, refs: impl IntoIterator<Item = DataRef>) {
        self.refs = refs.into_iter().filter(|r| r.size > 0).collect();
        self.current = None;
        self.loaded = None;
    }

    /// Bytes left in the current range.
    pub fn remaining(&self) -> u64 {
        let current = self
            .current
            .as_ref()
            .map(|(data_ref, pos)| data_ref.size - pos)
            .unwrap_or(0);
        current + self.refs.iter().map(|r| r.size).sum::<u64>()
    }

    /// Reads into `buf`, returning 0 once the range is exhausted.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.advance();
        let Some((data_ref, _)) = self.current.as_ref() else {
            return Ok(0);
        };
        if self.loaded.is_none() {
            if self.cancel.is_cancelled() {
                return Err(FilesetError::Cancelled);
            }
            let data = self
                .objects
                .read(
                    &data_ref.chunk.object_name(),
                    data_ref.offset,
                    Some(data_ref.size),
                )
                .await?;
            if data.len() as u64 != data_ref.size {
                return Err(FilesetError::Corrupt("chunk range shorter than reference"));
            }
            self.loaded = Some(data);
        }
        let (Some((data_ref, pos)), Some(data)) = (self.current.as_mut(), self.loaded.as_ref())
        else {
            return Ok(0);
        };
        let start = *pos as usize;
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        *pos += n as u64;
        if *pos == data_ref.size {
            self.current = None;
            self.loaded = None;
        }
        Ok(n)
    }

    /// Fills `buf` completely or fails with an unexpected end of range.
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(FilesetError::Corrupt("content range ended early"));
            }
            filled += n;
        }
        Ok(())
    }

    /// References to the next `n` bytes, consuming them.
    pub fn read_copy(&mut self, n: u64) -> Result<ContentCopy> {
        let mut copy = ContentCopy::default();
        self.take(n, |data_ref| copy.data_refs.push(data_ref))?;
        Ok(copy)
    }

    /// Discards the next `n` bytes.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        self.take(n, |_| ())
    }

    fn take(&mut self, mut n: u64, mut emit: impl FnMut(DataRef)) -> Result<()> {
        while n > 0 {
            self.advance();
            let Some((data_ref, pos)) = self.current.as_mut() else {
                return Err(FilesetError::Corrupt("content range ended early"));
            };
            let len = n.min(data_ref.size - *pos);
            emit(data_ref.slice(*pos, len));
            *pos += len;
            n -= len;
            if *pos == data_ref.size {
                self.current = None;
                self.loaded = None;
            }
        }
        Ok(())
    }

    /// Positions the cursor on a reference with unread bytes, if any is left.
    fn advance(&mut self) {
        if self.current.is_none() {
            self.current = self.refs.pop_front().map(|data_ref| (data_ref, 0));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use crate::{
        chunk::{ChunkStorage, DataRef},
        error::FilesetError,
        fs::MemoryObjectClient,
    };

    async fn stored(chunks: &ChunkStorage, data: &[u8]) -> Vec<DataRef> {
        let mut writer = chunks.new_writer(CancellationToken::new());
        writer.write(data).await.unwrap();
        writer.flush().await.unwrap();
        writer.resolve(0, data.len() as u64).unwrap()
    }

    #[tokio::test]
    async fn reads_across_chunk_boundaries() {
        let chunks = ChunkStorage::new(Arc::new(MemoryObjectClient::new()), 3);
        let refs = stored(&chunks, b"hello world").await;
        let mut reader = chunks.new_reader(CancellationToken::new());
        reader.next_range(refs);
        assert_eq!(reader.remaining(), 11);

        let mut out = Vec::new();
        let mut buf = [0u8; 4];
        loop {
            let n = reader.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"hello world");
    }

    #[tokio::test]
    async fn copy_then_read_matches_plain_read() {
        let chunks = ChunkStorage::new(Arc::new(MemoryObjectClient::new()), 4);
        let refs = stored(&chunks, b"foobarbaz").await;

        let mut reader = chunks.new_reader(CancellationToken::new());
        reader.next_range(refs.clone());
        reader.skip(2).unwrap();
        let copy = reader.read_copy(5).unwrap();
        assert_eq!(copy.size(), 5);
        let mut tail = [0u8; 2];
        reader.read_exact(&mut tail).await.unwrap();
        assert_eq!(&tail, b"az");

        let mut copied = chunks.new_reader(CancellationToken::new());
        copied.next_range(copy.data_refs);
        let mut buf = [0u8; 5];
        copied.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"obarb");
    }

    #[tokio::test]
    async fn overlong_copies_fail() {
        let chunks = ChunkStorage::new(Arc::new(MemoryObjectClient::new()), 4);
        let refs = stored(&chunks, b"abc").await;
        let mut reader = chunks.new_reader(CancellationToken::new());
        reader.next_range(refs);
        assert!(matches!(reader.read_copy(4), Err(FilesetError::Corrupt(_))));
    }
}
