use super::MergeStream;
use crate::{
    chunk::ChunkReader,
    error::{FilesetError, Result},
    fileset::Reader,
    index::{DataOp, Header, Tag, HEADER_TAG},
};

/// Read-only view of the merge of several filesets.
///
/// Each call to [`MergeReader::next`] returns one coalesced header: the
/// content of every same-path file concatenated in reader order, with an
/// empty header tag in place of the members' framing records.
pub struct MergeReader {
    stream: MergeStream,
    chunks: ChunkReader,
    current: Option<Header>,
}

impl MergeReader {
    pub(crate) async fn new(readers: Vec<Reader>, chunks: ChunkReader) -> Result<Self> {
        Ok(Self {
            stream: MergeStream::from_vec(readers).await?,
            chunks,
            current: None,
        })
    }

    /// Advances to the next merged file, or `None` once every input is exhausted.
    pub async fn next(&mut self) -> Result<Option<Header>> {
        let Some(group) = self.stream.next_group().await? else {
            self.current = None;
            return Ok(None);
        };
        let mut data_op = DataOp {
            data_refs: Vec::new(),
            tags: vec![Tag::new(HEADER_TAG, 0)],
        };
        for &offset in &group.offsets {
            let copy = self
                .stream
                .reader_mut(offset)
                .read_copy_tags(None)
                .await?;
            data_op.data_refs.extend(copy.content.data_refs);
            data_op.tags.extend(copy.tags);
        }
        let header = Header {
            path: group.path,
            size: data_op.size_bytes(),
            data_op,
        };
        self.chunks
            .next_range(header.data_op.data_refs.iter().cloned());
        self.current = Some(header.clone());
        Ok(Some(header))
    }

    /// Header of the current merged file.
    pub fn header(&self) -> Option<&Header> {
        self.current.as_ref()
    }

    /// Reads content of the current merged file, returning 0 once it is exhausted.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.current.is_none() {
            return Err(FilesetError::NoHeader);
        }
        self.chunks.read(buf).await
    }

    /// Reads the rest of the current merged file's content.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>> {
        if self.current.is_none() {
            return Err(FilesetError::NoHeader);
        }
        let mut out = vec![0u8; self.chunks.remaining() as usize];
        self.chunks.read_exact(&mut out).await?;
        Ok(out)
    }

    /// Closes every underlying reader, returning the first error.
    pub fn close(self) -> Result<()> {
        self.stream.close()
    }
}
