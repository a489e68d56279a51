use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::CopyTags;
use crate::{
    chunk::{ChunkReader, ChunkStorage},
    error::{FilesetError, Result},
    fs::ObjectClient,
    index::{self, before_bound, Header, IndexReader, Tag},
};

/// The file under the cursor.
struct Current {
    header: Header,
    /// Index into the header's content tags of the next unconsumed tag.
    next_tag: usize,
    /// Content bytes consumed so far.
    consumed: u64,
    /// Bytes of content consumed inside `next_tag`.
    tag_offset: u64,
    /// Whether the chunk reader has been positioned past the framing record.
    content_open: bool,
}

/// Reads one stored fileset back as ordered headers with readable content.
///
/// [`Reader::next`] moves to the next file; [`Reader::read`] and
/// [`Reader::read_copy_tags`] consume the current file's content. The content
/// stream is opened on first use, so iterating headers alone never touches
/// chunk storage.
pub struct Reader {
    index: IndexReader,
    chunks: ChunkReader,
    /// Header returned by [`Reader::peek`] and not yet consumed by `next`.
    peeked: Option<Header>,
    current: Option<Current>,
}

impl Reader {
    pub(crate) fn new(
        objects: Arc<dyn ObjectClient>,
        chunks: &ChunkStorage,
        name: String,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            index: IndexReader::new(objects, name, cancel.clone()),
            chunks: chunks.new_reader(cancel),
            peeked: None,
            current: None,
        }
    }

    /// Object name of the index being read.
    pub fn name(&self) -> &str {
        self.index.name()
    }

    /// Advances to the next file and returns its header, or `None` at the end.
    pub async fn next(&mut self) -> Result<Option<Header>> {
        let header = match self.peeked.take() {
            Some(header) => Some(header),
            None => self.index.next().await?,
        };
        self.current = header.clone().map(|header| Current {
            header,
            next_tag: 0,
            consumed: 0,
            tag_offset: 0,
            content_open: false,
        });
        Ok(header)
    }

    /// Returns the header the next call to [`Reader::next`] will return.
    pub async fn peek(&mut self) -> Result<Option<&Header>> {
        if self.peeked.is_none() {
            self.peeked = self.index.next().await?;
        }
        Ok(self.peeked.as_ref())
    }

    /// Header of the current file.
    pub fn header(&self) -> Option<&Header> {
        self.current.as_ref().map(|current| &current.header)
    }

    /// Next tag of the current file that has not been fully consumed.
    pub fn peek_tag(&self) -> Result<Option<&Tag>> {
        let current = self.current.as_ref().ok_or(FilesetError::NoHeader)?;
        Ok(current.header.tags().get(current.next_tag))
    }

    /// Reads content of the current file, returning 0 once it is exhausted.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.open_content(true).await?;
        let n = self.chunks.read(buf).await?;
        if let Some(current) = self.current.as_mut() {
            current.advance(n as u64);
        }
        Ok(n)
    }

    /// Reads the rest of the current file's content.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let remaining = self
            .current
            .as_ref()
            .map(|current| current.header.size - current.consumed)
            .unwrap_or(0);
        let mut out = vec![0u8; remaining as usize];
        let mut filled = 0;
        while filled < out.len() {
            let n = self.read(&mut out[filled..]).await?;
            if n == 0 {
                return Err(FilesetError::Corrupt("content ended before the declared size"));
            }
            filled += n;
        }
        Ok(out)
    }

    /// Copies, by reference, every remaining tag of the current file whose id
    /// sorts strictly before `bound` (all remaining tags when `bound` is `None`).
    ///
    /// The copied bytes are consumed: a following [`Reader::read`] continues
    /// after them. Copies must start on a tag boundary.
    pub async fn read_copy_tags(&mut self, bound: Option<&str>) -> Result<CopyTags> {
        self.open_content(false).await?;
        let current = self.current.as_mut().ok_or(FilesetError::NoHeader)?;
        if current.tag_offset != 0 {
            return Err(FilesetError::Malformed(format!(
                "{}: copy starts {} bytes into a tag",
                current.header.path, current.tag_offset
            )));
        }
        let tags: Vec<Tag> = current.header.tags()[current.next_tag..]
            .iter()
            .take_while(|tag| before_bound(&tag.id, bound))
            .cloned()
            .collect();
        let size = tags.iter().map(|tag| tag.size).sum();
        let content = self.chunks.read_copy(size)?;
        current.next_tag += tags.len();
        current.consumed += size;
        Ok(CopyTags {
            path: current.header.path.clone(),
            tags,
            content,
        })
    }

    /// Ends the read. The loaded index and any fetched chunk bytes are
    /// released when the reader is dropped; closing never fails.
    pub fn close(self) -> Result<()> {
        Ok(())
    }

    /// Positions the chunk reader at the current file's content.
    ///
    /// With `verify` the framing record is fetched and checked against the
    /// header; otherwise it is skipped without being read.
    async fn open_content(&mut self, verify: bool) -> Result<()> {
        let current = self.current.as_mut().ok_or(FilesetError::NoHeader)?;
        if current.content_open {
            return Ok(());
        }
        let framing = current
            .header
            .data_op
            .tags
            .first()
            .map(|tag| tag.size)
            .unwrap_or(0);
        self.chunks
            .next_range(current.header.data_op.data_refs.iter().cloned());
        if verify {
            let mut record = vec![0u8; framing as usize];
            self.chunks.read_exact(&mut record).await?;
            let (path, size) = index::decode_framing(&record)?;
            if path != current.header.path || size != current.header.size {
                return Err(FilesetError::Corrupt("framing record disagrees with index"));
            }
        } else {
            self.chunks.skip(framing)?;
        }
        current.content_open = true;
        Ok(())
    }
}

impl Current {
    /// Records `n` consumed content bytes, moving past finished tags.
    fn advance(&mut self, mut n: u64) {
        self.consumed += n;
        let tags = self.header.tags();
        while n > 0 {
            let Some(tag) = tags.get(self.next_tag) else {
                break;
            };
            let step = n.min(tag.size - self.tag_offset);
            self.tag_offset += step;
            n -= step;
            if self.tag_offset == tag.size {
                self.next_tag += 1;
                self.tag_offset = 0;
            }
        }
    }
}
