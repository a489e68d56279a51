//! Binary encoding of index objects and per-file framing records.
//!
//! Index object layout:
//!
//! ```text
//! magic u32 | version u16 | frame* | footer offset u64
//! frame = kind u8 | len u32 | crc32 u32 | payload[len]
//! ```
//!
//! All integers are little-endian. The footer frame is the last frame and its
//! offset is repeated in the final eight bytes so the summary can be read
//! without scanning the headers.

use super::{DataOp, Header, IndexSummary, Tag};
use crate::{
    chunk::{ChunkId, DataRef},
    error::{FilesetError, Result},
};

/// Magic constant identifying index objects (`"FSIX"`).
pub(crate) const INDEX_MAGIC: u32 = 0x5849_5346;
/// Magic constant opening every framing record (`"FSHD"`).
pub(crate) const FRAMING_MAGIC: u32 = 0x4448_5346;
/// Supported index format version.
pub(crate) const INDEX_VERSION: u16 = 1;
/// Bytes before the first frame.
pub(crate) const PREAMBLE_SIZE: usize = 4 + 2;
/// Bytes of a frame header.
pub(crate) const FRAME_HEADER_SIZE: usize = 1 + 4 + 4;
/// Bytes of the trailing footer offset.
pub(crate) const TRAILER_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    Header,
    Footer,
}

impl FrameKind {
    const fn as_u8(self) -> u8 {
        match self {
            FrameKind::Header => 1,
            FrameKind::Footer => 2,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(FrameKind::Header),
            2 => Some(FrameKind::Footer),
            _ => None,
        }
    }
}

pub(crate) fn encode_preamble(buf: &mut Vec<u8>) {
    buf.extend_from_slice(&INDEX_MAGIC.to_le_bytes());
    buf.extend_from_slice(&INDEX_VERSION.to_le_bytes());
}

pub(crate) fn decode_preamble(bytes: &[u8]) -> Result<&[u8]> {
    let mut decoder = Decoder::new(bytes);
    if decoder.u32()? != INDEX_MAGIC {
        return Err(FilesetError::Corrupt("index magic mismatch"));
    }
    if decoder.u16()? != INDEX_VERSION {
        return Err(FilesetError::Corrupt("unsupported index version"));
    }
    Ok(decoder.rest())
}

pub(crate) fn encode_frame(buf: &mut Vec<u8>, kind: FrameKind, payload: &[u8]) {
    buf.push(kind.as_u8());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    buf.extend_from_slice(payload);
}

/// Splits one frame off `bytes`, verifying its checksum.
pub(crate) fn decode_frame(bytes: &[u8]) -> Result<(FrameKind, &[u8], &[u8])> {
    let mut decoder = Decoder::new(bytes);
    let kind = FrameKind::from_u8(decoder.u8()?)
        .ok_or(FilesetError::Corrupt("unknown index frame kind"))?;
    let len = decoder.u32()? as usize;
    let crc = decoder.u32()?;
    let payload = decoder
        .bytes(len)
        .map_err(|_| FilesetError::Corrupt("index frame payload truncated"))?;
    if crc32fast::hash(payload) != crc {
        return Err(FilesetError::Corrupt("index frame crc32 mismatch"));
    }
    Ok((kind, payload, decoder.rest()))
}

pub(crate) fn encode_header(header: &Header) -> Vec<u8> {
    let mut buf = Vec::new();
    put_str(&mut buf, &header.path);
    buf.extend_from_slice(&header.size.to_le_bytes());
    buf.extend_from_slice(&(header.data_op.data_refs.len() as u32).to_le_bytes());
    for data_ref in &header.data_op.data_refs {
        buf.extend_from_slice(data_ref.chunk.as_bytes());
        buf.extend_from_slice(&data_ref.chunk_size.to_le_bytes());
        buf.extend_from_slice(&data_ref.offset.to_le_bytes());
        buf.extend_from_slice(&data_ref.size.to_le_bytes());
    }
    buf.extend_from_slice(&(header.data_op.tags.len() as u32).to_le_bytes());
    for tag in &header.data_op.tags {
        put_str(&mut buf, &tag.id);
        buf.extend_from_slice(&tag.size.to_le_bytes());
    }
    buf
}

pub(crate) fn decode_header(payload: &[u8]) -> Result<Header> {
    let mut decoder = Decoder::new(payload);
    let path = decoder.string()?;
    let size = decoder.u64()?;
    let num_refs = decoder.u32()? as usize;
    let mut data_refs = Vec::with_capacity(num_refs.min(1024));
    for _ in 0..num_refs {
        let mut id = [0u8; 32];
        id.copy_from_slice(decoder.bytes(32)?);
        data_refs.push(DataRef {
            chunk: ChunkId::from_bytes(id),
            chunk_size: decoder.u64()?,
            offset: decoder.u64()?,
            size: decoder.u64()?,
        });
    }
    let num_tags = decoder.u32()? as usize;
    let mut tags = Vec::with_capacity(num_tags.min(1024));
    for _ in 0..num_tags {
        let id = decoder.string()?;
        tags.push(Tag::new(id, decoder.u64()?));
    }
    if !decoder.rest().is_empty() {
        return Err(FilesetError::Corrupt("trailing bytes after index header"));
    }
    let header = Header {
        path,
        size,
        data_op: DataOp { data_refs, tags },
    };
    header.validate()?;
    Ok(header)
}

pub(crate) fn encode_summary(summary: &IndexSummary) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    buf.extend_from_slice(&summary.size_bytes.to_le_bytes());
    buf.extend_from_slice(&summary.num_files.to_le_bytes());
    buf
}

pub(crate) fn decode_summary(payload: &[u8]) -> Result<IndexSummary> {
    let mut decoder = Decoder::new(payload);
    Ok(IndexSummary {
        size_bytes: decoder.u64()?,
        num_files: decoder.u64()?,
    })
}

/// Encodes the record that precedes a file's content in chunk storage.
pub(crate) fn encode_framing(path: &str, size: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + 4 + path.len() + 8);
    buf.extend_from_slice(&FRAMING_MAGIC.to_le_bytes());
    put_str(&mut buf, path);
    buf.extend_from_slice(&size.to_le_bytes());
    buf
}

pub(crate) fn decode_framing(bytes: &[u8]) -> Result<(String, u64)> {
    let mut decoder = Decoder::new(bytes);
    if decoder.u32()? != FRAMING_MAGIC {
        return Err(FilesetError::Corrupt("framing record magic mismatch"));
    }
    let path = decoder.string()?;
    let size = decoder.u64()?;
    if !decoder.rest().is_empty() {
        return Err(FilesetError::Corrupt("trailing bytes after framing record"));
    }
    Ok((path, size))
}

fn put_str(buf: &mut Vec<u8>, value: &str) {
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(value.as_bytes());
}

struct Decoder<'a> {
    buf: &'a [u8],
}

impl<'a> Decoder<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn rest(&self) -> &'a [u8] {
        self.buf
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.buf.len() < len {
            return Err(FilesetError::Corrupt("index record truncated"));
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let raw = self.bytes(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|err| FilesetError::Malformed(format!("non-utf8 string: {err}")))
    }
}
