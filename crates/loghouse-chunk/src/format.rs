//! Chunk Serialization Format
//!
//! A serialized chunk is self-describing and parsed trailer-first:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │ Header (6 bytes)                                           │
//! │ - Magic: 0x012EE56A (4 bytes, big-endian)                  │
//! │ - Format version: 1 | 2 | 3 (1 byte)                       │
//! │ - Encoding id (1 byte)                                     │
//! ├────────────────────────────────────────────────────────────┤
//! │ Block payloads, back to back (compressed bytes)            │
//! ├────────────────────────────────────────────────────────────┤
//! │ Meta                                                       │
//! │ - Block count (uvarint)                                    │
//! │ - Per block:                                               │
//! │   * entry count (uvarint)                                  │
//! │   * mint, maxt (varints)                                   │
//! │   * payload offset (uvarint)                               │
//! │   * uncompressed size (uvarint)                            │
//! │   * compressed size (uvarint)                              │
//! │   * CRC32C of the payload (4 bytes, V2/V3)                 │
//! │ - CRC32C of the meta section (4 bytes, V3 only)            │
//! ├────────────────────────────────────────────────────────────┤
//! │ Trailer                                                    │
//! │ - Meta offset (8 bytes, big-endian)                        │
//! │ - Meta length (8 bytes, big-endian; absent in V1)          │
//! │ - Magic again (4 bytes)                                    │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Checksums use the Castagnoli CRC-32 polynomial. Inside a block,
//! entries are framed as `ts (zigzag varint) | line length (uvarint) |
//! line bytes` with absolute timestamps; the frame is identical across
//! versions, so parsed payloads are carried verbatim and V3
//! re-serialization is byte-stable.
//!
//! Writers emit V2 or V3 (V1 is read-only legacy: no per-block
//! checksums, short trailer). Serialization covers sealed blocks only;
//! close a chunk first if its head must be included. Checkpointing an
//! in-progress chunk instead writes the sealed part and the raw head to
//! two separate buffers, so an appender can snapshot without sealing;
//! see [`MemChunk::serialize_for_checkpoint_to`].

use std::fmt;
use std::io::Write;

use bytes::{BufMut, Bytes, BytesMut};
use loghouse_core::varint::{
    put_uvarint, put_varint, read_uvarint, read_varint, uvarint_len, varint_len,
};
use loghouse_core::{Error, Result};
use tracing::debug;

use crate::block::SealedBlock;
use crate::chunk::MemChunk;
use crate::codec::Encoding;
use crate::head::{HeadBlock, HeadFormat};

/// Magic bytes framing every serialized chunk.
pub const MAGIC: u32 = 0x012E_E56A;

const HEADER_LEN: usize = 6;
const TRAILER_LEN: usize = 20;
const TRAILER_LEN_V1: usize = 12;

/// Serialization format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkFormat {
    /// Legacy: no per-block checksums, short trailer. Read-only.
    V1 = 1,
    /// Per-block checksums.
    V2 = 2,
    /// V2 plus a checksummed meta section and deterministic layout.
    V3 = 3,
}

impl ChunkFormat {
    pub fn byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ChunkFormat {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(ChunkFormat::V1),
            2 => Ok(ChunkFormat::V2),
            3 => Ok(ChunkFormat::V3),
            other => Err(Error::UnsupportedVersion(other)),
        }
    }
}

impl fmt::Display for ChunkFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.byte())
    }
}

/// Exact length of `encode`'s output for this chunk, without encoding.
pub(crate) fn serialized_len(chunk: &MemChunk) -> usize {
    let mut len = HEADER_LEN;
    let mut meta = uvarint_len(chunk.blocks.len() as u64);
    let mut offset = HEADER_LEN;
    for b in &chunk.blocks {
        meta += uvarint_len(b.entries() as u64)
            + varint_len(b.mint())
            + varint_len(b.maxt())
            + uvarint_len(offset as u64)
            + uvarint_len(b.uncompressed_size() as u64)
            + uvarint_len(b.compressed_size() as u64);
        if chunk.format != ChunkFormat::V1 {
            meta += 4;
        }
        offset += b.compressed_size();
        len += b.compressed_size();
    }
    len += meta;
    if chunk.format == ChunkFormat::V3 {
        len += 4;
    }
    len += match chunk.format {
        ChunkFormat::V1 => TRAILER_LEN_V1,
        _ => TRAILER_LEN,
    };
    len
}

fn encode(chunk: &MemChunk, buf: &mut BytesMut) -> Result<()> {
    if chunk.format == ChunkFormat::V1 {
        return Err(Error::UnsupportedVersion(ChunkFormat::V1.byte()));
    }

    buf.reserve(serialized_len(chunk));
    buf.put_u32(MAGIC);
    buf.put_u8(chunk.format.byte());
    buf.put_u8(chunk.encoding.byte());

    let mut offsets = Vec::with_capacity(chunk.blocks.len());
    for b in &chunk.blocks {
        offsets.push(buf.len());
        buf.put_slice(&b.data);
    }

    let meta_offset = buf.len();
    put_uvarint(buf, chunk.blocks.len() as u64);
    for (b, offset) in chunk.blocks.iter().zip(offsets) {
        put_uvarint(buf, b.entries() as u64);
        put_varint(buf, b.mint());
        put_varint(buf, b.maxt());
        put_uvarint(buf, offset as u64);
        put_uvarint(buf, b.uncompressed_size() as u64);
        put_uvarint(buf, b.compressed_size() as u64);
        buf.put_u32(b.checksum);
    }
    let meta_len = buf.len() - meta_offset;

    if chunk.format == ChunkFormat::V3 {
        let crc = crc32c::crc32c(&buf[meta_offset..]);
        buf.put_u32(crc);
    }

    buf.put_u64(meta_offset as u64);
    buf.put_u64(meta_len as u64);
    buf.put_u32(MAGIC);
    Ok(())
}

fn read_u32_be(cursor: &mut &[u8]) -> Result<u32> {
    if cursor.len() < 4 {
        return Err(Error::Truncated("checksum field"));
    }
    let (head, rest) = cursor.split_at(4);
    *cursor = rest;
    Ok(u32::from_be_bytes([head[0], head[1], head[2], head[3]]))
}

fn u64_be(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(raw)
}

impl MemChunk {
    /// Serialize the sealed blocks of this chunk.
    ///
    /// The live head is not included; `close` first when it should be.
    pub fn to_bytes(&self) -> Result<Bytes> {
        self.to_bytes_with(BytesMut::new())
    }

    /// Like [`to_bytes`](MemChunk::to_bytes), reusing `buf`'s
    /// allocation. Output is byte-identical regardless of the buffer's
    /// prior contents.
    pub fn to_bytes_with(&self, mut buf: BytesMut) -> Result<Bytes> {
        buf.clear();
        encode(self, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Serialize into a writer. Returns the number of bytes written.
    pub fn write_to(&self, w: &mut impl Write) -> Result<u64> {
        let bytes = self.to_bytes()?;
        w.write_all(&bytes)?;
        Ok(bytes.len() as u64)
    }

    /// Parse a serialized chunk.
    ///
    /// Accepts V1, V2, and V3. Block payloads are zero-copy slices of
    /// `data`; every checksum the version carries is verified here.
    pub fn from_bytes(data: Bytes, block_size: usize, target_size: usize) -> Result<MemChunk> {
        if data.len() < HEADER_LEN + TRAILER_LEN_V1 {
            return Err(Error::Truncated("chunk header"));
        }
        let magic = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        if magic != MAGIC {
            return Err(Error::BadMagic);
        }
        let format = ChunkFormat::try_from(data[4])?;
        let encoding = Encoding::try_from(data[5])?;

        let trailer_len = match format {
            ChunkFormat::V1 => TRAILER_LEN_V1,
            _ => TRAILER_LEN,
        };
        if data.len() < HEADER_LEN + trailer_len {
            return Err(Error::Truncated("chunk trailer"));
        }
        let trailer = &data[data.len() - trailer_len..];
        let trailer_magic = u32::from_be_bytes([
            trailer[trailer_len - 4],
            trailer[trailer_len - 3],
            trailer[trailer_len - 2],
            trailer[trailer_len - 1],
        ]);
        if trailer_magic != MAGIC {
            return Err(Error::BadMagic);
        }

        let meta_offset = u64_be(&trailer[0..8]) as usize;
        let meta_end = match format {
            ChunkFormat::V1 => data.len() - trailer_len,
            _ => {
                let meta_len = u64_be(&trailer[8..16]) as usize;
                meta_offset.saturating_add(meta_len)
            }
        };
        let checked_end = if format == ChunkFormat::V3 {
            meta_end.saturating_add(4)
        } else {
            meta_end
        };
        if meta_offset < HEADER_LEN || meta_end < meta_offset || checked_end > data.len() - trailer_len
        {
            return Err(Error::Truncated("chunk metadata"));
        }

        let meta = &data[meta_offset..meta_end];
        if format == ChunkFormat::V3 {
            let stored = u32::from_be_bytes([
                data[meta_end],
                data[meta_end + 1],
                data[meta_end + 2],
                data[meta_end + 3],
            ]);
            if crc32c::crc32c(meta) != stored {
                return Err(Error::ChecksumMismatch("chunk metadata".to_string()));
            }
        }

        let mut cursor = meta;
        let count = read_uvarint(&mut cursor)? as usize;
        let mut blocks = Vec::with_capacity(count.min(1024));
        let mut cut_block_size = 0usize;
        for i in 0..count {
            let entries = read_uvarint(&mut cursor)? as usize;
            let mint = read_varint(&mut cursor)?;
            let maxt = read_varint(&mut cursor)?;
            let offset = read_uvarint(&mut cursor)? as usize;
            let uncompressed_size = read_uvarint(&mut cursor)? as usize;
            let compressed_size = read_uvarint(&mut cursor)? as usize;
            let checksum = if format != ChunkFormat::V1 {
                read_u32_be(&mut cursor)?
            } else {
                0
            };

            let end = offset.saturating_add(compressed_size);
            if offset < HEADER_LEN || end > meta_offset {
                return Err(Error::Truncated("block payload"));
            }
            let payload = data.slice(offset..end);
            if format != ChunkFormat::V1 && crc32c::crc32c(&payload) != checksum {
                return Err(Error::ChecksumMismatch(format!("block {i}")));
            }

            cut_block_size += compressed_size;
            blocks.push(SealedBlock {
                data: payload,
                entries,
                mint,
                maxt,
                uncompressed_size,
                checksum,
            });
        }

        debug!(blocks = count, format = %format, encoding = %encoding, "parsed chunk");

        Ok(MemChunk {
            encoding,
            format,
            head_fmt: HeadFormat::Ordered,
            blocks,
            head: HeadBlock::new(HeadFormat::Ordered),
            block_size,
            target_size,
            cut_block_size,
            closed: false,
        })
    }

    /// Checkpoint an in-progress chunk: the sealed part goes to
    /// `chunk_w` in the regular serialization format, the raw head (if
    /// non-empty) goes to `head_w` in the head checkpoint format.
    pub fn serialize_for_checkpoint_to(
        &self,
        chunk_w: &mut impl Write,
        head_w: &mut impl Write,
    ) -> Result<()> {
        self.write_to(chunk_w)?;
        if !self.head.is_empty() {
            self.head.checkpoint_to(head_w)?;
        }
        Ok(())
    }

    /// Restore a chunk from its checkpoint buffers. The result is
    /// structurally equal to the checkpointed chunk, head entries
    /// included.
    pub fn from_checkpoint(
        chunk_bytes: Bytes,
        head_bytes: &[u8],
        head_format: HeadFormat,
        block_size: usize,
        target_size: usize,
    ) -> Result<MemChunk> {
        let mut chunk = MemChunk::from_bytes(chunk_bytes, block_size, target_size)?;
        chunk.head = HeadBlock::from_checkpoint_bytes(head_bytes, head_format)?;
        chunk.head_fmt = chunk.head.format();
        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{DEFAULT_BLOCK_SIZE, DEFAULT_TARGET_SIZE};
    use crate::iter::{Direction, EntryIterator, IterContext};
    use crate::pipeline::NoopPipeline;

    fn filled_chunk(encoding: Encoding, entries: usize) -> MemChunk {
        let mut chunk = MemChunk::new(
            encoding,
            HeadFormat::Ordered,
            DEFAULT_BLOCK_SIZE,
            DEFAULT_TARGET_SIZE,
        );
        for i in 0..entries {
            chunk
                .append_line(i as i64, format!("log line number {i}"))
                .unwrap();
        }
        chunk.close().unwrap();
        chunk
    }

    fn collect(chunk: &MemChunk) -> Vec<(i64, Bytes)> {
        let mut it = chunk.iterator(
            IterContext::background(),
            0,
            i64::MAX,
            Direction::Forward,
            NoopPipeline,
        );
        let mut out = Vec::new();
        while it.next() {
            out.push((it.entry().timestamp, it.entry().line.clone()));
        }
        assert!(it.error().is_none());
        out
    }

    #[test]
    fn test_roundtrip_v3_is_byte_stable() {
        for encoding in crate::codec::ALL_ENCODINGS {
            let chunk = filled_chunk(encoding, 500);
            let b1 = chunk.to_bytes().unwrap();
            let parsed =
                MemChunk::from_bytes(b1.clone(), DEFAULT_BLOCK_SIZE, DEFAULT_TARGET_SIZE).unwrap();
            let b2 = parsed.to_bytes().unwrap();
            assert_eq!(b1, b2, "unstable serialization for {encoding}");
            assert_eq!(collect(&chunk), collect(&parsed));
        }
    }

    #[test]
    fn test_roundtrip_v2_iterates_identically() {
        for encoding in crate::codec::ALL_ENCODINGS {
            let mut chunk = MemChunk::new(
                encoding,
                HeadFormat::Ordered,
                DEFAULT_BLOCK_SIZE,
                DEFAULT_TARGET_SIZE,
            )
            .with_format(ChunkFormat::V2);
            for i in 0..300 {
                chunk.append_line(i, format!("v2 line {i}")).unwrap();
            }
            chunk.close().unwrap();

            let bytes = chunk.to_bytes().unwrap();
            let parsed =
                MemChunk::from_bytes(bytes, DEFAULT_BLOCK_SIZE, DEFAULT_TARGET_SIZE).unwrap();
            assert_eq!(parsed.format(), ChunkFormat::V2);
            assert_eq!(parsed.encoding(), encoding);
            assert_eq!(collect(&chunk), collect(&parsed));
        }
    }

    #[test]
    fn test_serialized_len_is_exact() {
        for encoding in [Encoding::None, Encoding::Gzip, Encoding::Snappy] {
            for format in [ChunkFormat::V2, ChunkFormat::V3] {
                let chunk = filled_chunk(encoding, 200).with_format(format);
                let bytes = chunk.to_bytes().unwrap();
                assert_eq!(bytes.len(), serialized_len(&chunk), "{encoding}/{format}");
                assert_eq!(chunk.compressed_size(), bytes.len());
            }
        }
    }

    #[test]
    fn test_bytes_with_hint_invariance() {
        let chunk = filled_chunk(Encoding::None, 50);
        let plain = chunk.to_bytes_with(BytesMut::new()).unwrap();
        let mut dirty = BytesMut::new();
        dirty.put_slice(&[1, 2, 3, 4, 5]);
        let hinted = chunk.to_bytes_with(dirty).unwrap();
        assert_eq!(plain, hinted);
    }

    #[test]
    fn test_serialization_excludes_open_head() {
        let mut chunk = MemChunk::new(
            Encoding::None,
            HeadFormat::Ordered,
            DEFAULT_BLOCK_SIZE,
            DEFAULT_TARGET_SIZE,
        );
        chunk.append_line(1, "sealed").unwrap();
        chunk.cut().unwrap();
        chunk.append_line(2, "still in head").unwrap();

        let parsed = MemChunk::from_bytes(
            chunk.to_bytes().unwrap(),
            DEFAULT_BLOCK_SIZE,
            DEFAULT_TARGET_SIZE,
        )
        .unwrap();
        let entries = collect(&parsed);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, 1);
    }

    #[test]
    fn test_write_v1_is_unsupported() {
        let chunk = filled_chunk(Encoding::None, 5).with_format(ChunkFormat::V1);
        assert!(matches!(
            chunk.to_bytes(),
            Err(Error::UnsupportedVersion(1))
        ));
    }

    /// Hand-build a V1 chunk: no per-block checksums, short trailer.
    fn v1_chunk_bytes() -> (Bytes, Vec<(i64, Bytes)>) {
        let mut source = MemChunk::new(
            Encoding::None,
            HeadFormat::Ordered,
            DEFAULT_BLOCK_SIZE,
            DEFAULT_TARGET_SIZE,
        );
        for i in 0..20 {
            source.append_line(i, format!("legacy line {i}")).unwrap();
        }
        source.close().unwrap();
        let expected = collect(&source);

        let mut buf = BytesMut::new();
        buf.put_u32(MAGIC);
        buf.put_u8(1);
        buf.put_u8(Encoding::None.byte());
        let mut offsets = Vec::new();
        for b in source.sealed_blocks() {
            offsets.push(buf.len());
            buf.put_slice(&b.data);
        }
        let meta_offset = buf.len();
        put_uvarint(&mut buf, source.sealed_blocks().len() as u64);
        for (b, offset) in source.sealed_blocks().iter().zip(offsets) {
            put_uvarint(&mut buf, b.entries() as u64);
            put_varint(&mut buf, b.mint());
            put_varint(&mut buf, b.maxt());
            put_uvarint(&mut buf, offset as u64);
            put_uvarint(&mut buf, b.uncompressed_size() as u64);
            put_uvarint(&mut buf, b.compressed_size() as u64);
        }
        buf.put_u64(meta_offset as u64);
        buf.put_u32(MAGIC);
        (buf.freeze(), expected)
    }

    #[test]
    fn test_read_format_v1() {
        let (bytes, expected) = v1_chunk_bytes();
        let parsed =
            MemChunk::from_bytes(bytes.clone(), DEFAULT_BLOCK_SIZE, DEFAULT_TARGET_SIZE).unwrap();
        assert_eq!(parsed.format(), ChunkFormat::V1);
        assert_eq!(collect(&parsed), expected);
        assert_eq!(parsed.compressed_size(), bytes.len());
    }

    #[test]
    fn test_parse_bad_magic() {
        let chunk = filled_chunk(Encoding::None, 5);
        let bytes = chunk.to_bytes().unwrap();

        let mut front = BytesMut::from(&bytes[..]);
        front[0] = 0xFF;
        assert!(matches!(
            MemChunk::from_bytes(front.freeze(), 0, 0),
            Err(Error::BadMagic)
        ));

        let mut back = BytesMut::from(&bytes[..]);
        let last = back.len() - 1;
        back[last] ^= 0xFF;
        assert!(matches!(
            MemChunk::from_bytes(back.freeze(), 0, 0),
            Err(Error::BadMagic)
        ));
    }

    #[test]
    fn test_parse_unknown_version_and_encoding() {
        let chunk = filled_chunk(Encoding::None, 5);
        let bytes = chunk.to_bytes().unwrap();

        let mut bad_version = BytesMut::from(&bytes[..]);
        bad_version[4] = 9;
        assert!(matches!(
            MemChunk::from_bytes(bad_version.freeze(), 0, 0),
            Err(Error::UnsupportedVersion(9))
        ));

        let mut bad_encoding = BytesMut::from(&bytes[..]);
        bad_encoding[5] = 200;
        assert!(matches!(
            MemChunk::from_bytes(bad_encoding.freeze(), 0, 0),
            Err(Error::UnknownEncoding(200))
        ));
    }

    #[test]
    fn test_parse_truncated_buffers() {
        let chunk = filled_chunk(Encoding::Gzip, 100);
        let bytes = chunk.to_bytes().unwrap();
        for keep in [0, 3, HEADER_LEN, HEADER_LEN + 5, bytes.len() - 5] {
            let result = MemChunk::from_bytes(bytes.slice(0..keep), 0, 0);
            assert!(result.is_err(), "accepted truncation to {keep} bytes");
        }
    }

    #[test]
    fn test_parse_corrupt_payload_fails_block_checksum() {
        let chunk = filled_chunk(Encoding::None, 100);
        let bytes = chunk.to_bytes().unwrap();
        let mut corrupt = BytesMut::from(&bytes[..]);
        corrupt[HEADER_LEN + 10] ^= 0xFF; // inside the first payload
        let err = MemChunk::from_bytes(corrupt.freeze(), 0, 0).unwrap_err();
        match err {
            Error::ChecksumMismatch(context) => assert!(context.contains("block 0")),
            other => panic!("expected checksum mismatch, got {other}"),
        }
    }

    #[test]
    fn test_parse_corrupt_meta_fails_meta_checksum() {
        let chunk = filled_chunk(Encoding::None, 100);
        let bytes = chunk.to_bytes().unwrap();
        // flip a byte inside the meta section (just before the meta crc
        // and trailer)
        let mut corrupt = BytesMut::from(&bytes[..]);
        let idx = corrupt.len() - TRAILER_LEN - 4 - 2;
        corrupt[idx] ^= 0x01;
        let err = MemChunk::from_bytes(corrupt.freeze(), 0, 0).unwrap_err();
        match err {
            Error::ChecksumMismatch(context) => assert!(context.contains("metadata")),
            other => panic!("expected meta checksum mismatch, got {other}"),
        }
    }

    #[test]
    fn test_checkpoint_roundtrip_structural_equality() {
        for head_format in [HeadFormat::Ordered, HeadFormat::Unordered] {
            let mut chunk = MemChunk::new(
                Encoding::Snappy,
                head_format,
                DEFAULT_BLOCK_SIZE,
                DEFAULT_TARGET_SIZE,
            );
            for i in 0..5 {
                chunk
                    .append_line(i * 1_000_000_000, format!("hi there - {i}"))
                    .unwrap();
            }
            chunk.cut().unwrap();
            for i in 5..10 {
                chunk
                    .append_line(i * 1_000_000_000, format!("hi there - {i}"))
                    .unwrap();
            }
            assert_eq!(chunk.sealed_blocks().len(), 1);

            let mut chunk_buf = Vec::new();
            let mut head_buf = Vec::new();
            chunk
                .serialize_for_checkpoint_to(&mut chunk_buf, &mut head_buf)
                .unwrap();

            let restored = MemChunk::from_checkpoint(
                Bytes::from(chunk_buf),
                &head_buf,
                head_format,
                DEFAULT_BLOCK_SIZE,
                DEFAULT_TARGET_SIZE,
            )
            .unwrap();
            assert_eq!(chunk, restored, "checkpoint mismatch for {head_format}");
        }
    }

    #[test]
    fn test_checkpoint_with_empty_head() {
        let chunk = filled_chunk(Encoding::Zstd, 10);
        let mut chunk_buf = Vec::new();
        let mut head_buf = Vec::new();
        chunk
            .serialize_for_checkpoint_to(&mut chunk_buf, &mut head_buf)
            .unwrap();
        assert!(head_buf.is_empty());

        let restored = MemChunk::from_checkpoint(
            Bytes::from(chunk_buf),
            &head_buf,
            HeadFormat::Ordered,
            DEFAULT_BLOCK_SIZE,
            DEFAULT_TARGET_SIZE,
        )
        .unwrap();
        assert_eq!(collect(&chunk), collect(&restored));
        assert!(restored.head().is_empty());
    }
}
