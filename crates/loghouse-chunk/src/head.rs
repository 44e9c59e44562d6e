//! Head Block - the Mutable Tail of a Chunk
//!
//! Appends land in the head block, which holds not-yet-compressed
//! entries until the chunk cuts it into a sealed block. Two formats
//! exist:
//!
//! - **Ordered**: appends must not regress in time. The entry slice is
//!   therefore always sorted, iteration is the append order, and an
//!   out-of-order append fails with `OutOfOrder`.
//! - **Unordered**: appends are accepted in any order; iteration and
//!   cut sort the entries by timestamp (stable, so entries sharing a
//!   timestamp keep their append order).
//!
//! Size accounting charges every entry `line length + 2 * MAX_VARINT_LEN`
//! (the same bound the chunk's `space_for` uses), so a head's
//! `uncompressed_size` is exactly what its sealed block will report.
//!
//! The head has two serial forms: `to_block_bytes` frames and
//! compresses it for a cut, and `checkpoint_to`/`from_checkpoint_bytes`
//! write and replay the raw entries (format tag, count, frames) so an
//! in-progress chunk can be checkpointed without sealing.

use std::fmt;
use std::io::Write;

use bytes::Bytes;
use loghouse_core::varint::{put_uvarint, put_varint, read_uvarint, read_varint, MAX_VARINT_LEN};
use loghouse_core::{Entry, Error, Result};
use serde::{Deserialize, Serialize};

use crate::codec::Encoding;
use crate::pool;

/// Head block format, persisted as a single byte in head checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum HeadFormat {
    Ordered = 1,
    Unordered = 2,
}

impl HeadFormat {
    pub fn byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for HeadFormat {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(HeadFormat::Ordered),
            2 => Ok(HeadFormat::Unordered),
            other => Err(Error::UnsupportedVersion(other)),
        }
    }
}

impl fmt::Display for HeadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeadFormat::Ordered => f.write_str("ordered"),
            HeadFormat::Unordered => f.write_str("unordered"),
        }
    }
}

/// The mutable, uncompressed tail of a chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadBlock {
    format: HeadFormat,
    entries: Vec<Entry>,
    mint: i64,
    maxt: i64,
    size: usize,
}

impl HeadBlock {
    pub fn new(format: HeadFormat) -> Self {
        Self {
            format,
            entries: Vec::new(),
            mint: 0,
            maxt: 0,
            size: 0,
        }
    }

    pub fn format(&self) -> HeadFormat {
        self.format
    }

    /// Append one entry.
    ///
    /// In ordered format, a timestamp below the current `maxt` is
    /// rejected with `OutOfOrder`; equal timestamps are fine.
    pub fn append(&mut self, ts: i64, line: Bytes) -> Result<()> {
        if self.format == HeadFormat::Ordered && !self.entries.is_empty() && ts < self.maxt {
            return Err(Error::OutOfOrder);
        }

        if self.entries.is_empty() {
            self.mint = ts;
            self.maxt = ts;
        } else {
            self.mint = self.mint.min(ts);
            self.maxt = self.maxt.max(ts);
        }

        self.size += line.len() + 2 * MAX_VARINT_LEN;
        self.entries.push(Entry::new(ts, line));
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn mint(&self) -> i64 {
        self.mint
    }

    pub fn maxt(&self) -> i64 {
        self.maxt
    }

    /// Byte bound for the framed entries; see the module docs for the
    /// accounting rule.
    pub fn uncompressed_size(&self) -> usize {
        self.size
    }

    /// Entries in append order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Entry indices in iteration order: append order when ordered, a
    /// stable timestamp sort when unordered.
    pub(crate) fn iter_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        if self.format == HeadFormat::Unordered {
            order.sort_by_key(|&i| self.entries[i].timestamp);
        }
        order
    }

    /// Frame and compress the head for a cut.
    ///
    /// Returns the compressed payload and its CRC32C. Entry count,
    /// bounds, and uncompressed size are read off the head by the
    /// caller before it resets.
    pub fn to_block_bytes(&self, encoding: Encoding) -> Result<(Bytes, u32)> {
        let mut scratch = pool::get_scratch(self.size);
        scratch.clear();
        for &i in &self.iter_order() {
            let entry = &self.entries[i];
            put_varint(&mut scratch, entry.timestamp);
            put_uvarint(&mut scratch, entry.line.len() as u64);
            scratch.extend_from_slice(&entry.line);
        }

        let compressed = encoding.compress(&scratch);
        pool::put_scratch(scratch);
        let compressed = compressed?;
        let checksum = crc32c::crc32c(&compressed);
        Ok((Bytes::from(compressed), checksum))
    }

    /// Write the checkpoint form: format tag, entry count, then raw
    /// frames in append order.
    pub fn checkpoint_to(&self, w: &mut impl Write) -> Result<()> {
        let mut buf = Vec::with_capacity(self.size + MAX_VARINT_LEN + 1);
        buf.push(self.format.byte());
        put_uvarint(&mut buf, self.entries.len() as u64);
        for entry in &self.entries {
            put_varint(&mut buf, entry.timestamp);
            put_uvarint(&mut buf, entry.line.len() as u64);
            buf.extend_from_slice(&entry.line);
        }
        w.write_all(&buf)?;
        Ok(())
    }

    /// Rebuild a head from its checkpoint form.
    ///
    /// Empty input restores an empty head of the given format.
    pub fn from_checkpoint_bytes(data: &[u8], format: HeadFormat) -> Result<Self> {
        if data.is_empty() {
            return Ok(HeadBlock::new(format));
        }

        let mut cursor = data;
        let Some((&tag, rest)) = cursor.split_first() else {
            return Err(Error::Truncated("head checkpoint"));
        };
        cursor = rest;
        let tagged = HeadFormat::try_from(tag)?;

        let mut head = HeadBlock::new(tagged);
        let count = read_uvarint(&mut cursor)?;
        for _ in 0..count {
            let ts = read_varint(&mut cursor)?;
            let len = read_uvarint(&mut cursor)? as usize;
            if cursor.len() < len {
                return Err(Error::Truncated("head checkpoint entry"));
            }
            let line = Bytes::copy_from_slice(&cursor[..len]);
            cursor = &cursor[len..];
            head.append(ts, line)?;
        }
        Ok(head)
    }

    /// Drop all entries and reset bounds. Called after a cut.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.mint = 0;
        self.maxt = 0;
        self.size = 0;
    }
}
