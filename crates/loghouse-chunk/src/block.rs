//! Sealed Blocks
//!
//! A sealed block is what a cut produces: the head's entries framed,
//! compressed, and checksummed, plus the metadata needed to find and
//! verify the payload later (entry count, covered time interval,
//! uncompressed size, CRC32C of the compressed bytes).
//!
//! Sealed blocks are immutable. The chunk owns them in append order; in
//! ordered chunks neighbouring blocks cover disjoint, ascending time
//! intervals. The payload is a `Bytes`, so a block parsed out of a
//! serialized chunk is a zero-copy slice of the source buffer.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// An immutable, compressed run of entries inside a chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct SealedBlock {
    /// Compressed frame payload
    pub(crate) data: Bytes,

    /// Number of entries in the block
    pub(crate) entries: usize,

    /// Smallest timestamp in the block
    pub(crate) mint: i64,

    /// Largest timestamp in the block
    pub(crate) maxt: i64,

    /// Byte bound of the uncompressed frames (capacity accounting)
    pub(crate) uncompressed_size: usize,

    /// CRC32C over the compressed payload
    pub(crate) checksum: u32,
}

impl SealedBlock {
    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn mint(&self) -> i64 {
        self.mint
    }

    pub fn maxt(&self) -> i64 {
        self.maxt
    }

    pub fn uncompressed_size(&self) -> usize {
        self.uncompressed_size
    }

    pub fn compressed_size(&self) -> usize {
        self.data.len()
    }

    /// True when `[mint, maxt]` of this block intersects the inclusive
    /// interval `[from, through]`.
    pub(crate) fn overlaps(&self, from: i64, through: i64) -> bool {
        !(self.maxt < from || through < self.mint)
    }

    /// Descriptor for index and metadata queries.
    pub fn info(&self) -> BlockInfo {
        BlockInfo {
            mint: self.mint,
            maxt: self.maxt,
            entries: self.entries,
            uncompressed_size: self.uncompressed_size,
            compressed_size: self.data.len(),
        }
    }
}

/// Metadata describing one block of a chunk.
///
/// Returned by `MemChunk::blocks`; a non-empty head shows up as a
/// synthetic descriptor with a zero compressed size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Smallest timestamp covered
    pub mint: i64,

    /// Largest timestamp covered
    pub maxt: i64,

    /// Number of entries
    pub entries: usize,

    /// Uncompressed byte bound of the entries
    pub uncompressed_size: usize,

    /// Compressed payload size; zero for the synthetic head descriptor
    pub compressed_size: usize,
}
