//! The Chunk Container
//!
//! A [`MemChunk`] owns a sequence of sealed, compressed blocks plus one
//! mutable head block, all covering a single stream:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ MemChunk                                             │
//! │ ┌─────────┐ ┌─────────┐ ┌─────────┐  ┌─────────────┐ │
//! │ │ sealed  │ │ sealed  │ │ sealed  │  │ head        │ │
//! │ │ block 0 │ │ block 1 │ │ block 2 │  │ (mutable,   │ │
//! │ │ (gzip)  │ │ (gzip)  │ │ (gzip)  │  │  raw)       │ │
//! │ └─────────┘ └─────────┘ └─────────┘  └─────────────┘ │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Appends land in the head. When the head's accounted size reaches the
//! block size target, the next append cuts it: the entries are framed,
//! compressed, checksummed, and pushed as a sealed block, and a fresh
//! head takes over. `close` cuts whatever is left and freezes the chunk
//! (further appends fail with `Closed`; reads and serialization keep
//! working).
//!
//! ## Ordering
//!
//! With the ordered head format, appends must not regress in time,
//! across cuts too, so a fresh head still rejects timestamps behind the
//! last sealed block. With the unordered format anything goes; entries
//! are sorted (stably) when the head is cut or iterated, and iteration
//! across overlapping blocks falls back to a tournament merge.
//!
//! ## Capacity
//!
//! `space_for` answers "can this entry go in without blowing the
//! target": compressed bytes of sealed blocks plus the head's accounted
//! size plus the entry's frame bound, against the chunk target size.
//! With no target configured the chunk instead caps itself at
//! [`BLOCKS_PER_CHUNK`] sealed blocks, which bounds the block index.
//! Callers are expected to check `space_for` before appending; an
//! append into a full chunk fails with `ChunkFull`.
//!
//! ## Concurrency
//!
//! Single writer, external synchronization: `append`/`cut`/`close` must
//! be serialized by the caller, both against themselves and against
//! iterator creation. Any number of iterators may run concurrently once
//! the chunk stops mutating.

use bytes::Bytes;
use loghouse_core::{Entry, Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::block::{BlockInfo, SealedBlock};
use crate::codec::Encoding;
use crate::format::ChunkFormat;
use crate::head::{HeadBlock, HeadFormat};
use crate::iter::{
    ChunkIter, Cursor, Direction, EntryIter, EntryIterator, ExtractorConsumer, IterContext,
    PipelineConsumer, SampleIter,
};
use crate::pipeline::{LinePipeline, NoopPipeline, SampleExtractor};

/// Default block size target: 256 KiB of accounted head bytes.
pub const DEFAULT_BLOCK_SIZE: usize = 256 * 1024;

/// Default chunk size target: 1.5 MiB.
pub const DEFAULT_TARGET_SIZE: usize = 1536 * 1024;

/// Hard cap on sealed blocks when no target size is configured.
pub const BLOCKS_PER_CHUNK: usize = 10;

/// Construction parameters for a [`MemChunk`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Compression codec for sealed blocks (default: gzip)
    #[serde(default = "default_encoding")]
    pub encoding: Encoding,

    /// Head block format (default: ordered)
    #[serde(default = "default_head_format")]
    pub head_format: HeadFormat,

    /// Accounted head bytes that trigger a cut (default: 256 KiB)
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Soft ceiling for the whole chunk; zero switches to the
    /// blocks-per-chunk cap (default: 1.5 MiB)
    #[serde(default = "default_target_size")]
    pub target_size: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            encoding: default_encoding(),
            head_format: default_head_format(),
            block_size: default_block_size(),
            target_size: default_target_size(),
        }
    }
}

fn default_encoding() -> Encoding {
    Encoding::Gzip
}

fn default_head_format() -> HeadFormat {
    HeadFormat::Ordered
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

fn default_target_size() -> usize {
    DEFAULT_TARGET_SIZE
}

/// An in-memory, append-only, block-compressed chunk of one stream.
#[derive(Debug, Clone, PartialEq)]
pub struct MemChunk {
    pub(crate) encoding: Encoding,
    pub(crate) format: ChunkFormat,
    pub(crate) head_fmt: HeadFormat,
    pub(crate) blocks: Vec<SealedBlock>,
    pub(crate) head: HeadBlock,
    pub(crate) block_size: usize,
    pub(crate) target_size: usize,
    /// Compressed bytes of all sealed blocks
    pub(crate) cut_block_size: usize,
    pub(crate) closed: bool,
}

impl MemChunk {
    pub fn new(
        encoding: Encoding,
        head_format: HeadFormat,
        block_size: usize,
        target_size: usize,
    ) -> Self {
        Self {
            encoding,
            format: ChunkFormat::V3,
            head_fmt: head_format,
            blocks: Vec::new(),
            head: HeadBlock::new(head_format),
            block_size,
            target_size,
            cut_block_size: 0,
            closed: false,
        }
    }

    pub fn with_config(config: &ChunkConfig) -> Self {
        Self::new(
            config.encoding,
            config.head_format,
            config.block_size,
            config.target_size,
        )
    }

    /// Select the serialization format version. V3 is the default;
    /// writers may pick V2 for compatibility. V1 can be carried by a
    /// parsed chunk but is not writable.
    pub fn with_format(mut self, format: ChunkFormat) -> Self {
        self.format = format;
        self
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn format(&self) -> ChunkFormat {
        self.format
    }

    pub fn head_format(&self) -> HeadFormat {
        self.head_fmt
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The sealed blocks, in append order.
    pub fn sealed_blocks(&self) -> &[SealedBlock] {
        &self.blocks
    }

    /// The live head block.
    pub fn head(&self) -> &HeadBlock {
        &self.head
    }

    /// Append one entry.
    ///
    /// Fails with `Closed` on a closed chunk, `OutOfOrder` when an
    /// ordered chunk sees a timestamp regression (including against the
    /// last sealed block right after a cut), and `ChunkFull` when
    /// `space_for` would have answered `false`.
    pub fn append(&mut self, entry: &Entry) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }

        if self.head_fmt == HeadFormat::Ordered {
            let last_maxt = if self.head.is_empty() {
                self.blocks.last().map(|b| b.maxt())
            } else {
                Some(self.head.maxt())
            };
            if let Some(maxt) = last_maxt {
                if entry.timestamp < maxt {
                    return Err(Error::OutOfOrder);
                }
            }
        }

        if !self.space_for(entry) {
            return Err(Error::ChunkFull);
        }

        if self.head.uncompressed_size() >= self.block_size {
            self.cut()?;
        }

        self.head.append(entry.timestamp, entry.line.clone())
    }

    /// Whether accepting `entry` keeps the chunk within its target.
    pub fn space_for(&self, entry: &Entry) -> bool {
        if self.target_size > 0 {
            let projected =
                self.cut_block_size + self.head.uncompressed_size() + entry.frame_bound();
            return projected < self.target_size;
        }
        self.blocks.len() < BLOCKS_PER_CHUNK
    }

    /// Fill fraction relative to the configured target.
    pub fn utilization(&self) -> f64 {
        if self.target_size > 0 {
            return (self.cut_block_size + self.head.uncompressed_size()) as f64
                / self.target_size as f64;
        }
        self.uncompressed_size() as f64 / (BLOCKS_PER_CHUNK * self.block_size) as f64
    }

    /// Accounted uncompressed bytes across sealed blocks and head.
    pub fn uncompressed_size(&self) -> usize {
        let mut size = self.head.uncompressed_size();
        for b in &self.blocks {
            size += b.uncompressed_size();
        }
        size
    }

    /// Exact byte length of a full serialization of this chunk.
    pub fn compressed_size(&self) -> usize {
        crate::format::serialized_len(self)
    }

    /// Descriptors of the blocks overlapping `[mint, maxt]`, inclusive
    /// on both ends. A non-empty head is reported as a synthetic
    /// descriptor with zero compressed size.
    pub fn blocks(&self, mint: i64, maxt: i64) -> Vec<BlockInfo> {
        let mut infos: Vec<BlockInfo> = self
            .blocks
            .iter()
            .filter(|b| b.overlaps(mint, maxt))
            .map(|b| b.info())
            .collect();

        if !self.head.is_empty() && self.head.mint() <= maxt && mint <= self.head.maxt() {
            infos.push(BlockInfo {
                mint: self.head.mint(),
                maxt: self.head.maxt(),
                entries: self.head.len(),
                uncompressed_size: self.head.uncompressed_size(),
                compressed_size: 0,
            });
        }

        infos
    }

    /// Seal the head into a compressed block. No-op on an empty head.
    pub fn cut(&mut self) -> Result<()> {
        if self.head.is_empty() {
            return Ok(());
        }

        let (data, checksum) = self.head.to_block_bytes(self.encoding)?;
        debug!(
            entries = self.head.len(),
            uncompressed = self.head.uncompressed_size(),
            compressed = data.len(),
            encoding = %self.encoding,
            "cut head block"
        );

        self.cut_block_size += data.len();
        self.blocks.push(SealedBlock {
            data,
            entries: self.head.len(),
            mint: self.head.mint(),
            maxt: self.head.maxt(),
            uncompressed_size: self.head.uncompressed_size(),
            checksum,
        });
        self.head.reset();
        Ok(())
    }

    /// Cut the remaining head and refuse further appends. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.cut()?;
        self.closed = true;
        Ok(())
    }

    /// Build the direction-ordered cursor list for `[mint, maxt)` and
    /// detect whether the included sources overlap in time.
    fn cursors(&self, mint: i64, maxt: i64, dir: Direction) -> (Vec<Cursor<'_>>, bool) {
        let mut cursors = Vec::new();
        let mut last_maxt = i64::MIN;
        let mut overlapping = false;

        for b in &self.blocks {
            if !b.overlaps(mint, maxt) {
                continue;
            }
            if b.mint() < last_maxt {
                overlapping = true;
            }
            last_maxt = last_maxt.max(b.maxt());
            cursors.push(Cursor::sealed(b, self.encoding, dir));
        }

        if !self.head.is_empty() && self.head.mint() <= maxt && mint <= self.head.maxt() {
            if self.head.mint() < last_maxt {
                overlapping = true;
            }
            cursors.push(Cursor::head(&self.head, dir));
        }

        if dir == Direction::Backward {
            cursors.reverse();
        }
        (cursors, overlapping)
    }

    /// Iterate entries with timestamps in `[mint, maxt)` (mint always
    /// inclusive), feeding each line through `pipeline`.
    pub fn iterator<P: LinePipeline>(
        &self,
        ctx: IterContext,
        mint: i64,
        maxt: i64,
        dir: Direction,
        pipeline: P,
    ) -> EntryIter<'_, P> {
        let (cursors, overlapping) = self.cursors(mint, maxt, dir);
        ChunkIter::new(
            cursors,
            overlapping,
            dir,
            mint,
            maxt,
            ctx,
            PipelineConsumer(pipeline),
        )
    }

    /// Iterate samples extracted from entries in `[mint, maxt)`.
    /// Samples always stream forward.
    pub fn sample_iterator<E: SampleExtractor>(
        &self,
        ctx: IterContext,
        mint: i64,
        maxt: i64,
        extractor: E,
    ) -> SampleIter<'_, E> {
        let (cursors, overlapping) = self.cursors(mint, maxt, Direction::Forward);
        ChunkIter::new(
            cursors,
            overlapping,
            Direction::Forward,
            mint,
            maxt,
            ctx,
            ExtractorConsumer(extractor),
        )
    }

    /// Build a new chunk with identical configuration holding exactly
    /// the entries in `[from, through]`, both ends inclusive.
    ///
    /// Fails with `NoDataInRange` when the window holds nothing.
    pub fn rebound(&self, from: i64, through: i64) -> Result<MemChunk> {
        let mut out = MemChunk::new(
            self.encoding,
            self.head_fmt,
            self.block_size,
            self.target_size,
        )
        .with_format(self.format);

        // the iterator's right bound is exclusive; rebound is inclusive
        let mut it = self.iterator(
            IterContext::background(),
            from,
            through.saturating_add(1),
            Direction::Forward,
            NoopPipeline,
        );

        let mut appended = 0usize;
        while it.next() {
            out.append(it.entry())?;
            appended += 1;
        }
        if let Some(err) = it.take_error() {
            return Err(err);
        }
        if appended == 0 {
            return Err(Error::NoDataInRange);
        }

        out.close()?;
        Ok(out)
    }
}

/// Convenience for appending `(timestamp, line)` pairs in tests and
/// callers that build entries inline.
impl MemChunk {
    pub fn append_line(&mut self, timestamp: i64, line: impl Into<Bytes>) -> Result<()> {
        self.append(&Entry::new(timestamp, line))
    }
}
