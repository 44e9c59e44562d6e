//! loghouse chunk - In-memory Block-compressed Log Storage
//!
//! This crate implements the chunk container at the heart of loghouse:
//! an append-only, block-compressed holder for the log entries of a
//! single stream.
//!
//! ## Data Flow
//!
//! ```text
//! ┌──────────┐
//! │ ingester │
//! └────┬─────┘
//!      │ append(ts, line)
//!      ▼
//! ┌─────────────────┐   head full    ┌──────────────────┐
//! │ head block      │ ──── cut ────► │ sealed blocks    │
//! │ (raw entries)   │                │ (compressed+CRC) │
//! └─────────────────┘                └────────┬─────────┘
//!                                             │ to_bytes()
//!                                             ▼
//!                                    ┌──────────────────┐
//!                                    │ serialized chunk │
//!                                    │ (V2/V3, V1 read) │
//!                                    └────────┬─────────┘
//!                                             │ from_bytes()
//!      ┌──────────────────────────────────────┘
//!      ▼
//! ┌─────────────────┐   pipeline /   ┌──────────────────┐
//! │ block iterators │ ── extractor ─►│ entries/samples  │
//! └─────────────────┘                └──────────────────┘
//! ```
//!
//! ## Main Components
//!
//! - [`MemChunk`]: the container: append, capacity accounting, cut,
//!   close, bounded iteration, serialization, rebound
//! - [`Encoding`]: the compression codec registry (gzip, lz4, snappy,
//!   flate, zstd, or none), one byte in the chunk header
//! - [`HeadBlock`] / [`HeadFormat`]: the mutable tail; ordered heads
//!   reject timestamp regressions, unordered heads sort on read
//! - [`EntryIterator`] / [`SampleIterator`]: pull-based iteration with
//!   time bounds, direction, cancellation, and latched errors
//! - [`LinePipeline`] / [`SampleExtractor`]: the caller-supplied
//!   per-line processing seam
//! - [`IterStats`]: how much data a query actually decoded
//!
//! ## Example
//!
//! ```
//! use loghouse_chunk::{
//!     Direction, Encoding, EntryIterator, HeadFormat, IterContext, MemChunk, NoopPipeline,
//! };
//!
//! let mut chunk = MemChunk::new(Encoding::Snappy, HeadFormat::Ordered, 256 * 1024, 0);
//! chunk.append_line(1, "first line").unwrap();
//! chunk.append_line(2, "second line").unwrap();
//!
//! let mut it = chunk.iterator(
//!     IterContext::background(),
//!     0,
//!     i64::MAX,
//!     Direction::Forward,
//!     NoopPipeline,
//! );
//! while it.next() {
//!     println!("{} {:?}", it.entry().timestamp, it.entry().line);
//! }
//! assert!(it.error().is_none());
//! ```
//!
//! ## Concurrency Model
//!
//! A chunk is single-writer, multi-reader with external
//! synchronization: callers serialize `append`/`cut`/`close` against
//! each other and against iterator creation. Iterators hold read-only
//! borrows, so the borrow checker enforces the "no appends while
//! borrowed" half mechanically. The only process-wide state is a pool
//! of decompression scratch buffers, which is safe under concurrent
//! use and purely an optimization.

pub mod block;
pub mod chunk;
pub mod codec;
pub mod format;
pub mod head;
pub mod iter;
pub mod pipeline;
mod pool;
pub mod stats;

pub use block::{BlockInfo, SealedBlock};
pub use chunk::{ChunkConfig, MemChunk, BLOCKS_PER_CHUNK, DEFAULT_BLOCK_SIZE, DEFAULT_TARGET_SIZE};
pub use codec::{Encoding, ALL_ENCODINGS};
pub use format::{ChunkFormat, MAGIC};
pub use head::{HeadBlock, HeadFormat};
pub use iter::{
    CancelToken, Direction, EntryIter, EntryIterator, IterContext, SampleIter, SampleIterator,
};
pub use pipeline::{
    CountExtractor, Labels, LinePipeline, NoMatchPipeline, NoopPipeline, SampleExtractor,
};
pub use stats::IterStats;

pub use loghouse_core::{Entry, Error, Result, Sample};
