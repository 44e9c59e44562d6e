//! Buffered Chunk Iteration
//!
//! Iteration over a chunk is pull-based, the shape query engines
//! integrate against: call `next()` until it returns `false`, read the
//! current record with `entry()`/`sample()`, then check `error()` to
//! distinguish exhaustion from failure, and `close()` to release decode
//! buffers back to the pool.
//!
//! ## How a read works
//!
//! ```text
//! sealed block ──decompress──► scratch buffer (pooled)
//!                                   │ walk (ts varint | len varint | line)
//!                                   ▼
//!                             time filter  ──out of range──► skip
//!                                   │
//!                                   ▼
//!                          pipeline / extractor ──None──► skip
//!                                   │
//!                                   ▼
//!                            current entry/sample
//! ```
//!
//! Each overlapping source (sealed blocks, then the head) becomes a
//! cursor. FORWARD cursors decode frames lazily out of the scratch
//! buffer; BACKWARD cursors decode the whole block into a frame table
//! first and walk it in reverse, which is why backward reads cost more
//! memory. Ordered chunks concatenate their cursors in direction order;
//! chunks whose sources overlap in time (unordered head format) run a
//! tournament merge across them instead.
//!
//! ## Range rule
//!
//! A bound pair `(mint, maxt)` selects timestamps `mint <= t < maxt`,
//! half-open on the right, plus `t == mint` always, so a point query
//! `(T, T)` returns the entries at `T`. Time filtering runs before the
//! pipeline sees a line.
//!
//! ## Errors and cancellation
//!
//! Errors are latched: the first failure makes `next()` return `false`
//! and stays readable through `error()`. A cancellation token flips the
//! same way, with `Error::Cancelled`. Closing is idempotent and always
//! succeeds in releasing scratch buffers.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use loghouse_core::varint::{read_uvarint, read_varint, MAX_VARINT_LEN};
use loghouse_core::{Entry, Error, Result, Sample};

use crate::block::SealedBlock;
use crate::codec::Encoding;
use crate::head::HeadBlock;
use crate::pipeline::{Labels, LinePipeline, SampleExtractor};
use crate::pool;
use crate::stats::IterStats;

/// Iteration direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Non-decreasing timestamps; equal timestamps keep append order.
    Forward,
    /// Non-increasing timestamps; equal timestamps reverse append order.
    Backward,
}

/// Cooperative cancellation handle checked by iterators on every
/// `next()` call.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-iteration context: cancellation plus a shared stats sink.
#[derive(Debug, Clone, Default)]
pub struct IterContext {
    cancel: Option<CancelToken>,
    stats: Arc<IterStats>,
}

impl IterContext {
    /// A context with no cancellation and a private stats sink.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_stats(stats: Arc<IterStats>) -> Self {
        Self {
            cancel: None,
            stats,
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn stats(&self) -> &Arc<IterStats> {
        &self.stats
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }
}

/// Pull-based iterator over log entries.
pub trait EntryIterator {
    /// Advance to the next entry. `false` means exhausted, failed, or
    /// closed; check [`error`](EntryIterator::error) to tell which.
    fn next(&mut self) -> bool;

    /// The current entry. Valid after `next()` returned `true`.
    fn entry(&self) -> &Entry;

    /// Labels attached to the current entry by the pipeline.
    fn labels(&self) -> &Labels;

    /// The first error encountered, if any.
    fn error(&self) -> Option<&Error>;

    /// Release decode buffers. Idempotent.
    fn close(&mut self);
}

/// Pull-based iterator over extracted samples.
pub trait SampleIterator {
    fn next(&mut self) -> bool;

    /// The current sample. Valid after `next()` returned `true`.
    fn sample(&self) -> Sample;

    /// Labels attached to the current sample by the extractor.
    fn labels(&self) -> &Labels;

    fn error(&self) -> Option<&Error>;

    fn close(&mut self);
}

// ---------------------------------------------------------------------
// Cursors: one per overlapping source, normalized so `current()` is
// always an emittable record (the settle step below applies the range
// rule and early-exits a source once it can't produce more matches).
// ---------------------------------------------------------------------

pub(crate) struct SealedCursor<'a> {
    block: &'a SealedBlock,
    encoding: Encoding,
    backward: bool,
    initialized: bool,
    scratch: Option<Vec<u8>>,
    /// forward read offset into scratch
    pos: usize,
    /// backward frame table: (ts, line start, line end)
    frames: Vec<(i64, usize, usize)>,
    /// backward frames not yet yielded
    remaining: usize,
    cur: Option<(i64, usize, usize)>,
}

pub(crate) struct HeadCursor<'a> {
    entries: &'a [Entry],
    /// entry indices in direction order
    order: Vec<usize>,
    next: usize,
    cur: Option<usize>,
    initialized: bool,
}

pub(crate) enum Cursor<'a> {
    Sealed(SealedCursor<'a>),
    Head(HeadCursor<'a>),
}

impl<'a> Cursor<'a> {
    pub(crate) fn sealed(block: &'a SealedBlock, encoding: Encoding, dir: Direction) -> Self {
        Cursor::Sealed(SealedCursor {
            block,
            encoding,
            backward: dir == Direction::Backward,
            initialized: false,
            scratch: None,
            pos: 0,
            frames: Vec::new(),
            remaining: 0,
            cur: None,
        })
    }

    pub(crate) fn head(head: &'a HeadBlock, dir: Direction) -> Self {
        let mut order = head.iter_order();
        if dir == Direction::Backward {
            order.reverse();
        }
        Cursor::Head(HeadCursor {
            entries: head.entries(),
            order,
            next: 0,
            cur: None,
            initialized: false,
        })
    }

    fn ensure_init(&mut self, stats: &IterStats) -> Result<()> {
        match self {
            Cursor::Sealed(c) => {
                if c.initialized {
                    return Ok(());
                }
                c.initialized = true;
                let mut scratch = pool::get_scratch(c.block.uncompressed_size());
                c.encoding.decompress(
                    &c.block.data,
                    &mut scratch,
                    c.block.uncompressed_size(),
                )?;
                if c.backward {
                    // materialize the frame table so it can be walked in
                    // reverse; this is the documented memory cost of
                    // BACKWARD iteration
                    let mut pos = 0;
                    while pos < scratch.len() {
                        let mut cursor = &scratch[pos..];
                        let before = cursor.len();
                        let ts = read_varint(&mut cursor)?;
                        let len = read_uvarint(&mut cursor)? as usize;
                        if cursor.len() < len {
                            return Err(Error::Truncated("block frame"));
                        }
                        let start = pos + (before - cursor.len());
                        c.frames.push((ts, start, start + len));
                        pos = start + len;
                        stats.add_decompressed((len + 2 * MAX_VARINT_LEN) as i64);
                    }
                    c.remaining = c.frames.len();
                }
                c.scratch = Some(scratch);
            }
            Cursor::Head(c) => {
                if c.initialized {
                    return Ok(());
                }
                c.initialized = true;
            }
        }
        self.advance(stats)
    }

    fn advance(&mut self, stats: &IterStats) -> Result<()> {
        match self {
            Cursor::Sealed(c) => {
                let Some(scratch) = c.scratch.as_ref() else {
                    c.cur = None;
                    return Ok(());
                };
                if c.backward {
                    if c.remaining == 0 {
                        c.cur = None;
                    } else {
                        c.remaining -= 1;
                        c.cur = Some(c.frames[c.remaining]);
                    }
                    return Ok(());
                }
                if c.pos >= scratch.len() {
                    c.cur = None;
                    return Ok(());
                }
                let mut cursor = &scratch[c.pos..];
                let before = cursor.len();
                let ts = read_varint(&mut cursor)?;
                let len = read_uvarint(&mut cursor)? as usize;
                if cursor.len() < len {
                    return Err(Error::Truncated("block frame"));
                }
                let start = c.pos + (before - cursor.len());
                c.pos = start + len;
                c.cur = Some((ts, start, start + len));
                stats.add_decompressed((len + 2 * MAX_VARINT_LEN) as i64);
                Ok(())
            }
            Cursor::Head(c) => {
                if c.next >= c.order.len() {
                    c.cur = None;
                    return Ok(());
                }
                let idx = c.order[c.next];
                c.next += 1;
                c.cur = Some(idx);
                stats.add_head((c.entries[idx].line.len() + 2 * MAX_VARINT_LEN) as i64);
                Ok(())
            }
        }
    }

    fn current(&self) -> Option<(i64, &[u8])> {
        match self {
            Cursor::Sealed(c) => {
                let scratch = c.scratch.as_ref()?;
                c.cur.map(|(ts, start, end)| (ts, &scratch[start..end]))
            }
            Cursor::Head(c) => c
                .cur
                .map(|idx| (c.entries[idx].timestamp, c.entries[idx].line.as_ref())),
        }
    }

    fn release(&mut self) {
        match self {
            Cursor::Sealed(c) => {
                c.cur = None;
                c.remaining = 0;
                c.frames = Vec::new();
                if let Some(scratch) = c.scratch.take() {
                    pool::put_scratch(scratch);
                }
            }
            Cursor::Head(c) => {
                c.cur = None;
                c.next = c.order.len();
            }
        }
    }

    /// Skip records outside the range and shut the cursor down once no
    /// further record can match, so `current()` is always emittable.
    fn settle(&mut self, dir: Direction, mint: i64, maxt: i64, stats: &IterStats) -> Result<()> {
        loop {
            let Some((ts, _)) = self.current() else {
                return Ok(());
            };
            let skip = match dir {
                Direction::Forward => ts < mint,
                Direction::Backward => ts >= maxt && ts != mint,
            };
            if skip {
                self.advance(stats)?;
                continue;
            }
            let stop = match dir {
                Direction::Forward => ts >= maxt && ts != mint,
                Direction::Backward => ts < mint,
            };
            if stop {
                // sources are time-sorted, so nothing later can match
                self.release();
            }
            return Ok(());
        }
    }
}

// ---------------------------------------------------------------------
// The driver: one implementation shared by entry and sample iteration.
// ---------------------------------------------------------------------

/// Converts in-range lines into the iterator's output records.
pub trait LineConsumer {
    type Out: Default;

    fn consume(&mut self, ts: i64, line: &[u8]) -> Option<(Self::Out, Labels)>;
}

/// Adapts a [`LinePipeline`] to entry output.
pub struct PipelineConsumer<P>(pub(crate) P);

impl<P: LinePipeline> LineConsumer for PipelineConsumer<P> {
    type Out = Entry;

    fn consume(&mut self, ts: i64, line: &[u8]) -> Option<(Entry, Labels)> {
        let (out, labels) = self.0.process(ts, line)?;
        let line = match out {
            Cow::Borrowed(b) => Bytes::copy_from_slice(b),
            Cow::Owned(v) => Bytes::from(v),
        };
        Some((Entry::new(ts, line), labels))
    }
}

/// Adapts a [`SampleExtractor`] to sample output.
pub struct ExtractorConsumer<E>(pub(crate) E);

impl<E: SampleExtractor> LineConsumer for ExtractorConsumer<E> {
    type Out = Sample;

    fn consume(&mut self, ts: i64, line: &[u8]) -> Option<(Sample, Labels)> {
        self.0.extract(ts, line)
    }
}

#[derive(Clone, Copy)]
enum Mode {
    /// Disjoint sources, visited one after another in direction order.
    Sequential { idx: usize },
    /// Overlapping sources, combined with a tournament merge.
    Merge { opened: bool },
}

/// The streaming iterator over a chunk's blocks and head.
///
/// Use it through [`EntryIterator`] or [`SampleIterator`]; construction
/// happens via `MemChunk::iterator` / `MemChunk::sample_iterator` or
/// the head block equivalents.
pub struct ChunkIter<'a, C: LineConsumer> {
    cursors: Vec<Cursor<'a>>,
    mode: Mode,
    dir: Direction,
    mint: i64,
    maxt: i64,
    consumer: C,
    ctx: IterContext,
    cur: C::Out,
    cur_labels: Labels,
    err: Option<Error>,
    closed: bool,
}

/// Entry iterator returned by chunk and head iteration.
pub type EntryIter<'a, P> = ChunkIter<'a, PipelineConsumer<P>>;

/// Sample iterator returned by chunk and head iteration.
pub type SampleIter<'a, E> = ChunkIter<'a, ExtractorConsumer<E>>;

impl<'a, C: LineConsumer> ChunkIter<'a, C> {
    pub(crate) fn new(
        cursors: Vec<Cursor<'a>>,
        overlapping: bool,
        dir: Direction,
        mint: i64,
        maxt: i64,
        ctx: IterContext,
        consumer: C,
    ) -> Self {
        let mode = if overlapping {
            Mode::Merge { opened: false }
        } else {
            Mode::Sequential { idx: 0 }
        };
        Self {
            cursors,
            mode,
            dir,
            mint,
            maxt,
            consumer,
            ctx,
            cur: C::Out::default(),
            cur_labels: Labels::empty(),
            err: None,
            closed: false,
        }
    }

    fn open_cursor(&mut self, idx: usize) -> Result<()> {
        let stats = self.ctx.stats.clone();
        self.cursors[idx].ensure_init(&stats)?;
        self.cursors[idx].settle(self.dir, self.mint, self.maxt, &stats)
    }

    fn step_cursor(&mut self, idx: usize) -> Result<()> {
        let stats = self.ctx.stats.clone();
        self.cursors[idx].advance(&stats)?;
        self.cursors[idx].settle(self.dir, self.mint, self.maxt, &stats)
    }

    /// Pick the cursor whose current record comes next in direction
    /// order. Returns `None` when every source is exhausted.
    fn pick(&mut self) -> Result<Option<usize>> {
        match self.mode {
            Mode::Sequential { mut idx } => {
                loop {
                    if idx >= self.cursors.len() {
                        self.mode = Mode::Sequential { idx };
                        return Ok(None);
                    }
                    self.open_cursor(idx)?;
                    if self.cursors[idx].current().is_some() {
                        self.mode = Mode::Sequential { idx };
                        return Ok(Some(idx));
                    }
                    self.cursors[idx].release();
                    idx += 1;
                    if self.ctx.is_cancelled() {
                        return Err(Error::Cancelled);
                    }
                }
            }
            Mode::Merge { opened } => {
                if !opened {
                    for idx in 0..self.cursors.len() {
                        self.open_cursor(idx)?;
                    }
                    self.mode = Mode::Merge { opened: true };
                }
                let mut best: Option<(usize, i64)> = None;
                for (idx, cursor) in self.cursors.iter().enumerate() {
                    let Some((ts, _)) = cursor.current() else {
                        continue;
                    };
                    let wins = match (&best, self.dir) {
                        (None, _) => true,
                        (Some((_, best_ts)), Direction::Forward) => ts < *best_ts,
                        (Some((_, best_ts)), Direction::Backward) => ts > *best_ts,
                    };
                    if wins {
                        best = Some((idx, ts));
                    }
                }
                Ok(best.map(|(idx, _)| idx))
            }
        }
    }

    fn advance_inner(&mut self) -> Result<bool> {
        loop {
            if self.ctx.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let Some(idx) = self.pick()? else {
                return Ok(false);
            };
            // current() is Some by construction after pick
            let Some((ts, line)) = self.cursors[idx].current() else {
                return Ok(false);
            };
            let processed = self.consumer.consume(ts, line);
            match processed {
                Some((out, labels)) => {
                    self.cur = out;
                    self.cur_labels = labels;
                    self.ctx.stats.add_post_filter_line();
                    self.step_cursor(idx)?;
                    return Ok(true);
                }
                None => {
                    self.step_cursor(idx)?;
                }
            }
        }
    }

    fn next_impl(&mut self) -> bool {
        if self.closed || self.err.is_some() {
            return false;
        }
        match self.advance_inner() {
            Ok(more) => more,
            Err(e) => {
                self.err = Some(e);
                false
            }
        }
    }

    /// Take ownership of the latched error, if any.
    pub fn take_error(&mut self) -> Option<Error> {
        self.err.take()
    }

    fn release_all(&mut self) {
        for cursor in &mut self.cursors {
            cursor.release();
        }
    }

    fn close_impl(&mut self) {
        if !self.closed {
            self.release_all();
            self.closed = true;
        }
    }
}

impl<'a, C: LineConsumer> Drop for ChunkIter<'a, C> {
    fn drop(&mut self) {
        self.close_impl();
    }
}

impl<'a, P: LinePipeline> EntryIterator for EntryIter<'a, P> {
    fn next(&mut self) -> bool {
        self.next_impl()
    }

    fn entry(&self) -> &Entry {
        &self.cur
    }

    fn labels(&self) -> &Labels {
        &self.cur_labels
    }

    fn error(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    fn close(&mut self) {
        self.close_impl();
    }
}

impl<'a, E: SampleExtractor> SampleIterator for SampleIter<'a, E> {
    fn next(&mut self) -> bool {
        self.next_impl()
    }

    fn sample(&self) -> Sample {
        self.cur
    }

    fn labels(&self) -> &Labels {
        &self.cur_labels
    }

    fn error(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    fn close(&mut self) {
        self.close_impl();
    }
}

// ---------------------------------------------------------------------
// Head block iteration: the head is a single in-memory source, so its
// iterators are the driver with one cursor.
// ---------------------------------------------------------------------

impl HeadBlock {
    /// Iterate the head's entries within `[mint, maxt)` (mint always
    /// inclusive) in the given direction.
    pub fn iterator<P: LinePipeline>(
        &self,
        ctx: IterContext,
        dir: Direction,
        mint: i64,
        maxt: i64,
        pipeline: P,
    ) -> EntryIter<'_, P> {
        let cursors = if self.is_empty() || self.maxt() < mint || maxt < self.mint() {
            Vec::new()
        } else {
            vec![Cursor::head(self, dir)]
        };
        ChunkIter::new(
            cursors,
            false,
            dir,
            mint,
            maxt,
            ctx,
            PipelineConsumer(pipeline),
        )
    }

    /// Sample-extracting variant of [`iterator`](HeadBlock::iterator).
    pub fn sample_iterator<E: SampleExtractor>(
        &self,
        ctx: IterContext,
        mint: i64,
        maxt: i64,
        extractor: E,
    ) -> SampleIter<'_, E> {
        let cursors = if self.is_empty() || self.maxt() < mint || maxt < self.mint() {
            Vec::new()
        } else {
            vec![Cursor::head(self, Direction::Forward)]
        };
        ChunkIter::new(
            cursors,
            false,
            Direction::Forward,
            mint,
            maxt,
            ctx,
            ExtractorConsumer(extractor),
        )
    }
}
