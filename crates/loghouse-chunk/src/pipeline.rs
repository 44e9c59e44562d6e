//! Line Pipelines and Sample Extractors
//!
//! Iteration over a chunk feeds every in-range line through a
//! caller-supplied processing stage before it is handed back:
//!
//! - a [`LinePipeline`] may transform the line, attach a label set, or
//!   drop it entirely (returning `None`)
//! - a [`SampleExtractor`] converts a line into zero or one [`Sample`]
//!
//! The chunk depends only on these traits; query planning, label
//! matching, and parse expressions all live above this crate. Two
//! trivial pipelines ship here because the chunk's own tests and
//! benchmarks need them: [`NoopPipeline`] passes every line through
//! untouched and [`NoMatchPipeline`] drops everything. The
//! [`CountExtractor`] is the default extractor: one sample of value 1.0
//! per matched line, with a line-derived hash.
//!
//! Returning `Option` instead of a `(line, labels, keep)` triple is the
//! idiomatic rendering of the filter contract: `None` means "drop this
//! line", and the time filter has already run before the pipeline sees
//! anything.

use std::borrow::Cow;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use loghouse_core::Sample;

/// An opaque, cheaply clonable label set attached to processed lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels(Option<Arc<Vec<(String, String)>>>);

impl Labels {
    /// The empty label set. Does not allocate.
    pub fn empty() -> Self {
        Labels(None)
    }

    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        if pairs.is_empty() {
            Labels(None)
        } else {
            Labels(Some(Arc::new(pairs)))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.as_ref().map_or(true, |p| p.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, String)> {
        self.0.iter().flat_map(|p| p.iter())
    }
}

/// Per-line transform and filter applied during iteration.
pub trait LinePipeline {
    /// Labels of the stream this pipeline was built for.
    fn base_labels(&self) -> Labels;

    /// Process one line. Returning `None` drops the line; otherwise the
    /// (possibly transformed) line and its label set are emitted.
    fn process<'a>(&mut self, ts: i64, line: &'a [u8]) -> Option<(Cow<'a, [u8]>, Labels)>;
}

/// Converts a line into zero or one sample.
pub trait SampleExtractor {
    /// Labels of the stream this extractor was built for.
    fn base_labels(&self) -> Labels;

    /// Extract a sample from one line, or `None` to drop it.
    fn extract(&mut self, ts: i64, line: &[u8]) -> Option<(Sample, Labels)>;
}

/// Passes every line through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPipeline;

impl LinePipeline for NoopPipeline {
    fn base_labels(&self) -> Labels {
        Labels::empty()
    }

    fn process<'a>(&mut self, _ts: i64, line: &'a [u8]) -> Option<(Cow<'a, [u8]>, Labels)> {
        Some((Cow::Borrowed(line), Labels::empty()))
    }
}

/// Drops every line. Useful for measuring decode cost without yield
/// cost.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMatchPipeline;

impl LinePipeline for NoMatchPipeline {
    fn base_labels(&self) -> Labels {
        Labels::empty()
    }

    fn process<'a>(&mut self, _ts: i64, _line: &'a [u8]) -> Option<(Cow<'a, [u8]>, Labels)> {
        None
    }
}

/// The default extractor: value 1.0 per line, hash derived from the
/// line bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountExtractor;

impl SampleExtractor for CountExtractor {
    fn base_labels(&self) -> Labels {
        Labels::empty()
    }

    fn extract(&mut self, ts: i64, line: &[u8]) -> Option<(Sample, Labels)> {
        Some((
            Sample {
                timestamp: ts,
                value: 1.0,
                hash: line_hash(line),
            },
            Labels::empty(),
        ))
    }
}

/// 64-bit hash over raw line bytes, stable within a process.
pub fn line_hash(line: &[u8]) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    line.hash(&mut hasher);
    hasher.finish()
}
