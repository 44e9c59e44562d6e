//! Iteration Statistics
//!
//! Query engines sitting above the chunk want to know how much data a
//! query actually touched. Iterators report into an [`IterStats`] sink
//! carried by the [`IterContext`](crate::iter::IterContext) they were
//! created with; the sink is shared through an `Arc`, so one context can
//! aggregate across many iterators.
//!
//! Byte accounting uses the same per-entry bound as the chunk's
//! capacity accounting (`line length + 2 * MAX_VARINT_LEN`), so the
//! bytes a full scan reports equal the chunk's `uncompressed_size()`
//! to the token.

use std::sync::atomic::{AtomicI64, Ordering};

/// Counters reported by entry and sample iterators.
#[derive(Debug, Default)]
pub struct IterStats {
    decompressed_bytes: AtomicI64,
    decompressed_lines: AtomicI64,
    head_bytes: AtomicI64,
    head_lines: AtomicI64,
    post_filter_lines: AtomicI64,
}

impl IterStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_decompressed(&self, bytes: i64) {
        self.decompressed_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.decompressed_lines.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_head(&self, bytes: i64) {
        self.head_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.head_lines.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_post_filter_line(&self) {
        self.post_filter_lines.fetch_add(1, Ordering::Relaxed);
    }

    /// Bytes decoded from sealed blocks.
    pub fn decompressed_bytes(&self) -> i64 {
        self.decompressed_bytes.load(Ordering::Relaxed)
    }

    /// Lines decoded from sealed blocks.
    pub fn decompressed_lines(&self) -> i64 {
        self.decompressed_lines.load(Ordering::Relaxed)
    }

    /// Bytes visited in the head block.
    pub fn head_bytes(&self) -> i64 {
        self.head_bytes.load(Ordering::Relaxed)
    }

    /// Lines visited in the head block.
    pub fn head_lines(&self) -> i64 {
        self.head_lines.load(Ordering::Relaxed)
    }

    /// Lines that survived the pipeline filter.
    pub fn post_filter_lines(&self) -> i64 {
        self.post_filter_lines.load(Ordering::Relaxed)
    }

    /// Total bytes processed: sealed blocks plus head.
    pub fn total_bytes_processed(&self) -> i64 {
        self.decompressed_bytes() + self.head_bytes()
    }

    /// Total lines processed: sealed blocks plus head.
    pub fn total_lines_processed(&self) -> i64 {
        self.decompressed_lines() + self.head_lines()
    }
}
