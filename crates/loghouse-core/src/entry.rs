//! Entry and Sample Records
//!
//! This module defines the two record types that flow through a chunk.
//!
//! ## Entry
//! A single log line in a stream:
//! - **timestamp**: nanoseconds since epoch (signed 64-bit)
//! - **line**: the raw payload bytes: possibly empty, may contain
//!   newlines, and entirely opaque to the chunk
//!
//! ## Sample
//! The metric-shaped projection of a line, produced by a sample
//! extractor during iteration (never stored):
//! - **timestamp**: nanoseconds since epoch
//! - **value**: extracted 64-bit float (the count extractor emits 1.0)
//! - **hash**: a 64-bit line-derived hash for dedup on the query path
//!
//! ## Design Decisions
//! - Lines use `bytes::Bytes` so cloning an entry out of the head block
//!   is a refcount bump, not a copy
//! - `frame_bound` is the conservative per-entry size bound used by the
//!   chunk's capacity accounting: line length plus two maximum-width
//!   varints (timestamp + length prefix)

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::varint::MAX_VARINT_LEN;

/// A single log entry in a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Timestamp in nanoseconds since epoch
    pub timestamp: i64,

    /// Raw line payload
    pub line: Bytes,
}

impl Entry {
    pub fn new(timestamp: i64, line: impl Into<Bytes>) -> Self {
        Self {
            timestamp,
            line: line.into(),
        }
    }

    /// Upper bound on the encoded frame size of this entry.
    ///
    /// The frame is `ts varint | len varint | line`, so the bound is the
    /// line length plus two maximum-width varints. Capacity accounting
    /// uses this bound rather than the exact encoded width.
    pub fn frame_bound(&self) -> usize {
        self.line.len() + 2 * MAX_VARINT_LEN
    }
}

/// A sample extracted from a log line during iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Timestamp in nanoseconds since epoch
    pub timestamp: i64,

    /// Extracted value
    pub value: f64,

    /// 64-bit hash of the originating line
    pub hash: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry() {
        let e = Entry::new(42, "hello, world!");
        assert_eq!(e.timestamp, 42);
        assert_eq!(e.line, Bytes::from("hello, world!"));
    }

    #[test]
    fn test_entry_empty_line() {
        let e = Entry::new(9, Bytes::new());
        assert!(e.line.is_empty());
        assert_eq!(e.frame_bound(), 2 * MAX_VARINT_LEN);
    }

    #[test]
    fn test_entry_line_with_newlines() {
        let e = Entry::new(8, "hello, worl\nd8!");
        assert_eq!(e.line, Bytes::from("hello, worl\nd8!"));
    }

    #[test]
    fn test_entry_negative_timestamp() {
        let e = Entry::new(-1_000_000, "pre-epoch");
        assert_eq!(e.timestamp, -1_000_000);
    }

    #[test]
    fn test_frame_bound() {
        let e = Entry::new(0, "12345");
        assert_eq!(e.frame_bound(), 5 + 2 * MAX_VARINT_LEN);
    }

    #[test]
    fn test_entry_clone_eq() {
        let e = Entry::new(7, "payload");
        let cloned = e.clone();
        assert_eq!(e, cloned);
    }

    #[test]
    fn test_entry_ne_different_line() {
        let a = Entry::new(1, "x");
        let b = Entry::new(1, "y");
        assert_ne!(a, b);
    }

    #[test]
    fn test_entry_serde_roundtrip() {
        let e = Entry::new(1_700_000_000_000_000_000, "ts=... level=debug msg=hi");
        let json = serde_json::to_string(&e).expect("serialize");
        let back: Entry = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(e, back);
    }

    #[test]
    fn test_entry_serde_binary_line() {
        let e = Entry::new(3, Bytes::from(vec![0u8, 1, 2, 255, 254]));
        let json = serde_json::to_string(&e).expect("serialize");
        let back: Entry = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(e, back);
    }

    #[test]
    fn test_sample_fields() {
        let s = Sample {
            timestamp: 5,
            value: 1.0,
            hash: 0xDEAD_BEEF,
        };
        assert_eq!(s.timestamp, 5);
        assert_eq!(s.value, 1.0);
        assert_eq!(s.hash, 0xDEAD_BEEF);
    }

    #[test]
    fn test_sample_copy() {
        let s = Sample {
            timestamp: 1,
            value: 2.5,
            hash: 3,
        };
        let copied = s;
        assert_eq!(s, copied);
    }
}
