//! Error Types for loghouse
//!
//! This module defines all error types that can occur when building,
//! iterating, or parsing chunks.
//!
//! ## Error Categories
//!
//! ### Write-path Errors
//! - `OutOfOrder`: an ordered chunk rejected a timestamp regression
//! - `ChunkFull`: append attempted after `space_for` turned false
//! - `Closed`: append attempted on a closed chunk
//!
//! ### Data Integrity Errors
//! - `BadMagic`: buffer doesn't start (or end) with the chunk magic
//! - `ChecksumMismatch`: CRC32C verification failed for a block or the
//!   metadata section
//! - `Truncated`: the buffer ended before a structure was complete
//! - `VarintOverflow`: a varint ran past 64 bits
//!
//! ### Version/Compatibility Errors
//! - `UnsupportedVersion`: unknown format version byte, or a write was
//!   attempted in a read-only format (V1)
//! - `UnknownEncoding`: unknown compression id byte
//!
//! ### Compression Errors
//! - `Compress` / `Decompress`: the codec failed (decompression
//!   failures usually mean corruption)
//!
//! ### Query Errors
//! - `NoDataInRange`: a rebound produced zero entries
//! - `Cancelled`: iteration was aborted through its cancellation token
//!
//! All fallible operations return [`Result<T>`], aliased to
//! `Result<T, Error>`, so `?` propagation works throughout the
//! workspace.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("entry out of order")]
    OutOfOrder,

    #[error("chunk is full")]
    ChunkFull,

    #[error("chunk is closed")]
    Closed,

    #[error("no data in requested range")]
    NoDataInRange,

    #[error("invalid magic bytes")]
    BadMagic,

    #[error("unsupported chunk format version: {0}")]
    UnsupportedVersion(u8),

    #[error("unknown encoding id: {0}")]
    UnknownEncoding(u8),

    #[error("truncated chunk: {0}")]
    Truncated(&'static str),

    #[error("checksum mismatch in {0}")]
    ChecksumMismatch(String),

    #[error("compression failed: {0}")]
    Compress(String),

    #[error("decompression failed: {0}")]
    Decompress(String),

    #[error("varint overflows 64 bits")]
    VarintOverflow,

    #[error("iteration cancelled")]
    Cancelled,
}
