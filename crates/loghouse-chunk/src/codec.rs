//! Compression Codec Registry
//!
//! Every chunk carries one compression encoding, identified by a stable
//! single-byte id persisted in the chunk header. Sealed block payloads
//! are compressed with that codec; everything else in the chunk (header,
//! metadata, trailer) stays uncompressed.
//!
//! ## Recognized Encodings
//!
//! | id | encoding  | backend                              |
//! |----|-----------|--------------------------------------|
//! | 0  | none      | plain copy                           |
//! | 1  | gzip      | `flate2` gzip                        |
//! | 2  | lz4-64k   | `lz4_flex`, size-prepended block     |
//! | 3  | lz4-256k  | `lz4_flex`, size-prepended block     |
//! | 4  | lz4-1m    | `lz4_flex`, size-prepended block     |
//! | 5  | lz4-4m    | `lz4_flex`, size-prepended block     |
//! | 6  | snappy    | `snap`, raw format                   |
//! | 7  | flate     | `flate2` raw deflate                 |
//! | 8  | zstd      | `zstd` level 3                       |
//!
//! The four LZ4 ids exist as distinct wire identifiers (they encode the
//! window size the format historically allowed); `lz4_flex`'s block
//! format takes no window parameter, so they compress identically.
//!
//! Compression is stateless from the chunk's perspective: `compress`
//! returns a fresh buffer, `decompress` fills a caller-owned scratch
//! buffer so iterators can pool and reuse allocations.

use std::fmt;
use std::io::{Read, Write};

use loghouse_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Compression codec for sealed block payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Encoding {
    None = 0,
    Gzip = 1,
    Lz4_64k = 2,
    Lz4_256k = 3,
    Lz4_1M = 4,
    Lz4_4M = 5,
    Snappy = 6,
    Flate = 7,
    Zstd = 8,
}

/// Every encoding, in wire-id order. Handy for exhaustive tests.
pub const ALL_ENCODINGS: [Encoding; 9] = [
    Encoding::None,
    Encoding::Gzip,
    Encoding::Lz4_64k,
    Encoding::Lz4_256k,
    Encoding::Lz4_1M,
    Encoding::Lz4_4M,
    Encoding::Snappy,
    Encoding::Flate,
    Encoding::Zstd,
];

impl TryFrom<u8> for Encoding {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Encoding::None),
            1 => Ok(Encoding::Gzip),
            2 => Ok(Encoding::Lz4_64k),
            3 => Ok(Encoding::Lz4_256k),
            4 => Ok(Encoding::Lz4_1M),
            5 => Ok(Encoding::Lz4_4M),
            6 => Ok(Encoding::Snappy),
            7 => Ok(Encoding::Flate),
            8 => Ok(Encoding::Zstd),
            other => Err(Error::UnknownEncoding(other)),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Encoding::None => "none",
            Encoding::Gzip => "gzip",
            Encoding::Lz4_64k => "lz4-64k",
            Encoding::Lz4_256k => "lz4-256k",
            Encoding::Lz4_1M => "lz4-1m",
            Encoding::Lz4_4M => "lz4-4m",
            Encoding::Snappy => "snappy",
            Encoding::Flate => "flate",
            Encoding::Zstd => "zstd",
        };
        f.write_str(name)
    }
}

impl Encoding {
    /// The single-byte id persisted in the chunk header.
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Compress `src` into a fresh buffer.
    pub fn compress(self, src: &[u8]) -> Result<Vec<u8>> {
        match self {
            Encoding::None => Ok(src.to_vec()),
            Encoding::Gzip => {
                let mut encoder =
                    flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder
                    .write_all(src)
                    .and_then(|_| encoder.finish())
                    .map_err(|e| Error::Compress(e.to_string()))
            }
            Encoding::Flate => {
                let mut encoder =
                    flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
                encoder
                    .write_all(src)
                    .and_then(|_| encoder.finish())
                    .map_err(|e| Error::Compress(e.to_string()))
            }
            Encoding::Lz4_64k | Encoding::Lz4_256k | Encoding::Lz4_1M | Encoding::Lz4_4M => {
                Ok(lz4_flex::compress_prepend_size(src))
            }
            Encoding::Snappy => snap::raw::Encoder::new()
                .compress_vec(src)
                .map_err(|e| Error::Compress(e.to_string())),
            Encoding::Zstd => {
                zstd::encode_all(src, 3).map_err(|e| Error::Compress(e.to_string()))
            }
        }
    }

    /// Decompress `src` into `dst`, replacing its contents.
    ///
    /// `size_hint` is the expected uncompressed size. It is untrusted
    /// (parsed metadata can lie) and only bounds the pre-reserve; the
    /// buffer still grows to whatever the payload actually inflates to.
    pub fn decompress(self, src: &[u8], dst: &mut Vec<u8>, size_hint: usize) -> Result<()> {
        const MAX_PREALLOC: usize = 8 * 1024 * 1024;
        dst.clear();
        let hint = size_hint.min(MAX_PREALLOC);
        if dst.capacity() < hint {
            dst.reserve(hint - dst.capacity());
        }
        match self {
            Encoding::None => {
                dst.extend_from_slice(src);
                Ok(())
            }
            Encoding::Gzip => {
                let mut decoder = flate2::read::GzDecoder::new(src);
                decoder
                    .read_to_end(dst)
                    .map(|_| ())
                    .map_err(|e| Error::Decompress(e.to_string()))
            }
            Encoding::Flate => {
                let mut decoder = flate2::read::DeflateDecoder::new(src);
                decoder
                    .read_to_end(dst)
                    .map(|_| ())
                    .map_err(|e| Error::Decompress(e.to_string()))
            }
            Encoding::Lz4_64k | Encoding::Lz4_256k | Encoding::Lz4_1M | Encoding::Lz4_4M => {
                *dst = lz4_flex::decompress_size_prepended(src)
                    .map_err(|e| Error::Decompress(e.to_string()))?;
                Ok(())
            }
            Encoding::Snappy => {
                *dst = snap::raw::Decoder::new()
                    .decompress_vec(src)
                    .map_err(|e| Error::Decompress(e.to_string()))?;
                Ok(())
            }
            Encoding::Zstd => {
                *dst = zstd::decode_all(src).map_err(|e| Error::Decompress(e.to_string()))?;
                Ok(())
            }
        }
    }
}
