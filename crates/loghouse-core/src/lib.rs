//! Core types shared across the loghouse workspace.
//!
//! This crate holds the leaf building blocks of the chunk store:
//!
//! - [`Entry`] and [`Sample`]: the records that flow through chunks
//! - [`varint`]: Go-compatible variable-length integer encoding used by
//!   the block frame format and the chunk metadata
//! - [`Error`] / [`Result`]: the one error enum every operation returns
//!
//! Everything here is dependency-light on purpose: the chunk container,
//! codecs, and iterators live in `loghouse-chunk` and build on these
//! types.

pub mod entry;
pub mod error;
pub mod varint;

pub use entry::{Entry, Sample};
pub use error::{Error, Result};
