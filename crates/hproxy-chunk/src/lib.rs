//! Content-defined chunking via a 64-byte rolling checksum.
//!
//! [`split`] walks a synchronous reader and calls back with one byte
//! slice per chunk; [`split_async`] does the same over an `AsyncRead`
//! source, for chunking a live HTTP response body without buffering the
//! whole thing first.

mod chunker;
mod error;
mod rollsum;

pub use chunker::{split, split_async, MIN_BITS, MIN_CHUNK_SIZE};
pub use error::{ChunkError, ChunkResult};
pub use rollsum::RollSum;
