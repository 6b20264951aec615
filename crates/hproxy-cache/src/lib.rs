//! Content-addressed blob cache with hex-prefix directory fan-out.
//!
//! [`BlobCache`] is the trait the hasher and proxy code against;
//! [`NullCache`] discards everything (no `--cache_dir` given) and
//! [`DiskCache`] persists blobs under a root directory with atomic
//! writes.

mod blob_cache;
mod disk_cache;
mod error;
mod null_cache;

pub use blob_cache::BlobCache;
pub use disk_cache::DiskCache;
pub use error::{CacheError, CacheResult};
pub use null_cache::NullCache;
