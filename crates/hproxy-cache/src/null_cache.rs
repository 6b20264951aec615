use async_trait::async_trait;

use crate::blob_cache::BlobCache;
use crate::error::{CacheError, CacheResult};

/// A cache that stores nothing. `read` always misses; `write` is a no-op.
/// Used when the proxy is started without `--cache_dir`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCache;

#[async_trait]
impl BlobCache for NullCache {
    async fn read(&self, _hex_digest: &str) -> CacheResult<Vec<u8>> {
        Err(CacheError::Absent)
    }

    async fn write(&self, _hex_digest: &str, _data: &[u8]) -> CacheResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_always_misses() {
        let cache = NullCache;
        assert!(matches!(cache.read("abc").await, Err(CacheError::Absent)));
    }

    #[tokio::test]
    async fn write_is_a_noop() {
        let cache = NullCache;
        assert!(cache.write("abc", b"data").await.is_ok());
        assert!(matches!(cache.read("abc").await, Err(CacheError::Absent)));
    }
}
