use async_trait::async_trait;

use crate::error::CacheResult;

/// Content-addressed store for chunk blobs, keyed by lowercase hex
/// digest. Implementations never verify the digest against the stored
/// bytes on read — callers that need that guarantee re-hash themselves.
#[async_trait]
pub trait BlobCache: Send + Sync {
    async fn read(&self, hex_digest: &str) -> CacheResult<Vec<u8>>;
    async fn write(&self, hex_digest: &str, data: &[u8]) -> CacheResult<()>;
}
