//! Coalesces concurrent hasher requests for the same resource+ETag so
//! that only one origin fetch happens at a time.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{watch, OnceCell, RwLock};
use tracing::debug;

use crate::buffer::Buffer;

/// Keyed by [`hproxy_proto::HasherRequest::inflight_key`]. Each slot is a
/// `OnceCell` so that concurrent callers racing on the same key block on
/// the same initializer instead of each starting their own origin fetch —
/// the single-flight guarantee the once-guard in the spec's state machine
/// describes.
#[derive(Default, Clone)]
pub struct InflightTable {
    entries: Arc<RwLock<HashMap<String, Arc<OnceCell<Arc<Buffer>>>>>>,
}

impl InflightTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the buffer for `key`, creating it via `init` if this is the
    /// first caller to observe that key absent. Concurrent callers for the
    /// same new key share one `init` invocation: the second (and every
    /// later) caller awaits the first's in-progress cell instead of
    /// issuing its own origin fetch. If `init` fails, the cell is left
    /// uninitialized (via `get_or_try_init`) and the slot is dropped from
    /// the table so the next request retries cleanly rather than caching
    /// the failure forever.
    pub async fn get_or_try_init<F, Fut, E>(&self, key: &str, init: F) -> Result<Arc<Buffer>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<Buffer>, E>>,
    {
        let cell = {
            let mut map = self.entries.write().await;
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };
        match cell.get_or_try_init(init).await {
            Ok(buffer) => Ok(buffer.clone()),
            Err(e) => {
                self.remove(key).await;
                Err(e)
            }
        }
    }

    pub async fn remove(&self, key: &str) {
        self.entries.write().await.remove(key);
        debug!(key = %key, "hasher inflight entry evicted");
    }

    #[cfg(test)]
    async fn contains(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }
}

/// Convenience pairing of a cancel sender with the receiver handed to the
/// retriever, so callers don't have to juggle `watch::channel`'s tuple.
pub fn cancel_pair() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ChunkStream;
    use hproxy_proto::Header;
    use tokio::sync::mpsc;

    fn test_buffer() -> Arc<Buffer> {
        let (_tx, rx) = mpsc::channel(1);
        let header = Header {
            status_code: 200,
            status: "OK".into(),
            content_length: 0,
            header: Default::default(),
        };
        let source = ChunkStream::new(header, rx);
        let (cancel_tx, _) = cancel_pair();
        Arc::new(Buffer::new(source, cancel_tx))
    }

    #[tokio::test]
    async fn get_or_try_init_creates_on_first_call() {
        let table = InflightTable::new();
        assert!(!table.contains("k").await);

        let a = table
            .get_or_try_init("k", || async { Ok::<_, String>(test_buffer()) })
            .await
            .unwrap();
        let b = table
            .get_or_try_init("k", || async { Ok::<_, String>(test_buffer()) })
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(table.contains("k").await);
    }

    #[tokio::test]
    async fn remove_clears_the_entry() {
        let table = InflightTable::new();
        table
            .get_or_try_init("k", || async { Ok::<_, String>(test_buffer()) })
            .await
            .unwrap();
        table.remove("k").await;
        assert!(!table.contains("k").await);
    }

    #[tokio::test]
    async fn failed_init_is_not_cached_and_clears_the_slot() {
        let table = InflightTable::new();
        let result = table
            .get_or_try_init("k", || async { Err::<Arc<Buffer>, _>("boom".to_string()) })
            .await;
        assert_eq!(result.unwrap_err(), "boom");
        assert!(!table.contains("k").await);
    }

    #[tokio::test]
    async fn concurrent_callers_share_a_single_init() {
        let table = InflightTable::new();
        let init_calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let run = |table: InflightTable, counter: Arc<std::sync::atomic::AtomicUsize>| async move {
            table
                .get_or_try_init("k", || async move {
                    counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    Ok::<_, String>(test_buffer())
                })
                .await
                .unwrap()
        };

        let (a, b) = tokio::join!(
            run(table.clone(), init_calls.clone()),
            run(table.clone(), init_calls.clone())
        );

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(init_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
