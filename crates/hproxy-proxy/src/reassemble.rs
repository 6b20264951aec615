//! Bounded-parallel, strictly-ordered reassembly of a deduplicated
//! response.
//!
//! A `Semaphore`-bounded concurrent fetch pool feeds a FIFO queue of
//! `oneshot` promises so that out-of-order completions still flush to
//! the client byte-ordered: chunk `i`'s fetch may finish after chunk
//! `i+1`'s, but the output stream always yields `i` before `i+1`.

use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_RANGE, RANGE};
use http_body_util::{BodyExt, Empty};
use hproxy_cache::BlobCache;
use hproxy_hasher::connect::{connect, split_authority};
use hproxy_hasher::client::get_chunked;
use hproxy_proto::{Chunk, HasherRequest, Header, Request};
use tokio::sync::{mpsc, oneshot, watch, Semaphore};
use tracing::warn;

use crate::error::ProxyResult;
use crate::sanitize::{sanitize_headers, strip_range};
use hproxy_hasher::ChunkEvent;

/// At most this many range-fetches run concurrently per reassembled
/// response.
const FETCH_CONCURRENCY: usize = 2;
/// At most this many completed-or-pending chunk slots are buffered ahead
/// of the consumer, bounding memory for a fast producer / slow client.
const OUTPUT_QUEUE_CAPACITY: usize = 5;

/// Ordered stream of reassembled body bytes.
///
/// Holds the sender half of the hasher stream's cancel signal. Dropping
/// a `ReassembledBody` (e.g. because the client connection went away
/// mid-response) raises that cancel, which unwinds the hasher client,
/// the fan-out buffer, and the origin fetch in turn — the same
/// drop-triggers-cancel pattern `hproxy_hasher::BufferReader` uses for
/// its own subscribers.
pub struct ReassembledBody {
    rx: mpsc::Receiver<std::io::Result<Bytes>>,
    cancel: watch::Sender<bool>,
}

impl ReassembledBody {
    pub async fn next(&mut self) -> Option<std::io::Result<Bytes>> {
        self.rx.recv().await
    }
}

impl Drop for ReassembledBody {
    fn drop(&mut self) {
        let _ = self.cancel.send(true);
    }
}

pub async fn reassemble(
    origin_req: Request,
    hasher_addr: &str,
    etag: String,
    cache: Arc<dyn BlobCache>,
) -> ProxyResult<(Header, ReassembledBody)> {
    let (cancel_tx, cancel_rx) = hproxy_hasher::cancel_pair();

    // Marshal the request the hasher will reproduce: hop-by-hop headers
    // stripped, `Via` added, and any client-supplied `Range` dropped —
    // chunk fetching drives its own ranges from chunk offsets, not from
    // whatever (if anything) the original client asked for.
    let mut marshalled = origin_req.clone();
    sanitize_headers(&mut marshalled.header);
    strip_range(&mut marshalled.header);
    let hasher_req = HasherRequest {
        request: marshalled,
        etag,
    };
    let mut chunk_stream = get_chunked(hasher_addr, &hasher_req, cancel_rx).await?;
    let header = chunk_stream.header.clone();

    let (out_tx, out_rx) = mpsc::channel::<std::io::Result<Bytes>>(OUTPUT_QUEUE_CAPACITY);
    let (slot_tx, mut slot_rx) =
        mpsc::channel::<oneshot::Receiver<std::io::Result<Bytes>>>(OUTPUT_QUEUE_CAPACITY);

    let semaphore = Arc::new(Semaphore::new(FETCH_CONCURRENCY));
    let origin_req = Arc::new(origin_req);

    tokio::spawn(async move {
        loop {
            match chunk_stream.next_event().await {
                Some(ChunkEvent::Chunk(chunk)) => {
                    // Cache hits never touch the fetch semaphore — it
                    // bounds concurrent origin Range GETs only, per
                    // spec. Only a genuine miss acquires a permit and
                    // spawns a fetch worker.
                    if let Ok(data) = cache.read(&chunk.digest).await {
                        let (slot_tx_inner, slot_rx_inner) = oneshot::channel();
                        if slot_tx.send(slot_rx_inner).await.is_err() {
                            return;
                        }
                        let _ = slot_tx_inner.send(Ok(Bytes::from(data)));
                        continue;
                    }

                    let permit = semaphore
                        .clone()
                        .acquire_owned()
                        .await
                        .expect("semaphore is never closed while the producer holds it");
                    let (slot_tx_inner, slot_rx_inner) = oneshot::channel();
                    if slot_tx.send(slot_rx_inner).await.is_err() {
                        drop(permit);
                        return;
                    }

                    let cache = cache.clone();
                    let origin_req = origin_req.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        let result = fetch_miss(&origin_req, &chunk, cache).await;
                        let _ = slot_tx_inner.send(result);
                    });
                }
                Some(ChunkEvent::Done(None)) | None => return,
                Some(ChunkEvent::Done(Some(err))) => {
                    let (slot_tx_inner, slot_rx_inner) = oneshot::channel();
                    if slot_tx.send(slot_rx_inner).await.is_ok() {
                        let _ = slot_tx_inner
                            .send(Err(std::io::Error::new(std::io::ErrorKind::Other, err)));
                    }
                    return;
                }
            }
        }
    });

    tokio::spawn(async move {
        while let Some(slot) = slot_rx.recv().await {
            let Ok(result) = slot.await else { return };
            if out_tx.send(result).await.is_err() {
                return;
            }
        }
    });

    Ok((
        header,
        ReassembledBody {
            rx: out_rx,
            cancel: cancel_tx,
        },
    ))
}

/// Handles a cache miss: range-fetches from origin, fulfils the slot
/// immediately with whatever bytes (or emptiness) resulted, and writes
/// the fetched bytes into the cache on a detached task so a slow or
/// failing cache write never delays delivery to the client.
async fn fetch_miss(req: &Request, chunk: &Chunk, cache: Arc<dyn BlobCache>) -> std::io::Result<Bytes> {
    match range_fetch(req, chunk).await {
        Ok(data) => {
            let bytes = Bytes::from(data);
            let digest = chunk.digest.clone();
            let write_bytes = bytes.clone();
            tokio::spawn(async move {
                if let Err(e) = cache.write(&digest, &write_bytes).await {
                    warn!(digest = %digest, error = %e, "failed to write chunk to cache");
                }
            });
            Ok(bytes)
        }
        Err(e) => {
            warn!(
                chunk_offset = chunk.offset,
                digest = %chunk.digest,
                error = %e,
                "range fetch failed, truncating response with empty bytes"
            );
            Ok(Bytes::new())
        }
    }
}

async fn range_fetch(req: &Request, chunk: &Chunk) -> std::io::Result<Vec<u8>> {
    let (addr, host_header) = split_authority(&req.host);
    let mut sender = connect(&host_header, &addr)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    let range_value = format!("bytes={}-{}", chunk.offset, chunk.end().saturating_sub(1));
    let http_req = http::Request::builder()
        .method("GET")
        .uri(&req.url)
        .header("host", &host_header)
        .header(RANGE, range_value)
        .body(Empty::<Bytes>::new())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let resp = sender
        .send_request(http_req)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    if !resp.headers().contains_key(CONTENT_RANGE) {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "range fetch response carried no Content-Range header",
        ));
    }

    let collected = resp
        .into_body()
        .collect()
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    let bytes = collected.to_bytes();

    if bytes.len() as u64 != chunk.length {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "range fetch returned {} bytes, expected {}",
                bytes.len(),
                chunk.length
            ),
        ));
    }

    Ok(bytes.to_vec())
}
