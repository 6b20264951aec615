//! Fetches a response body from origin and splits it into content-defined
//! chunks as it arrives: one HTTP GET, a running offset, SHA-256 per
//! chunk, and a cancellation check both before and while publishing each
//! chunk.

use bytes::Bytes;
use futures_util::StreamExt;
use http_body_util::{BodyStream, Full};
use hproxy_proto::{Header, HeaderMap, Request};
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, watch};
use tokio_util::io::StreamReader;

use crate::connect::{connect, split_authority};
use crate::error::{RetrieverError, RetrieverResult};
use crate::stream::{ChunkEvent, ChunkStream};

const CHUNK_EVENT_BUFFER: usize = 20;

/// Issues `req` against origin, verifies the response `ETag` matches
/// `expected_etag`, and returns a [`ChunkStream`] whose header is already
/// resolved and whose chunk events are produced by a background task.
pub async fn fetch(
    req: &Request,
    expected_etag: &str,
    cancel: watch::Receiver<bool>,
) -> RetrieverResult<ChunkStream> {
    let (addr, host_header) = split_authority(&req.host);
    let mut sender = connect(&host_header, &addr).await.map_err(RetrieverError::Connect)?;

    let mut builder = http::Request::builder().method(req.method.as_str()).uri(&req.url);
    for h in req.header.iter() {
        builder = builder.header(h.name.as_str(), h.value.as_str());
    }
    let http_req = builder
        .header("host", &host_header)
        .body(Full::<Bytes>::new(Bytes::new()))?;

    let resp = sender.send_request(http_req).await?;

    let origin_etag = resp
        .headers()
        .get(http::header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if origin_etag.as_deref() != Some(expected_etag) {
        return Err(RetrieverError::EntityChanged {
            expected: expected_etag.to_string(),
            origin: origin_etag,
        });
    }

    let status_code = resp.status().as_u16();
    let status = resp.status().canonical_reason().unwrap_or("").to_string();
    let content_length = resp
        .headers()
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(-1);
    let mut header_map = HeaderMap::new();
    for (name, value) in resp.headers().iter() {
        if let Ok(v) = value.to_str() {
            header_map.insert(name.as_str(), v);
        }
    }
    let header = Header {
        status_code,
        status,
        content_length,
        header: header_map,
    };

    let body = resp.into_body();
    let (tx, rx) = mpsc::channel(CHUNK_EVENT_BUFFER);

    tokio::spawn(chunk_body(body, tx, cancel));

    Ok(ChunkStream::new(header, rx))
}

async fn chunk_body(
    body: hyper::body::Incoming,
    tx: mpsc::Sender<ChunkEvent>,
    mut cancel: watch::Receiver<bool>,
) {
    use http_body_util::BodyExt;

    let byte_stream = BodyStream::new(body).filter_map(|frame| async move {
        match frame {
            Ok(frame) => frame.into_data().ok().map(Ok),
            Err(e) => Some(Err(std::io::Error::new(std::io::ErrorKind::Other, e))),
        }
    });
    let reader = StreamReader::new(byte_stream);

    let mut offset: u64 = 0;
    let result = hproxy_chunk::split_async(reader, |bytes: Vec<u8>| {
        let tx = tx.clone();
        let mut cancel = cancel.clone();
        let chunk_offset = offset;
        offset += bytes.len() as u64;
        async move {
            if *cancel.borrow() {
                return Err(std::io::Error::new(std::io::ErrorKind::Interrupted, "cancelled"));
            }
            let digest = Sha256::digest(&bytes);
            let chunk = hproxy_proto::Chunk::new(chunk_offset, bytes.len() as u64, &digest);
            tokio::select! {
                res = tx.send(ChunkEvent::Chunk(chunk)) => {
                    res.map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "receiver gone"))
                }
                _ = cancel.changed() => {
                    Err(std::io::Error::new(std::io::ErrorKind::Interrupted, "cancelled"))
                }
            }
        }
    })
    .await;

    let terminal = match result {
        Ok(()) => None,
        Err(e) => Some(e.to_string()),
    };
    let _ = tx.send(ChunkEvent::Done(terminal)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_authority_used_for_host_header() {
        let (addr, host) = split_authority("example.com");
        assert_eq!(addr, "example.com:80");
        assert_eq!(host, "example.com");
    }
}
