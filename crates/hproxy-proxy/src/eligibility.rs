//! Decides whether a request is worth deduplicating: a HEAD probe must
//! come back with a strong `ETag` and a known `Content-Length` at or
//! above the configured cutoff. Anything else falls through to the
//! direct-forward path (`forward.rs`).

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hproxy_hasher::connect::{connect, split_authority};
use hproxy_proto::Request;

use crate::error::{ProxyError, ProxyResult};

pub struct Eligibility {
    pub etag: String,
    pub content_length: u64,
}

/// `None` means "not eligible, forward directly"; the reason is logged
/// by the caller rather than surfaced as an error, since falling through
/// to direct forwarding is the expected outcome for most requests.
pub async fn check(req: &Request, size_cutoff: u64) -> ProxyResult<Option<Eligibility>> {
    if req.method != "GET" {
        return Ok(None);
    }

    let (addr, host_header) = split_authority(&req.host);
    let mut sender = connect(&host_header, &addr).await.map_err(ProxyError::Connect)?;

    let http_req = http::Request::builder()
        .method("HEAD")
        .uri(&req.url)
        .header("host", &host_header)
        .body(Empty::<Bytes>::new())?;

    let resp = sender.send_request(http_req).await?;
    let etag = resp_etag(resp.headers());
    let content_length = resp
        .headers()
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let _ = resp.into_body().collect().await;

    match (etag, content_length) {
        (Some(etag), Some(len)) if is_strong(&etag) && len >= size_cutoff => {
            Ok(Some(Eligibility { etag, content_length: len }))
        }
        _ => Ok(None),
    }
}

fn resp_etag(headers: &http::HeaderMap) -> Option<String> {
    headers
        .get(http::header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// A weak validator (`W/"..."`) does not guarantee byte-identical
/// content across requests, so it cannot back chunk-level deduplication.
/// An empty value is rejected too — it carries no entity identity at all.
fn is_strong(etag: &str) -> bool {
    !etag.is_empty() && !etag.starts_with("W/")
}
