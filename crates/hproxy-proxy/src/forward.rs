//! Direct, byte-for-byte forwarding for requests that `eligibility`
//! declined to deduplicate: fetch from origin, copy the response
//! headers, stream the body through unmodified.

use bytes::Bytes;
use http_body_util::Empty;
use hproxy_hasher::connect::{connect, split_authority};
use hproxy_proto::{HeaderMap, Request};

use crate::error::{ProxyError, ProxyResult};
use crate::sanitize::sanitize_headers;

pub struct ForwardedResponse {
    pub status: u16,
    pub header: HeaderMap,
    pub body: hyper::body::Incoming,
}

pub async fn forward(req: &Request) -> ProxyResult<ForwardedResponse> {
    let (addr, host_header) = split_authority(&req.host);
    let mut sender = connect(&host_header, &addr).await.map_err(ProxyError::Connect)?;

    let mut header = req.header.clone();
    sanitize_headers(&mut header);

    let mut builder = http::Request::builder()
        .method(req.method.as_str())
        .uri(&req.url)
        .header("host", &host_header);
    for h in header.iter() {
        builder = builder.header(h.name.as_str(), h.value.as_str());
    }
    let http_req = builder.body(Empty::<Bytes>::new())?;

    let resp = sender.send_request(http_req).await?;
    let status = resp.status().as_u16();

    let mut out_header = HeaderMap::new();
    for (name, value) in resp.headers().iter() {
        if let Ok(v) = value.to_str() {
            out_header.insert(name.as_str(), v);
        }
    }
    sanitize_headers(&mut out_header);

    Ok(ForwardedResponse {
        status,
        header: out_header,
        body: resp.into_body(),
    })
}
