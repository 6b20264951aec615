//! Request/response sanitization: hop-by-hop header stripping, `Via`
//! injection, loop detection. Strips the hop-by-hop headers RFC 7230
//! §6.1 names.

use hproxy_proto::{HeaderMap, Request};

const HOP_BY_HOP: &[&str] = &[
    "Connection",
    "Keep-Alive",
    "Proxy-Authorization",
    "TE",
    "Trailer",
    "Transfer-Encoding",
    "Upgrade",
];

pub const VIA_HEADER_VALUE: &str = "hproxy";

/// Strips hop-by-hop headers and appends `Via: hproxy`, mutating in
/// place.
pub fn sanitize_headers(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers.insert("Via", VIA_HEADER_VALUE);
}

/// True if this request already passed through an `hproxy` hop — used to
/// refuse proxying in a loop.
pub fn is_loop(headers: &HeaderMap) -> bool {
    headers
        .get_all("Via")
        .iter()
        .any(|v| v.contains(VIA_HEADER_VALUE))
}

/// Strips any client-supplied `Range` header from a request the proxy is
/// about to synthesize on its own (the hasher/origin GET it marshals for
/// the hashed path) — range selection there is driven entirely by chunk
/// offsets, not by whatever the original client asked for.
pub fn strip_range(headers: &mut HeaderMap) {
    headers.remove("Range");
}

/// Validates that `req` is transportable to the hasher: no request body
/// (`Content-Length` must be absent or zero).
pub fn validate_no_body(req: &Request) -> Result<(), &'static str> {
    match req.header.get("Content-Length") {
        None => Ok(()),
        Some("0") => Ok(()),
        Some(_) => Err("requests with a body cannot be deduplicated"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_hop_by_hop_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("Connection", "keep-alive");
        headers.insert("Transfer-Encoding", "chunked");
        headers.insert("Accept", "*/*");

        sanitize_headers(&mut headers);

        assert_eq!(headers.get("Connection"), None);
        assert_eq!(headers.get("Transfer-Encoding"), None);
        assert_eq!(headers.get("Accept"), Some("*/*"));
    }

    #[test]
    fn injects_via_header() {
        let mut headers = HeaderMap::new();
        sanitize_headers(&mut headers);
        assert_eq!(headers.get("Via"), Some(VIA_HEADER_VALUE));
    }

    #[test]
    fn detects_loop_via_existing_via_header() {
        let mut headers = HeaderMap::new();
        headers.insert("Via", "1.1 hproxy");
        assert!(is_loop(&headers));
    }

    #[test]
    fn no_via_header_is_not_a_loop() {
        let headers = HeaderMap::new();
        assert!(!is_loop(&headers));
    }

    #[test]
    fn rejects_requests_with_a_body() {
        let mut req_headers = HeaderMap::new();
        req_headers.insert("Content-Length", "128");
        let req = Request {
            method: "POST".into(),
            url: "http://example.com".into(),
            host: "example.com".into(),
            header: req_headers,
        };
        assert!(validate_no_body(&req).is_err());
    }

    #[test]
    fn accepts_requests_with_zero_or_absent_content_length() {
        let req = Request {
            method: "GET".into(),
            url: "http://example.com".into(),
            host: "example.com".into(),
            header: HeaderMap::new(),
        };
        assert!(validate_no_body(&req).is_ok());
    }

    #[test]
    fn strip_range_removes_client_supplied_range() {
        let mut headers = HeaderMap::new();
        headers.insert("Range", "bytes=0-10");
        headers.insert("Accept", "*/*");
        strip_range(&mut headers);
        assert_eq!(headers.get("Range"), None);
        assert_eq!(headers.get("Accept"), Some("*/*"));
    }
}
