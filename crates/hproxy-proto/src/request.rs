use serde::{Deserialize, Serialize};

use crate::header::HeaderMap;

/// A transportable HTTP request description.
///
/// Request bodies are out of scope for this system — `marshal` rejects
/// any attempt to build one with a nonzero `Content-Length`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "Method")]
    pub method: String,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "Host")]
    pub host: String,
    #[serde(rename = "Header")]
    pub header: HeaderMap,
}

impl Request {
    /// Canonical string used as part of the hasher's inflight-request key.
    pub fn canonical_string(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}",
            self.method,
            self.url,
            self.host,
            self.header.canonical_string()
        )
    }
}

/// A request sent from the proxy to the hasher: origin request plus the
/// strong validator the proxy already holds (from a prior HEAD probe).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HasherRequest {
    #[serde(rename = "HttpRequest")]
    pub request: Request,
    #[serde(rename = "Etag")]
    pub etag: String,
}

impl HasherRequest {
    pub fn inflight_key(&self) -> String {
        format!("{}\n{}", self.request.canonical_string(), self.etag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req() -> Request {
        let mut header = HeaderMap::new();
        header.insert("Accept", "*/*");
        Request {
            method: "GET".into(),
            url: "http://example.com/file.bin".into(),
            host: "example.com".into(),
            header,
        }
    }

    #[test]
    fn inflight_key_is_stable_for_identical_requests() {
        let a = HasherRequest {
            request: req(),
            etag: "\"abc\"".into(),
        };
        let b = HasherRequest {
            request: req(),
            etag: "\"abc\"".into(),
        };
        assert_eq!(a.inflight_key(), b.inflight_key());
    }

    #[test]
    fn inflight_key_differs_on_etag() {
        let mut a = HasherRequest {
            request: req(),
            etag: "\"abc\"".into(),
        };
        let b = HasherRequest {
            request: req(),
            etag: "\"def\"".into(),
        };
        a.etag = "\"abc\"".into();
        assert_ne!(a.inflight_key(), b.inflight_key());
    }

    #[test]
    fn wire_form_uses_pascal_case_keys() {
        let hasher_req = HasherRequest {
            request: req(),
            etag: "\"abc\"".into(),
        };
        let json = serde_json::to_value(&hasher_req).unwrap();
        assert!(json.get("HttpRequest").is_some());
        assert_eq!(json["Etag"], "\"abc\"");
        let inner = &json["HttpRequest"];
        assert_eq!(inner["Method"], "GET");
        assert_eq!(inner["URL"], "http://example.com/file.bin");
        assert_eq!(inner["Host"], "example.com");
        assert!(inner["Header"].is_object());
        assert_eq!(inner["Header"]["Accept"], serde_json::json!(["*/*"]));
        assert!(json.get("request").is_none());
    }
}
