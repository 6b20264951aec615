use serde::{Deserialize, Serialize};

use crate::header::HeaderMap;

/// Everything known about an origin response before its first chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    #[serde(rename = "StatusCode")]
    pub status_code: u16,
    #[serde(rename = "Status")]
    pub status: String,
    /// -1 when the origin did not send `Content-Length`.
    #[serde(rename = "ContentLength")]
    pub content_length: i64,
    #[serde(rename = "Header")]
    pub header: HeaderMap,
}

impl Header {
    pub fn etag(&self) -> Option<&str> {
        self.header.get("ETag")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_reads_from_header_map() {
        let mut header = HeaderMap::new();
        header.insert("ETag", "\"abc123\"");
        let h = Header {
            status_code: 200,
            status: "OK".into(),
            content_length: 1024,
            header,
        };
        assert_eq!(h.etag(), Some("\"abc123\""));
    }

    #[test]
    fn wire_form_uses_pascal_case_keys() {
        let mut header = HeaderMap::new();
        header.insert("Content-Type", "application/octet-stream");
        let h = Header {
            status_code: 200,
            status: "OK".into(),
            content_length: 4,
            header,
        };
        let json = serde_json::to_value(&h).unwrap();
        assert_eq!(json["StatusCode"], 200);
        assert_eq!(json["Status"], "OK");
        assert_eq!(json["ContentLength"], 4);
        assert!(json.get("status_code").is_none());
        assert!(json["Header"].is_object());
        assert_eq!(
            json["Header"]["Content-Type"],
            serde_json::json!(["application/octet-stream"])
        );
    }
}
