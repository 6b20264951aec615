use serde::{Deserialize, Serialize};

/// The digest of one content-defined chunk, hex-encoded SHA-256.
///
/// Chunks of a single response are contiguous and non-overlapping:
/// `chunk[i].offset + chunk[i].length == chunk[i+1].offset`. `digest` is
/// kept as lowercase hex internally — it is used verbatim as the blob
/// cache's key — but travels over the wire as base64 bytes, matching
/// what a Go `[]byte` field serializes to (see [`wire`](crate::wire)).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(rename = "Offset")]
    pub offset: u64,
    #[serde(rename = "Length")]
    pub length: u64,
    #[serde(rename = "Digest", with = "digest_base64")]
    pub digest: String,
}

impl Chunk {
    pub fn new(offset: u64, length: u64, digest_bytes: &[u8]) -> Self {
        Self {
            offset,
            length,
            digest: hex::encode(digest_bytes),
        }
    }

    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// (De)serializes [`Chunk::digest`] as base64 on the wire while keeping
/// it as a hex string in memory.
mod digest_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(hex_digest: &str, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let bytes = hex::decode(hex_digest).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let bytes = STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)?;
        Ok(hex::encode(bytes))
    }
}
