//! NDJSON-ish wire format used between the proxy and the hasher server.
//!
//! A hasher response body is the concatenation (no separators, no
//! newlines required) of: one [`Header`] value, zero or more
//! [`ChunkRecord`] values with `chunk` set, and exactly one terminal
//! [`ChunkRecord`] with `chunk: null` whose `err` carries the stream's
//! terminal error, if any.

use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;
use crate::response::Header;

/// One record in the chunk stream following the [`Header`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    #[serde(rename = "Chunk")]
    pub chunk: Option<Chunk>,
    #[serde(rename = "Err")]
    pub err: Option<String>,
}

impl ChunkRecord {
    pub fn chunk(chunk: Chunk) -> Self {
        Self {
            chunk: Some(chunk),
            err: None,
        }
    }

    pub fn terminal(err: Option<String>) -> Self {
        Self { chunk: None, err }
    }

    pub fn is_terminal(&self) -> bool {
        self.chunk.is_none()
    }
}

/// Incrementally decodes concatenated JSON values out of a growing byte
/// buffer, without requiring the whole body up front.
///
/// Callers `feed` newly-received bytes and repeatedly call `next_value`
/// until it returns `None`, meaning "not enough bytes yet — feed more".
#[derive(Default)]
pub struct JsonRecordReader {
    buf: Vec<u8>,
}

impl JsonRecordReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Attempts to decode the next complete JSON value from the buffer.
    ///
    /// Returns `Ok(None)` when the buffered bytes are a truncated prefix
    /// of a value (wait for more data via `feed`). Returns `Err` on
    /// malformed JSON.
    pub fn next_value<T>(&mut self) -> serde_json::Result<Option<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        let mut de = serde_json::Deserializer::from_slice(&self.buf).into_iter::<T>();
        match de.next() {
            Some(Ok(value)) => {
                let consumed = de.byte_offset();
                self.buf.drain(0..consumed);
                Ok(Some(value))
            }
            Some(Err(e)) if e.is_eof() => Ok(None),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_value_split_across_two_feeds() {
        let header = Header {
            status_code: 200,
            status: "OK".into(),
            content_length: 4,
            header: Default::default(),
        };
        let json = serde_json::to_vec(&header).unwrap();
        let (first, second) = json.split_at(json.len() / 2);

        let mut reader = JsonRecordReader::new();
        reader.feed(first);
        assert!(reader.next_value::<Header>().unwrap().is_none());

        reader.feed(second);
        let decoded = reader.next_value::<Header>().unwrap().unwrap();
        assert_eq!(decoded.status_code, 200);
    }

    #[test]
    fn decodes_sequential_concatenated_values() {
        let a = ChunkRecord::chunk(Chunk::new(0, 10, b"abcd"));
        let b = ChunkRecord::terminal(None);

        let mut buf = serde_json::to_vec(&a).unwrap();
        buf.extend(serde_json::to_vec(&b).unwrap());

        let mut reader = JsonRecordReader::new();
        reader.feed(&buf);

        let first = reader.next_value::<ChunkRecord>().unwrap().unwrap();
        assert!(!first.is_terminal());
        let second = reader.next_value::<ChunkRecord>().unwrap().unwrap();
        assert!(second.is_terminal());
        assert!(reader.next_value::<ChunkRecord>().unwrap().is_none());
    }

    #[test]
    fn malformed_json_is_an_error() {
        let mut reader = JsonRecordReader::new();
        reader.feed(b"{not json");
        // Still looks like a truncated prefix until more bytes confirm
        // it's actually broken; feed a closing brace that can't parse.
        reader.feed(b"}");
        assert!(reader.next_value::<ChunkRecord>().is_err());
    }

    #[test]
    fn chunk_record_wire_form_uses_pascal_case_keys() {
        let record = ChunkRecord::chunk(Chunk::new(0, 10, b"abcd"));
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("Chunk").is_some());
        assert!(json.get("Err").is_some());
        assert!(json.get("chunk").is_none());
        assert!(json.get("err").is_none());
    }
}
