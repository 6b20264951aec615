use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An HTTP header as a name-value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An ordered collection of HTTP headers.
///
/// Preserves insertion order and supports duplicate header names (e.g.
/// multiple `Set-Cookie` headers) internally as a flat `Vec<Header>`, but
/// serializes on the wire as an object mapping each header name to the
/// array of its values — `{name -> [values]}`, mirroring Go's
/// `http.Header` (`map[string][]string`) the way every other wire type
/// in this crate mirrors its Go counterpart's `encoding/json` shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<Header>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push(Header::new(name, value));
    }

    /// Get the first header value matching `name` (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Get all header values matching `name` (case-insensitive).
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
            .collect()
    }

    /// Remove all headers matching `name` (case-insensitive).
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|h| !h.name.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<Header> {
        self.entries
    }

    /// Canonical form used for inflight-request keying: headers sorted by
    /// `name` (case-insensitively) then `value`, so two requests that only
    /// differ in header order still coalesce.
    pub fn canonical_string(&self) -> String {
        let mut pairs: Vec<(String, &str)> = self
            .entries
            .iter()
            .map(|h| (h.name.to_ascii_lowercase(), h.value.as_str()))
            .collect();
        pairs.sort();
        pairs
            .into_iter()
            .map(|(n, v)| format!("{n}:{v}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Groups `entries` by header name (first-seen case, case-insensitive
    /// match) into `(name, values)` pairs in first-seen order — the shape
    /// the wire format serializes as a JSON object.
    fn grouped(&self) -> Vec<(&str, Vec<&str>)> {
        let mut groups: Vec<(&str, Vec<&str>)> = Vec::new();
        for h in &self.entries {
            match groups.iter_mut().find(|(name, _)| name.eq_ignore_ascii_case(&h.name)) {
                Some((_, values)) => values.push(h.value.as_str()),
                None => groups.push((h.name.as_str(), vec![h.value.as_str()])),
            }
        }
        groups
    }
}

impl FromIterator<Header> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = Header>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl FromIterator<(String, String)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(n, v)| Header::new(n, v)).collect(),
        }
    }
}

impl Serialize for HeaderMap {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(self.grouped())
    }
}

impl<'de> Deserialize<'de> for HeaderMap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(HeaderMapVisitor)
    }
}

struct HeaderMapVisitor;

impl<'de> Visitor<'de> for HeaderMapVisitor {
    type Value = HeaderMap;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of header name to an array of header values")
    }

    fn visit_map<A>(self, mut map: A) -> Result<HeaderMap, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = Vec::new();
        while let Some((name, values)) = map.next_entry::<String, Vec<String>>()? {
            for value in values {
                entries.push(Header::new(name.clone(), value));
            }
        }
        Ok(HeaderMap { entries })
    }
}
