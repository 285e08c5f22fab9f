//! # Packet Header
//!
//! A header is an open key/value map carried next to the blob. Values are
//! `serde_json::Value`, so strings, numbers, booleans, arrays and nested
//! objects are all allowed.
//!
//! Strict lookups return a [`LookupError`] when a key is missing or holds the
//! wrong kind of value. The soft helpers log and fall back instead, for call
//! sites where a default is acceptable.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, warn};

/// Header key carrying the blob length in bytes
pub const BLOB_SIZE_KEY: &str = "blob.size";

/// Outcome of a failed strict lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupError {
    NotFound,
    WrongType,
    /// A number that is negative or too large for `usize`
    OutOfRange,
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::NotFound => f.write_str("not found"),
            LookupError::WrongType => f.write_str("wrong type"),
            LookupError::OutOfRange => f.write_str("out of range"),
        }
    }
}

impl std::error::Error for LookupError {}

/// Key/value side channel of a packet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Header(Map<String, Value>);

impl Header {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Insert a value, returning the previous one
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Strict integer lookup. Only JSON numbers qualify; fractions are truncated.
    pub fn get_int(&self, key: &str) -> Result<i64, LookupError> {
        match self.0.get(key) {
            None => Err(LookupError::NotFound),
            Some(value) => number_as_i64(value).ok_or(LookupError::WrongType),
        }
    }

    /// Strict text lookup
    pub fn get_text(&self, key: &str) -> Result<&str, LookupError> {
        match self.0.get(key) {
            None => Err(LookupError::NotFound),
            Some(Value::String(text)) => Ok(text),
            Some(_) => Err(LookupError::WrongType),
        }
    }

    /// Declared blob length
    pub fn blob_size(&self) -> Result<usize, LookupError> {
        let size = self.get_int(BLOB_SIZE_KEY)?;
        usize::try_from(size).map_err(|_| LookupError::OutOfRange)
    }

    /// Set the blob length, overwriting any previous value
    pub fn set_blob_size(&mut self, size: usize) {
        self.0.insert(BLOB_SIZE_KEY.to_string(), Value::from(size));
    }

    /// Lenient integer lookup.
    ///
    /// Accepts JSON numbers and numeric strings. Anything else is logged and
    /// replaced by `fallback`.
    pub fn int_or(&self, key: &str, fallback: i64) -> i64 {
        let Some(entry) = self.0.get(key) else {
            debug!(key, "failed to find numeric entry");
            return fallback;
        };

        match entry {
            Value::String(text) => match text.trim().parse::<i64>() {
                Ok(value) => value,
                Err(_) => {
                    warn!(key, value = %text, "failed to convert entry into int");
                    fallback
                }
            },
            other => number_as_i64(other).unwrap_or_else(|| {
                warn!(key, kind = value_kind(other), "unhandled type for numeric entry");
                fallback
            }),
        }
    }

    /// Lenient text lookup; missing or non-string entries yield `""`
    pub fn text_or_empty(&self, key: &str) -> &str {
        match self.get_text(key) {
            Ok(text) => text,
            Err(_) => {
                debug!(key, "failed to find text entry");
                ""
            }
        }
    }

    /// Serialize to compact JSON
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.0)
    }

    /// Parse a JSON object
    pub fn from_json(raw: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice::<Map<String, Value>>(raw).map(Self)
    }
}

impl From<Map<String, Value>> for Header {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Header {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

fn number_as_i64(value: &Value) -> Option<i64> {
    let Value::Number(number) = value else {
        return None;
    };
    if let Some(int) = number.as_i64() {
        return Some(int);
    }
    if number.as_u64().is_some() {
        return Some(i64::MAX);
    }
    number
        .as_f64()
        .filter(|f| f.is_finite())
        .map(|f| f.trunc() as i64)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Header {
        [
            ("name", json!("report.csv")),
            ("count", json!(42)),
            ("ratio", json!(2.75)),
            ("digits", json!("17")),
            ("junk", json!("seventeen")),
            ("nested", json!({"a": [1, 2]})),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_strict_lookups() {
        let header = sample();
        assert_eq!(header.get_int("count"), Ok(42));
        assert_eq!(header.get_int("ratio"), Ok(2));
        assert_eq!(header.get_int("name"), Err(LookupError::WrongType));
        assert_eq!(header.get_int("missing"), Err(LookupError::NotFound));
        assert_eq!(header.get_text("name"), Ok("report.csv"));
        assert_eq!(header.get_text("nested"), Err(LookupError::WrongType));
    }

    #[test]
    fn test_int_or_accepts_numeric_strings() {
        let header = sample();
        assert_eq!(header.int_or("digits", -1), 17);
        assert_eq!(header.int_or("junk", -1), -1);
        assert_eq!(header.int_or("nested", -1), -1);
        assert_eq!(header.int_or("missing", 7), 7);
    }

    #[test]
    fn test_text_or_empty() {
        let header = sample();
        assert_eq!(header.text_or_empty("name"), "report.csv");
        assert_eq!(header.text_or_empty("count"), "");
    }

    #[test]
    fn test_blob_size() {
        let mut header = Header::new();
        assert_eq!(header.blob_size(), Err(LookupError::NotFound));
        header.insert(BLOB_SIZE_KEY, -4);
        assert_eq!(header.blob_size(), Err(LookupError::OutOfRange));
        header.set_blob_size(5);
        assert_eq!(header.blob_size(), Ok(5));
        header.insert(BLOB_SIZE_KEY, "5");
        assert_eq!(header.blob_size(), Err(LookupError::WrongType));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_json_roundtrip_keeps_insertion_order() {
        let header = sample();
        let raw = header.to_json().unwrap();
        assert!(raw.starts_with(br#"{"name":"report.csv","count":42"#));
        assert_eq!(Header::from_json(&raw).unwrap(), header);
    }

    #[test]
    fn test_from_json_rejects_non_objects() {
        assert!(Header::from_json(b"[1,2,3]").is_err());
        assert!(Header::from_json(b"{\"a\":").is_err());
    }
}
