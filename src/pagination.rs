//! Opaque page tokens for keyset pagination.
//!
//! A token holds the sort-key values of the last row of a page, as typed
//! JSON encoded with URL-safe base64 (no padding).
//!
//! ```rust
//! use mantis_metrics::pagination::{PageKey, PageToken};
//!
//! let token = PageToken::new(vec![PageKey::String("NO".into()), PageKey::Int(7)]);
//! let encoded = token.encode();
//! assert_eq!(PageToken::decode(&encoded).unwrap(), token);
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::format_instant;
use crate::result::Value;

/// Errors raised while decoding a page token.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PageTokenError {
    /// Not valid base64.
    #[error("malformed page token: invalid encoding")]
    InvalidEncoding,

    /// Valid base64 but not a token payload.
    #[error("malformed page token: {0}")]
    InvalidPayload(String),

    /// The token was issued for a different sort.
    #[error("page token has {actual} keys, expected {expected}")]
    KeyCount { expected: usize, actual: usize },
}

/// One typed sort-key value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PageKey {
    Null,
    Bool(bool),
    Int(i64),
    /// Carried as shortest round-trip text.
    Float(#[serde(with = "float_text")] f64),
    String(String),
    Timestamp(DateTime<Utc>),
}

impl PageKey {
    /// Key for a result value. Time fields are read back as timestamps.
    ///
    /// Lists cannot be compared and have no key.
    pub fn from_value(value: &Value, is_time: bool) -> Option<Self> {
        Some(match value {
            Value::Null => PageKey::Null,
            Value::Bool(b) => PageKey::Bool(*b),
            Value::Int(n) => PageKey::Int(*n),
            Value::Float(f) => PageKey::Float(*f),
            Value::String(s) if is_time => match DateTime::parse_from_rfc3339(s) {
                Ok(t) => PageKey::Timestamp(t.with_timezone(&Utc)),
                Err(_) => PageKey::String(s.clone()),
            },
            Value::String(s) => PageKey::String(s.clone()),
            Value::List(_) => return None,
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PageKey::Null)
    }

    /// The key as a bound parameter.
    pub fn to_param(&self) -> serde_json::Value {
        match self {
            PageKey::Null => serde_json::Value::Null,
            PageKey::Bool(b) => serde_json::Value::Bool(*b),
            PageKey::Int(n) => serde_json::Value::from(*n),
            PageKey::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            PageKey::String(s) => serde_json::Value::String(s.clone()),
            PageKey::Timestamp(t) => serde_json::Value::String(format_instant(t)),
        }
    }
}

mod float_text {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        let mut buf = ryu::Buffer::new();
        serializer.serialize_str(buf.format(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

/// Sort-key values of the last row of a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageToken {
    pub keys: Vec<PageKey>,
}

impl PageToken {
    pub fn new(keys: Vec<PageKey>) -> Self {
        Self { keys }
    }

    /// Encode as URL-safe base64 of the JSON key list.
    pub fn encode(&self) -> String {
        // A Vec of plain enums always serializes.
        let json = serde_json::to_vec(&self.keys).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> Result<Self, PageTokenError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| PageTokenError::InvalidEncoding)?;
        let keys: Vec<PageKey> = serde_json::from_slice(&bytes)
            .map_err(|e| PageTokenError::InvalidPayload(e.to_string()))?;
        Ok(Self { keys })
    }

    /// Decode and check the key count against the current sort.
    pub fn decode_for(token: &str, expected: usize) -> Result<Self, PageTokenError> {
        let decoded = Self::decode(token)?;
        if decoded.keys.len() != expected {
            return Err(PageTokenError::KeyCount {
                expected,
                actual: decoded.keys.len(),
            });
        }
        Ok(decoded)
    }
}
