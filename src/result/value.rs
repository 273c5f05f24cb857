//! Typed values and column metadata.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Logical column type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Bool,
    Int,
    Float,
    Decimal,
    String,
    Timestamp,
    Date,
    Bytes,
    List,
    Json,
    #[default]
    Unknown,
}

impl DataType {
    /// Map a backend type name to a logical type.
    ///
    /// Follows SQLite's affinity rules for declared types, which also cover
    /// the common names used by other engines.
    pub fn from_sql_type(name: &str) -> Self {
        let upper = name.trim().to_uppercase();
        if upper.is_empty() {
            return DataType::Unknown;
        }
        if upper.starts_with("BOOL") {
            DataType::Bool
        } else if upper.contains("INT") {
            DataType::Int
        } else if upper.starts_with("DECIMAL") || upper.starts_with("NUMERIC") {
            DataType::Decimal
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            DataType::Float
        } else if upper.starts_with("TIMESTAMP") || upper.starts_with("DATETIME") {
            DataType::Timestamp
        } else if upper == "DATE" {
            DataType::Date
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            DataType::String
        } else if upper.contains("BLOB") || upper == "BYTEA" {
            DataType::Bytes
        } else if upper.starts_with("JSON") {
            DataType::Json
        } else if upper.ends_with("[]") || upper.starts_with("LIST") {
            DataType::List
        } else {
            DataType::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Bool => "bool",
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::Decimal => "decimal",
            DataType::String => "string",
            DataType::Timestamp => "timestamp",
            DataType::Date => "date",
            DataType::Bytes => "bytes",
            DataType::List => "list",
            DataType::Json => "json",
            DataType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column metadata of a result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Column {
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }
}

/// A value as produced by a storage engine, before materialization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    HugeInt(i128),
    Float(f64),
    /// Exact decimal in its textual form.
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    List(Vec<RawValue>),
    Json(serde_json::Value),
}

impl RawValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    /// Logical type of a non-null value.
    pub fn data_type(&self) -> DataType {
        match self {
            RawValue::Null => DataType::Unknown,
            RawValue::Bool(_) => DataType::Bool,
            RawValue::Int(_) | RawValue::UInt(_) | RawValue::HugeInt(_) => DataType::Int,
            RawValue::Float(_) => DataType::Float,
            RawValue::Decimal(_) => DataType::Decimal,
            RawValue::Text(_) => DataType::String,
            RawValue::Bytes(_) => DataType::Bytes,
            RawValue::Timestamp(_) => DataType::Timestamp,
            RawValue::Date(_) => DataType::Date,
            RawValue::List(_) => DataType::List,
            RawValue::Json(_) => DataType::Json,
        }
    }
}

/// A materialized result value.
///
/// Serializes untagged: `null`, `true`, `1`, `1.5`, `"x"`, `[...]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short type tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::Float(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
        }
    }

    /// Numeric view of the value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Float from an arbitrary `f64`; NaN and infinities become null.
    pub fn float(f: f64) -> Self {
        if f.is_finite() {
            Value::Float(f)
        } else {
            Value::Null
        }
    }

    /// The value as a bindable JSON parameter.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => {
                let mut buf = ryu::Buffer::new();
                f.write_str(buf.format(*x))
            }
            Value::String(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}
