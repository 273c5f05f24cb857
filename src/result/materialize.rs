//! Conversion of raw backend rows into typed rows.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::SecondsFormat;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use super::value::{Column, DataType, RawValue, Value};

/// Errors raised while materializing backend rows.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MaterializeError {
    #[error("row has {actual} values but the result has {expected} columns")]
    Arity { expected: usize, actual: usize },
}

/// One result row: output field names mapped to values, in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing an existing value of the same name.
    pub fn insert(&mut self, name: &str, value: Value) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    /// Field value; `None` when the field is absent, as opposed to `Value::Null`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let pos = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(pos).1)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Rows of a query with their column metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
    /// Set by rows queries when another page may follow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

impl QueryResult {
    pub fn new(columns: Vec<Column>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            next_page_token: None,
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Convert one backend value.
pub fn materialize_value(raw: RawValue) -> Value {
    match raw {
        RawValue::Null => Value::Null,
        RawValue::Bool(b) => Value::Bool(b),
        RawValue::Int(n) => Value::Int(n),
        RawValue::UInt(n) => match i64::try_from(n) {
            Ok(n) => Value::Int(n),
            Err(_) => Value::String(n.to_string()),
        },
        RawValue::HugeInt(n) => match i64::try_from(n) {
            Ok(n) => Value::Int(n),
            Err(_) => Value::String(n.to_string()),
        },
        RawValue::Float(f) => Value::float(f),
        RawValue::Decimal(text) => decimal_value(&text),
        RawValue::Text(s) => Value::String(s),
        RawValue::Bytes(bytes) => Value::String(BASE64.encode(bytes)),
        RawValue::Timestamp(t) => Value::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        RawValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        RawValue::List(items) => Value::List(items.into_iter().map(materialize_value).collect()),
        RawValue::Json(json) => json_value(json),
    }
}

fn decimal_value(text: &str) -> Value {
    let trimmed = text.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Value::Int(n);
    }
    match trimmed.parse::<f64>() {
        Ok(f) => Value::float(f),
        Err(_) => Value::String(text.to_string()),
    }
}

fn json_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => match n.as_u64() {
                Some(u) => Value::String(u.to_string()),
                None => n.as_f64().map(Value::float).unwrap_or(Value::Null),
            },
        },
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => Value::List(items.into_iter().map(json_value).collect()),
        object @ serde_json::Value::Object(_) => Value::String(object.to_string()),
    }
}

/// Convert a backend row using the result's column names.
pub fn materialize(columns: &[Column], raw: Vec<RawValue>) -> Result<Row, MaterializeError> {
    if raw.len() != columns.len() {
        return Err(MaterializeError::Arity {
            expected: columns.len(),
            actual: raw.len(),
        });
    }
    let mut row = Row::new();
    for (column, value) in columns.iter().zip(raw) {
        row.insert(&column.name, materialize_value(value));
    }
    Ok(row)
}

/// Fill in `Unknown` column types from the first non-null value of each column.
pub fn infer_column_types(columns: &mut [Column], rows: &[Vec<RawValue>]) {
    for (i, column) in columns.iter_mut().enumerate() {
        if column.data_type != DataType::Unknown {
            continue;
        }
        if let Some(value) = rows
            .iter()
            .filter_map(|r| r.get(i))
            .find(|v| !v.is_null())
        {
            column.data_type = value.data_type();
        }
    }
}

/// Materialize a whole result set.
pub fn materialize_all(
    mut columns: Vec<Column>,
    rows: Vec<Vec<RawValue>>,
) -> Result<QueryResult, MaterializeError> {
    infer_column_types(&mut columns, &rows);
    let rows = rows
        .into_iter()
        .map(|raw| materialize(&columns, raw))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(QueryResult::new(columns, rows))
}
