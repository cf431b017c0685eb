//! Rows returned by a data source and typed column access.

use std::collections::BTreeMap;

use catalog_core::{StorageError, Timestamp};
use chrono::{NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Format of timestamp columns delivered as text.
const TEXT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Timestamp(Timestamp),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Timestamp> for Value {
    fn from(v: Timestamp) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One result row, columns addressed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column setter.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.insert(column.into(), value.into());
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    fn require(&self, column: &str) -> Result<&Value, StorageError> {
        self.columns.get(column).ok_or_else(|| StorageError::Decode {
            column: column.to_string(),
            reason: "missing column".to_string(),
        })
    }

    fn mismatch(column: &str, expected: &str, found: &Value) -> StorageError {
        StorageError::Decode {
            column: column.to_string(),
            reason: format!("expected {expected}, found {found:?}"),
        }
    }

    /// Text column. NULL reads as an empty string, numbers are formatted.
    pub fn str(&self, column: &str) -> Result<String, StorageError> {
        match self.require(column)? {
            Value::Text(s) => Ok(s.clone()),
            Value::Null => Ok(String::new()),
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(f) => Ok(f.to_string()),
            other => Err(Self::mismatch(column, "text", other)),
        }
    }

    pub fn int(&self, column: &str) -> Result<i64, StorageError> {
        match self.require(column)? {
            Value::Int(i) => Ok(*i),
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| Self::mismatch(column, "integer", &Value::Text(s.clone()))),
            other => Err(Self::mismatch(column, "integer", other)),
        }
    }

    /// Integer column that must fit in 32 bits. Out-of-range values are a
    /// decode error, never truncated.
    pub fn int32(&self, column: &str) -> Result<i32, StorageError> {
        let wide = self.int(column)?;
        i32::try_from(wide).map_err(|_| StorageError::Decode {
            column: column.to_string(),
            reason: format!("{wide} does not fit in a 32-bit integer"),
        })
    }

    pub fn opt_int(&self, column: &str) -> Result<Option<i64>, StorageError> {
        match self.columns.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.int(column).map(Some),
        }
    }

    pub fn float(&self, column: &str) -> Result<f64, StorageError> {
        match self.require(column)? {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            Value::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| Self::mismatch(column, "float", &Value::Text(s.clone()))),
            other => Err(Self::mismatch(column, "float", other)),
        }
    }

    /// Lenient boolean: NULL and missing are false, numbers are non-zero,
    /// text is "1"/"true".
    pub fn force_bool(&self, column: &str) -> bool {
        match self.columns.get(column) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Int(i)) => *i != 0,
            Some(Value::Float(f)) => *f != 0.0,
            Some(Value::Text(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true"),
            _ => false,
        }
    }

    /// Timestamp column. Unparseable or NULL values read as `None`.
    pub fn timestamp(&self, column: &str) -> Option<Timestamp> {
        match self.columns.get(column)? {
            Value::Timestamp(ts) => Some(*ts),
            Value::Text(s) => NaiveDateTime::parse_from_str(s.trim(), TEXT_TIMESTAMP_FORMAT)
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive)),
            _ => None,
        }
    }
}
