//! Dynamic values and row images.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use rkyv::{Archive, Deserialize, Serialize};

use crate::error::Error;

/// A dynamically typed column value.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// String value.
    String(String),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to compare two values under SQL semantics.
    ///
    /// Returns `None` when either side is NULL or the types are not
    /// comparable; callers treat that as UNKNOWN.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }

    /// Name of this value's type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
        }
    }

    /// Encode this value into `buf` in a format whose byte order matches
    /// value order, for use in index keys.
    ///
    /// - Integers: big-endian with the sign bit flipped
    /// - Floats: IEEE 754 bits with sign handling
    /// - Strings: UTF-8 bytes directly (lexicographic order)
    pub fn encode_sortable_into(&self, buf: &mut Vec<u8>) {
        match self {
            Value::Null => {
                buf.push(0x00); // Null sorts first
            }
            Value::Bool(b) => {
                buf.push(0x01);
                buf.push(if *b { 1 } else { 0 });
            }
            Value::Int(n) => {
                buf.push(0x02);
                let sortable = (*n as u64) ^ 0x8000_0000_0000_0000;
                buf.extend_from_slice(&sortable.to_be_bytes());
            }
            Value::Float(n) => {
                buf.push(0x03);
                let bits = n.to_bits();
                let sortable = if (bits & 0x8000_0000_0000_0000) != 0 {
                    !bits
                } else {
                    bits ^ 0x8000_0000_0000_0000
                };
                buf.extend_from_slice(&sortable.to_be_bytes());
            }
            Value::String(s) => {
                buf.push(0x04);
                buf.extend_from_slice(s.as_bytes());
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "'{}'", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// Identifier of a stored row within its table.
pub type RowId = u64;

const NULL: Value = Value::Null;

/// A row image: column values keyed by column name.
///
/// Columns absent from the map read as NULL.
#[derive(Debug, Clone, Default, PartialEq, Archive, Serialize, Deserialize)]
pub struct Row {
    values: HashMap<String, Value>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column assignment.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    /// Set a column value.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(column.into(), value.into());
    }

    /// Get a column value, if explicitly present.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Get a column value, reading absent columns as NULL.
    pub fn value(&self, column: &str) -> &Value {
        self.values.get(column).unwrap_or(&NULL)
    }

    /// Check whether a column is explicitly present.
    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    /// Iterate over explicitly present (column, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Number of explicitly present columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if no columns are present.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Move a column's value under a new name. Returns false if the
    /// column was absent.
    pub fn rename_column(&mut self, old: &str, new: &str) -> bool {
        match self.values.remove(old) {
            Some(value) => {
                self.values.insert(new.to_string(), value);
                true
            }
            None => false,
        }
    }

    /// Merge a patch into this row, returning the merged image.
    ///
    /// Patch values override, including explicit NULLs.
    pub fn merged(&self, patch: &Row) -> Row {
        let mut merged = self.clone();
        for (column, value) in patch.iter() {
            merged.values.insert(column.clone(), value.clone());
        }
        merged
    }

    /// Project the given columns out of this row, absent columns as NULL.
    pub fn project(&self, columns: &[String]) -> Vec<Value> {
        columns.iter().map(|c| self.value(c).clone()).collect()
    }

    /// Render the given columns as `a = 1, b = NULL` for error text.
    pub fn describe(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| format!("{} = {}", c, self.value(c)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Serialize the row to bytes using rkyv.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a row from bytes using rkyv.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}

/// Render a key-value slice as `(1, 'x')` for error text.
pub(crate) fn describe_values(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
