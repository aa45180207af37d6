//! Table and column definitions.

use rkyv::{Archive, Deserialize, Serialize};

use crate::value::Value;

/// Scalar type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub enum ColumnType {
    /// Boolean.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// 64-bit float.
    Float,
    /// UTF-8 string.
    String,
}

impl ColumnType {
    /// Check whether a value is storable in a column of this type.
    /// NULL is storable in any column; nullability is checked separately.
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (ColumnType::Bool, Value::Bool(_))
                | (ColumnType::Int, Value::Int(_))
                | (ColumnType::Float, Value::Float(_))
                | (ColumnType::Float, Value::Int(_))
                | (ColumnType::String, Value::String(_))
        )
    }
}

/// A column definition.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name, unique within the table.
    pub name: String,
    /// Scalar type.
    pub ty: ColumnType,
    /// Whether NULL is storable. Defaults to true.
    pub nullable: bool,
}

impl ColumnDef {
    /// Create a nullable column.
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
        }
    }

    /// Mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// A table definition.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name, unique within the schema.
    pub name: String,
    /// Column definitions in declaration order.
    pub columns: Vec<ColumnDef>,
    /// Whether the table (and everything attached to it) is temporary.
    pub temporary: bool,
}

impl TableDef {
    /// Create an empty table definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            temporary: false,
        }
    }

    /// Builder-style column addition.
    pub fn with_column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Mark the table temporary.
    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Check whether a column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// All column names in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Rename a column in place. Returns false if the column is absent.
    pub fn rename_column(&mut self, old: &str, new: &str) -> bool {
        match self.columns.iter_mut().find(|c| c.name == old) {
            Some(column) => {
                column.name = new.to_string();
                true
            }
            None => false,
        }
    }
}
