//! Catalog snapshot - versioned bundle of the entire schema.

use std::collections::HashMap;

use rkyv::{Archive, Deserialize, Serialize};

use super::{ConstraintRecord, TableDef};
use crate::error::Error;

/// A versioned snapshot of the schema: table definitions plus registered
/// constraint records.
///
/// DDL operates copy-on-write: clone the current snapshot, mutate the
/// clone, validate, then apply. A failed DDL statement never touches the
/// live snapshot.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    /// Schema version (monotonically increasing).
    pub version: u64,
    /// Creation timestamp (microseconds since Unix epoch).
    pub created_at: u64,
    /// Table definitions keyed by name.
    pub tables: HashMap<String, TableDef>,
    /// Registered constraint records, in registration order.
    pub constraints: Vec<ConstraintRecord>,
}

impl CatalogSnapshot {
    /// Create an empty snapshot.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            created_at: crate::storage::current_timestamp(),
            tables: HashMap::new(),
            constraints: Vec::new(),
        }
    }

    /// Add a table to the snapshot.
    pub fn with_table(mut self, table: TableDef) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    /// Get a table by name.
    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }

    /// Get a table by name, failing with `UnknownTable`.
    pub fn require_table(&self, name: &str) -> Result<&TableDef, Error> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    /// All constraint records for a table, in registration order.
    pub fn constraints_for(&self, table: &str) -> Vec<&ConstraintRecord> {
        self.constraints
            .iter()
            .filter(|r| r.def.table() == table)
            .collect()
    }

    /// Find a constraint record by name, anywhere in the schema.
    pub fn constraint_by_name(&self, name: &str) -> Option<&ConstraintRecord> {
        self.constraints.iter().find(|r| r.def.name() == name)
    }

    /// The next free constraint id.
    pub fn next_constraint_id(&self) -> u64 {
        self.constraints.iter().map(|r| r.id + 1).max().unwrap_or(1)
    }

    /// List all table names.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(|s| s.as_str()).collect()
    }

    /// Serialize the snapshot to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a snapshot from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}

impl Default for CatalogSnapshot {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDef, ColumnType, ConstraintDef};

    fn sample_snapshot() -> CatalogSnapshot {
        let users = TableDef::new("users")
            .with_column(ColumnDef::new("id", ColumnType::Int).not_null())
            .with_column(ColumnDef::new("email", ColumnType::String));

        let mut snapshot = CatalogSnapshot::new(1).with_table(users);
        snapshot.constraints.push(ConstraintRecord {
            id: 1,
            temporary: false,
            index_name: Some("users_email_key_idx".to_string()),
            index_owned: true,
            def: ConstraintDef::unique("users_email_key", "users", "email"),
        });
        snapshot
    }

    #[test]
    fn test_lookup() {
        let snapshot = sample_snapshot();

        assert!(snapshot.table("users").is_some());
        assert!(snapshot.require_table("missing").is_err());
        assert_eq!(snapshot.constraints_for("users").len(), 1);
        assert!(snapshot.constraint_by_name("users_email_key").is_some());
        assert_eq!(snapshot.next_constraint_id(), 2);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let snapshot = sample_snapshot();
        let bytes = snapshot.to_bytes().unwrap();
        let decoded = CatalogSnapshot::from_bytes(&bytes).unwrap();

        assert_eq!(snapshot, decoded);
    }
}
