//! Physical indexes.
//!
//! Each index is a sled tree mapping an order-preserving encoding of the
//! indexed column values to a row id. Unique indexes reject a second
//! fully-non-NULL key at insertion time; this insertion-time conflict
//! detection is the final arbiter of uniqueness, with the constraint
//! layer's probe acting as an early fast-fail. Keys containing NULL are
//! stored with a row-id suffix so they never collide, mirroring SQL's
//! any-NULL-means-distinct rule.

use std::sync::Arc;

use dashmap::DashMap;
use sled::{Db, Tree};

use crate::error::{ConstraintError, Error, SchemaError};
use crate::value::{describe_values, Row, RowId, Value};

/// Prefix for index trees.
const INDEX_TREE_PREFIX: &str = "index:";

/// Specification for creating an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Index name, unique across the database.
    pub name: String,
    /// Indexed table.
    pub table: String,
    /// Indexed columns, in key order.
    pub columns: Vec<String>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
}

impl IndexSpec {
    /// Create a non-unique index spec.
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    /// Mark the index unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// A physical index over one table's columns.
pub struct TableIndex {
    name: String,
    table: String,
    columns: Vec<String>,
    unique: bool,
    tree: Tree,
}

impl TableIndex {
    fn new(spec: IndexSpec, tree: Tree) -> Self {
        Self {
            name: spec.name,
            table: spec.table,
            columns: spec.columns,
            unique: spec.unique,
            tree,
        }
    }

    /// Index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Indexed table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Indexed columns, in key order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether the index enforces uniqueness.
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Project this index's key values out of a row.
    pub fn project(&self, row: &Row) -> Vec<Value> {
        row.project(&self.columns)
    }

    fn encode_key(values: &[Value]) -> Vec<u8> {
        let mut key = Vec::new();
        for value in values {
            value.encode_sortable_into(&mut key);
            key.push(0x00);
        }
        key
    }

    fn has_null(values: &[Value]) -> bool {
        values.iter().any(Value::is_null)
    }

    /// Insert an index entry for a row.
    ///
    /// For a unique index with a fully-non-NULL key, an existing entry
    /// for a different row is a constraint violation and nothing is
    /// written.
    pub fn insert(&self, values: &[Value], row_id: RowId) -> Result<(), Error> {
        let mut key = Self::encode_key(values);

        if self.unique && !Self::has_null(values) {
            if let Some(existing) = self.tree.get(&key)? {
                let existing_id = decode_row_id(&existing)?;
                if existing_id != row_id {
                    return Err(Error::Constraint(ConstraintError::UniqueViolation {
                        constraint: self.name.clone(),
                        table: self.table.clone(),
                        columns: self.columns.clone(),
                        values: describe_values(values),
                    }));
                }
            }
        } else {
            // NULL-containing or non-unique entries never collide.
            key.extend_from_slice(&row_id.to_be_bytes());
        }

        self.tree.insert(key, &row_id.to_be_bytes())?;
        Ok(())
    }

    /// Remove the index entry for a row.
    pub fn remove(&self, values: &[Value], row_id: RowId) -> Result<(), Error> {
        let mut key = Self::encode_key(values);

        if self.unique && !Self::has_null(values) {
            // Only remove if the entry is actually ours.
            if let Some(existing) = self.tree.get(&key)? {
                if decode_row_id(&existing)? == row_id {
                    self.tree.remove(key)?;
                }
            }
        } else {
            key.extend_from_slice(&row_id.to_be_bytes());
            self.tree.remove(key)?;
        }
        Ok(())
    }

    /// Look up the row holding a fully-non-NULL key in a unique index.
    pub fn lookup(&self, values: &[Value]) -> Result<Option<RowId>, Error> {
        if Self::has_null(values) {
            return Ok(None);
        }
        let key = Self::encode_key(values);
        if self.unique {
            match self.tree.get(&key)? {
                Some(bytes) => Ok(Some(decode_row_id(&bytes)?)),
                None => Ok(None),
            }
        } else {
            match self.tree.scan_prefix(&key).next() {
                Some(result) => {
                    let (_, bytes) = result?;
                    Ok(Some(decode_row_id(&bytes)?))
                }
                None => Ok(None),
            }
        }
    }

    /// Find every row holding the given (fully-non-NULL) key.
    pub fn find_rows(&self, values: &[Value]) -> Result<Vec<RowId>, Error> {
        if Self::has_null(values) {
            return Ok(Vec::new());
        }
        let key = Self::encode_key(values);
        let mut rows = Vec::new();
        for result in self.tree.scan_prefix(&key) {
            let (_, bytes) = result?;
            rows.push(decode_row_id(&bytes)?);
        }
        Ok(rows)
    }

    /// Check whether any row holds the given key.
    pub fn contains_key(&self, values: &[Value]) -> Result<bool, Error> {
        Ok(self.lookup(values)?.is_some())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Check if the index has no entries.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

fn decode_row_id(bytes: &[u8]) -> Result<RowId, Error> {
    if bytes.len() != 8 {
        return Err(Error::InvalidData("malformed index entry".to_string()));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Ok(u64::from_be_bytes(buf))
}

/// Registry of physical indexes: the index provider the constraint layer
/// requests indexes from and may be handed ownership of.
pub struct IndexManager {
    db: Db,
    indexes: DashMap<String, Arc<TableIndex>>,
}

impl IndexManager {
    /// Create an index manager on an open sled database.
    pub fn new(db: Db) -> Self {
        Self {
            db,
            indexes: DashMap::new(),
        }
    }

    /// Create (or reopen, at startup) an index.
    pub fn create_index(&self, spec: IndexSpec) -> Result<Arc<TableIndex>, Error> {
        if self.indexes.contains_key(&spec.name) {
            return Err(SchemaError::DuplicateIndex(spec.name).into());
        }
        let tree = self
            .db
            .open_tree(format!("{}{}", INDEX_TREE_PREFIX, spec.name))?;
        let index = Arc::new(TableIndex::new(spec, tree));
        self.indexes.insert(index.name.clone(), index.clone());
        Ok(index)
    }

    /// Get an index by name.
    pub fn get(&self, name: &str) -> Option<Arc<TableIndex>> {
        self.indexes.get(name).map(|entry| entry.value().clone())
    }

    /// Drop an index and its storage.
    pub fn drop_index(&self, name: &str) -> Result<(), Error> {
        self.indexes.remove(name);
        self.db.drop_tree(format!("{}{}", INDEX_TREE_PREFIX, name))?;
        Ok(())
    }

    /// All indexes over a table, in name order.
    pub fn indexes_for(&self, table: &str) -> Vec<Arc<TableIndex>> {
        let mut indexes: Vec<_> = self
            .indexes
            .iter()
            .filter(|entry| entry.value().table == table)
            .map(|entry| entry.value().clone())
            .collect();
        indexes.sort_by(|a, b| a.name.cmp(&b.name));
        indexes
    }

    /// Find an index by table, exact column list, and uniqueness.
    pub fn find(&self, table: &str, columns: &[String], unique: bool) -> Option<Arc<TableIndex>> {
        self.indexes_for(table)
            .into_iter()
            .find(|i| i.unique == unique && i.columns == columns)
    }

    /// Re-home every index of a renamed table. The physical trees are
    /// untouched; only the registry metadata changes. Callers must
    /// refresh any held index handles afterwards.
    pub fn retarget_table(&self, old: &str, new: &str) {
        for index in self.indexes_for(old) {
            let spec = IndexSpec {
                name: index.name.clone(),
                table: new.to_string(),
                columns: index.columns.clone(),
                unique: index.unique,
            };
            self.indexes.insert(
                index.name.clone(),
                Arc::new(TableIndex::new(spec, index.tree.clone())),
            );
        }
    }

    /// Apply a column rename to the metadata of a table's indexes. Key
    /// encodings carry values only, so the physical trees are untouched.
    pub fn rename_column(&self, table: &str, old: &str, new: &str) {
        for index in self.indexes_for(table) {
            if !index.columns.iter().any(|c| c == old) {
                continue;
            }
            let columns = index
                .columns
                .iter()
                .map(|c| if c == old { new.to_string() } else { c.clone() })
                .collect();
            let spec = IndexSpec {
                name: index.name.clone(),
                table: index.table.clone(),
                columns,
                unique: index.unique,
            };
            self.indexes.insert(
                index.name.clone(),
                Arc::new(TableIndex::new(spec, index.tree.clone())),
            );
        }
    }
}
