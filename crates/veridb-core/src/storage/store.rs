//! Row storage.
//!
//! Rows live in one sled tree per table (`rows:<table>`), keyed by a
//! big-endian row id so scans return rows in insertion order. Values are
//! rkyv-encoded row images.

use dashmap::DashMap;
use sled::{Db, Tree};

use crate::error::Error;
use crate::value::{Row, RowId};

/// Prefix for per-table row trees.
const ROWS_TREE_PREFIX: &str = "rows:";

/// Row storage over sled.
pub struct RowStore {
    db: Db,
    /// Tree handles, opened lazily per table.
    trees: DashMap<String, Tree>,
}

impl RowStore {
    /// Create a row store on an open sled database.
    pub fn new(db: Db) -> Self {
        Self {
            db,
            trees: DashMap::new(),
        }
    }

    fn tree(&self, table: &str) -> Result<Tree, Error> {
        if let Some(tree) = self.trees.get(table) {
            return Ok(tree.value().clone());
        }
        let tree = self.db.open_tree(format!("{}{}", ROWS_TREE_PREFIX, table))?;
        self.trees.insert(table.to_string(), tree.clone());
        Ok(tree)
    }

    /// Allocate a fresh row id.
    pub fn next_row_id(&self) -> Result<RowId, Error> {
        Ok(self.db.generate_id()?)
    }

    /// Insert or overwrite a row.
    pub fn put(&self, table: &str, row_id: RowId, row: &Row) -> Result<(), Error> {
        let tree = self.tree(table)?;
        tree.insert(row_id.to_be_bytes(), row.to_bytes()?)?;
        Ok(())
    }

    /// Get a row by id.
    pub fn get(&self, table: &str, row_id: RowId) -> Result<Option<Row>, Error> {
        let tree = self.tree(table)?;
        match tree.get(row_id.to_be_bytes())? {
            Some(bytes) => Ok(Some(Row::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Remove a row. Returns whether it existed.
    pub fn remove(&self, table: &str, row_id: RowId) -> Result<bool, Error> {
        let tree = self.tree(table)?;
        Ok(tree.remove(row_id.to_be_bytes())?.is_some())
    }

    /// Iterate over all rows of a table.
    pub fn scan(
        &self,
        table: &str,
    ) -> Result<impl Iterator<Item = Result<(RowId, Row), Error>>, Error> {
        let tree = self.tree(table)?;
        Ok(tree.iter().map(|result| {
            let (key, value) = result?;
            if key.len() != 8 {
                return Err(Error::InvalidData("malformed row key".to_string()));
            }
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&key);
            Ok((u64::from_be_bytes(buf), Row::from_bytes(&value)?))
        }))
    }

    /// Check whether a table has no rows.
    pub fn is_empty(&self, table: &str) -> Result<bool, Error> {
        let tree = self.tree(table)?;
        Ok(tree.is_empty())
    }

    /// Number of rows in a table.
    pub fn row_count(&self, table: &str) -> Result<usize, Error> {
        let tree = self.tree(table)?;
        Ok(tree.len())
    }

    /// Move a table's rows under a new name.
    pub fn rename_table(&self, old: &str, new: &str) -> Result<(), Error> {
        let old_tree = self.tree(old)?;
        let new_tree = self.tree(new)?;
        for result in old_tree.iter() {
            let (key, value) = result?;
            new_tree.insert(key, value)?;
        }
        self.trees.remove(old);
        self.db.drop_tree(format!("{}{}", ROWS_TREE_PREFIX, old))?;
        Ok(())
    }

    /// Drop all rows of a table.
    pub fn drop_table(&self, table: &str) -> Result<(), Error> {
        self.trees.remove(table);
        self.db
            .drop_tree(format!("{}{}", ROWS_TREE_PREFIX, table))?;
        Ok(())
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.db.flush()?;
        Ok(())
    }
}
