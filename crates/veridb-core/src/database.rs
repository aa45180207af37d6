//! The database facade.
//!
//! Ties the row store, index manager, catalog, and per-table constraint
//! sets together: DDL (tables, constraints, renames) and the DML
//! pipeline (before-validate, physical apply with index maintenance,
//! cascade execution, after-validate).
//!
//! DDL paths take the constraint registry's write lock, so
//! `set_index_owner` and `rebuild` never race live validation. The
//! facade compensates a failed row's own physical change; full
//! transactional rollback remains the (external) transaction layer's
//! responsibility.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::cascade::CascadeExecutor;
use crate::catalog::{Catalog, CatalogSnapshot, ConstraintDef, ConstraintRecord, TableDef};
use crate::constraint::{
    resolve_key_index, BulkValidator, CascadeRequest, Constraint, ConstraintId, ConstraintSet,
    ConstraintValidator,
};
use crate::error::{Error, SchemaError};
use crate::expr;
use crate::session::Session;
use crate::storage::{IndexManager, IndexSpec, RowStore, StorageConfig};
use crate::value::{Row, RowId};

/// A veridb database instance.
pub struct Database {
    store: RowStore,
    indexes: IndexManager,
    catalog: Catalog,
    sets: RwLock<HashMap<String, ConstraintSet>>,
    next_session_id: AtomicU64,
}

impl Database {
    /// Open or create a database with the given storage configuration,
    /// rehydrating registered constraints and their index bindings from
    /// the catalog.
    pub fn open(config: StorageConfig) -> Result<Self, Error> {
        let db = config.to_sled_config().open()?;
        let store = RowStore::new(db.clone());
        let indexes = IndexManager::new(db.clone());
        let catalog = Catalog::open(&db)?;

        let snapshot = catalog.snapshot();
        for record in &snapshot.constraints {
            if let Some(spec) = index_spec_for(record) {
                if indexes.get(&spec.name).is_none() {
                    indexes.create_index(spec)?;
                }
            }
        }
        let sets = build_sets(&snapshot, &indexes)?;

        Ok(Self {
            store,
            indexes,
            catalog,
            sets: RwLock::new(sets),
            next_session_id: AtomicU64::new(1),
        })
    }

    /// Open a new session.
    pub fn session(&self) -> Session {
        Session::new(self.next_session_id.fetch_add(1, Ordering::SeqCst))
    }

    // ---- DDL -----------------------------------------------------------

    /// Create a table.
    pub fn create_table(&self, def: TableDef) -> Result<(), Error> {
        let _sets = self.sets.write();
        let mut snapshot = self.catalog.snapshot();
        if snapshot.table(&def.name).is_some() {
            return Err(SchemaError::DuplicateTable(def.name).into());
        }
        tracing::debug!(table = %def.name, "creating table");
        snapshot.tables.insert(def.name.clone(), def);
        self.catalog.apply(snapshot)?;
        Ok(())
    }

    /// Drop a table, its rows, and its constraints.
    ///
    /// While a foreign key on another table references it, the drop is
    /// refused unless `cascade` is passed, which drops the referencing
    /// constraints (not their tables) first.
    pub fn drop_table(&self, name: &str, cascade: bool) -> Result<(), Error> {
        let mut sets = self.sets.write();
        let mut snapshot = self.catalog.snapshot();
        snapshot.require_table(name)?;

        let mut referencing: Vec<(String, String)> = Vec::new();
        for (table, set) in sets.iter() {
            for constraint in set.iter() {
                if constraint.referenced_table() == Some(name) && constraint.table() != name {
                    if !cascade {
                        return Err(SchemaError::TableReferenced {
                            table: name.to_string(),
                            constraint: constraint.name().to_string(),
                        }
                        .into());
                    }
                    referencing.push((table.clone(), constraint.name().to_string()));
                }
            }
        }

        let mut owned_indexes = Vec::new();
        for (table, constraint_name) in &referencing {
            if let Some(set) = sets.get_mut(table) {
                if let Some(constraint) = set.remove(constraint_name) {
                    if let Some(binding) = constraint.backing_index() {
                        if binding.owned {
                            owned_indexes.push(binding.index.name().to_string());
                        }
                    }
                }
            }
        }
        if let Some(set) = sets.remove(name) {
            for constraint in set.iter() {
                if let Some(binding) = constraint.backing_index() {
                    if binding.owned {
                        owned_indexes.push(binding.index.name().to_string());
                    }
                }
            }
        }

        let dropped: HashSet<&str> = referencing.iter().map(|(_, c)| c.as_str()).collect();
        snapshot.tables.remove(name);
        snapshot
            .constraints
            .retain(|r| r.def.table() != name && !dropped.contains(r.def.name()));
        self.catalog.apply(snapshot)?;

        for index in owned_indexes {
            self.indexes.drop_index(&index)?;
        }
        for index in self.indexes.indexes_for(name) {
            self.indexes.drop_index(index.name())?;
        }
        self.store.drop_table(name)?;
        tracing::debug!(table = name, "dropped table");
        Ok(())
    }

    /// Rename a table. Every constraint that owns or references it is
    /// rebuilt; the rename aborts with nothing changed if any rebuild
    /// fails.
    pub fn rename_table(&self, old: &str, new: &str) -> Result<(), Error> {
        let mut sets = self.sets.write();
        let mut snapshot = self.catalog.snapshot();
        if snapshot.table(new).is_some() {
            return Err(SchemaError::DuplicateTable(new.to_string()).into());
        }
        let mut table = snapshot
            .tables
            .remove(old)
            .ok_or_else(|| Error::UnknownTable(old.to_string()))?;
        table.name = new.to_string();
        snapshot.tables.insert(new.to_string(), table);

        // Rewrite records and prove every reference still resolves
        // before touching anything physical.
        for position in 0..snapshot.constraints.len() {
            let record = snapshot.constraints[position].clone();
            let mut constraint = Constraint::from_record(&record, None)?;
            constraint.apply_table_rename(old, new);
            constraint.rebuild(&snapshot)?;
            let mut updated = constraint.to_record();
            updated.index_name = record.index_name;
            updated.index_owned = record.index_owned;
            snapshot.constraints[position] = updated;
        }

        self.indexes.retarget_table(old, new);
        self.store.rename_table(old, new)?;
        self.catalog.apply(snapshot)?;
        *sets = build_sets(&self.catalog.snapshot(), &self.indexes)?;
        tracing::debug!(old, new, "renamed table");
        Ok(())
    }

    /// Rename a column. Constraints referencing it on either side are
    /// rebuilt (check expressions rewritten, key lists updated); the
    /// rename aborts with nothing changed if any rebuild fails.
    pub fn rename_column(&self, table: &str, old: &str, new: &str) -> Result<(), Error> {
        let mut sets = self.sets.write();
        let mut snapshot = self.catalog.snapshot();
        let table_def = snapshot
            .tables
            .get_mut(table)
            .ok_or_else(|| Error::UnknownTable(table.to_string()))?;
        if table_def.has_column(new) {
            return Err(Error::InvalidData(format!(
                "column {}.{} already exists",
                table, new
            )));
        }
        if !table_def.rename_column(old, new) {
            return Err(Error::UnknownColumn {
                table: table.to_string(),
                column: old.to_string(),
            });
        }

        for position in 0..snapshot.constraints.len() {
            let record = snapshot.constraints[position].clone();
            let mut constraint = Constraint::from_record(&record, None)?;
            constraint.apply_column_rename(table, old, new);
            constraint.rebuild(&snapshot)?;
            let mut updated = constraint.to_record();
            updated.index_name = record.index_name;
            updated.index_owned = record.index_owned;
            snapshot.constraints[position] = updated;
        }

        // Stored rows carry column names; re-key them. Index trees hold
        // values only, so their metadata rename is enough.
        let rows: Vec<_> = self.store.scan(table)?.collect();
        for result in rows {
            let (row_id, mut row) = result?;
            if row.rename_column(old, new) {
                self.store.put(table, row_id, &row)?;
            }
        }
        self.indexes.rename_column(table, old, new);
        self.catalog.apply(snapshot)?;
        *sets = build_sets(&self.catalog.snapshot(), &self.indexes)?;
        tracing::debug!(table, old, new, "renamed column");
        Ok(())
    }

    /// Register a constraint, bulk-validating any existing rows first.
    ///
    /// On failure nothing is registered: the catalog is unchanged, a
    /// newly created backing index is dropped again, and the violation
    /// is surfaced to the caller.
    pub fn add_constraint(
        &self,
        session: &Session,
        def: ConstraintDef,
    ) -> Result<ConstraintId, Error> {
        let mut sets = self.sets.write();
        let mut snapshot = self.catalog.snapshot();

        let table = snapshot.require_table(def.table())?.clone();
        if snapshot.constraint_by_name(def.name()).is_some() {
            return Err(SchemaError::DuplicateConstraintName(def.name().to_string()).into());
        }

        match &def {
            ConstraintDef::Check { expression, .. } => {
                let parsed = expr::parse(expression)?;
                for column in parsed.columns() {
                    if !table.has_column(&column) {
                        return Err(Error::UnknownColumn {
                            table: table.name.clone(),
                            column,
                        });
                    }
                }
            }
            ConstraintDef::PrimaryKey { columns, .. } => {
                if snapshot
                    .constraints_for(&table.name)
                    .iter()
                    .any(|r| r.def.is_primary_key())
                {
                    return Err(SchemaError::DuplicatePrimaryKey(table.name.clone()).into());
                }
                require_columns(&table, columns)?;
            }
            ConstraintDef::Unique { columns, .. } => {
                require_columns(&table, columns)?;
            }
            ConstraintDef::ForeignKey {
                columns,
                referenced_table,
                referenced_columns,
                ..
            } => {
                require_columns(&table, columns)?;
                let referenced = snapshot.require_table(referenced_table)?;
                require_columns(referenced, referenced_columns)?;
                if columns.len() != referenced_columns.len() {
                    return Err(Error::InvalidData(
                        "foreign key column count mismatch".to_string(),
                    ));
                }
                if resolve_key_index(&sets, referenced_table, referenced_columns).is_none() {
                    return Err(SchemaError::ReferencedKeyMissing {
                        table: referenced_table.clone(),
                        columns: referenced_columns.clone(),
                    }
                    .into());
                }
            }
        }

        let id = snapshot.next_constraint_id();
        let mut constraint = Constraint::new(id, &def, table.temporary)?;

        // Backing index: adopt a matching existing one (borrowed), else
        // create one this constraint owns.
        let mut created_index: Option<String> = None;
        let key_spec = match &def {
            ConstraintDef::Check { .. } => None,
            ConstraintDef::PrimaryKey { columns, .. } | ConstraintDef::Unique { columns, .. } => {
                Some((columns.clone(), true))
            }
            ConstraintDef::ForeignKey { columns, .. } => Some((columns.clone(), false)),
        };
        if let Some((columns, unique)) = key_spec {
            match self.indexes.find(&table.name, &columns, unique) {
                Some(index) => constraint.bind_index(index, false),
                None => {
                    let mut spec =
                        IndexSpec::new(format!("{}_idx", def.name()), &table.name, columns);
                    if unique {
                        spec = spec.unique();
                    }
                    let index = self.indexes.create_index(spec)?;
                    created_index = Some(index.name().to_string());
                    constraint.bind_index(index, true);
                }
            }
        }

        // Bulk-validate existing rows; a newly created index is
        // populated by the same scan, so duplicate keys surface through
        // its insertion-time conflict detection.
        let bulk = BulkValidator::new(&snapshot, &self.store, &sets);
        if let Err(error) =
            bulk.check_existing_data(session, &constraint, created_index.is_some())
        {
            if let Some(name) = created_index {
                self.indexes.drop_index(&name)?;
            }
            return Err(error);
        }

        snapshot.constraints.push(constraint.to_record());
        if let Err(error) = self.catalog.apply(snapshot) {
            if let Some(name) = created_index {
                self.indexes.drop_index(&name)?;
            }
            return Err(error);
        }

        tracing::debug!(constraint = %def.name(), table = %table.name, "registered constraint");
        sets.entry(table.name.clone()).or_default().insert(constraint);
        Ok(id)
    }

    /// Drop a constraint. Its owned backing index is dropped with it,
    /// unless another constraint still uses that index; a borrowed index
    /// is never dropped.
    pub fn drop_constraint(&self, table: &str, name: &str) -> Result<(), Error> {
        let mut sets = self.sets.write();
        let mut snapshot = self.catalog.snapshot();

        let constraint = sets
            .get_mut(table)
            .and_then(|set| set.remove(name))
            .ok_or_else(|| Error::Schema(SchemaError::UnknownConstraint(name.to_string())))?;

        snapshot.constraints.retain(|r| r.def.name() != name);
        self.catalog.apply(snapshot)?;

        if let Some(binding) = constraint.backing_index() {
            if binding.owned {
                let still_used = sets
                    .values()
                    .flat_map(|set| set.iter())
                    .any(|c| c.uses_index(&binding.index));
                if !still_used {
                    self.indexes.drop_index(binding.index.name())?;
                }
            }
        }
        tracing::debug!(constraint = name, table, "dropped constraint");
        Ok(())
    }

    /// Hand a constraint ownership of an index, e.g. when the general
    /// index originally backing it is replaced by a purpose-built one.
    /// Idempotent when called again with the same index.
    pub fn set_index_owner(&self, table: &str, name: &str, index: &str) -> Result<(), Error> {
        let mut sets = self.sets.write();
        let index = self
            .indexes
            .get(index)
            .ok_or_else(|| Error::Schema(SchemaError::UnknownIndex(index.to_string())))?;

        let constraint = sets
            .get_mut(table)
            .and_then(|set| set.get_mut(name))
            .ok_or_else(|| Error::Schema(SchemaError::UnknownConstraint(name.to_string())))?;
        constraint.set_index_owner(index);
        let record = constraint.to_record();

        let mut snapshot = self.catalog.snapshot();
        if let Some(existing) = snapshot
            .constraints
            .iter_mut()
            .find(|r| r.def.name() == name)
        {
            *existing = record;
        }
        self.catalog.apply(snapshot)?;
        Ok(())
    }

    // ---- DML -----------------------------------------------------------

    /// Insert a row, validating every constraint on the table.
    pub fn insert(&self, session: &Session, table: &str, row: Row) -> Result<RowId, Error> {
        let sets = self.sets.read();
        let snapshot = self.catalog.snapshot();
        self.insert_inner(session, &snapshot, &sets, table, row)
    }

    fn insert_inner(
        &self,
        session: &Session,
        snapshot: &CatalogSnapshot,
        sets: &HashMap<String, ConstraintSet>,
        table: &str,
        row: Row,
    ) -> Result<RowId, Error> {
        let table_def = snapshot.require_table(table)?;
        validate_row_shape(table_def, &row)?;

        let row_id = self.store.next_row_id()?;
        let validator = ConstraintValidator::new(snapshot, &self.store, sets);

        // Inserts produce no referenced-side work; the before group is
        // the foreign-key existence checks.
        validator.validate_before(session, table, None, Some(&row), Some(row_id))?;

        self.apply_index_inserts(table, row_id, &row)?;
        self.store.put(table, row_id, &row)?;

        if let Err(error) = validator.validate_after(session, table, None, Some(&row), Some(row_id))
        {
            self.undo_row_insert(table, row_id, &row)?;
            return Err(error);
        }
        Ok(row_id)
    }

    /// Update a row by merging `patch` over its current image.
    pub fn update(
        &self,
        session: &Session,
        table: &str,
        row_id: RowId,
        patch: Row,
    ) -> Result<(), Error> {
        let sets = self.sets.read();
        let snapshot = self.catalog.snapshot();
        self.update_inner(session, &snapshot, &sets, table, row_id, patch, 0)
    }

    pub(crate) fn update_inner(
        &self,
        session: &Session,
        snapshot: &CatalogSnapshot,
        sets: &HashMap<String, ConstraintSet>,
        table: &str,
        row_id: RowId,
        patch: Row,
        depth: usize,
    ) -> Result<(), Error> {
        let table_def = snapshot.require_table(table)?;
        let old = self
            .store
            .get(table, row_id)?
            .ok_or(Error::RowNotFound)?;
        let new = old.merged(&patch);
        validate_row_shape(table_def, &new)?;

        let validator = ConstraintValidator::new(snapshot, &self.store, sets);
        let requests =
            validator.validate_before(session, table, Some(&old), Some(&new), Some(row_id))?;

        self.apply_index_updates(table, row_id, &old, &new)?;
        self.store.put(table, row_id, &new)?;

        if !requests.is_empty() {
            CascadeExecutor::new(self, snapshot, sets).execute(session, requests, depth)?;
        }

        if let Err(error) =
            validator.validate_after(session, table, Some(&old), Some(&new), Some(row_id))
        {
            // Compensate this row's own change; rolling back the rest of
            // the statement is the transaction layer's job.
            self.apply_index_updates(table, row_id, &new, &old)?;
            self.store.put(table, row_id, &old)?;
            return Err(error);
        }
        Ok(())
    }

    /// Delete a row. Returns false if it did not exist.
    pub fn delete(&self, session: &Session, table: &str, row_id: RowId) -> Result<bool, Error> {
        let sets = self.sets.read();
        let snapshot = self.catalog.snapshot();
        self.delete_inner(session, &snapshot, &sets, table, row_id, 0)
    }

    pub(crate) fn delete_inner(
        &self,
        session: &Session,
        snapshot: &CatalogSnapshot,
        sets: &HashMap<String, ConstraintSet>,
        table: &str,
        row_id: RowId,
        depth: usize,
    ) -> Result<bool, Error> {
        let old = match self.store.get(table, row_id)? {
            Some(row) => row,
            None => return Ok(false),
        };

        let validator = ConstraintValidator::new(snapshot, &self.store, sets);
        let requests = validator.validate_before(session, table, Some(&old), None, Some(row_id))?;

        for index in self.indexes.indexes_for(table) {
            index.remove(&index.project(&old), row_id)?;
        }
        self.store.remove(table, row_id)?;

        if !requests.is_empty() {
            CascadeExecutor::new(self, snapshot, sets).execute(session, requests, depth)?;
        }

        validator.validate_after(session, table, Some(&old), None, Some(row_id))?;
        Ok(true)
    }

    /// Validate a mutation without applying it. Returns the cascade work
    /// the mutation would require.
    pub fn validate_mutation(
        &self,
        session: &Session,
        table: &str,
        old_row: Option<&Row>,
        new_row: Option<&Row>,
    ) -> Result<Vec<CascadeRequest>, Error> {
        let sets = self.sets.read();
        let snapshot = self.catalog.snapshot();
        ConstraintValidator::new(&snapshot, &self.store, &sets)
            .validate_mutation(session, table, old_row, new_row, None)
    }

    // ---- Introspection -------------------------------------------------

    /// Get a row by id.
    pub fn get(&self, table: &str, row_id: RowId) -> Result<Option<Row>, Error> {
        self.store.get(table, row_id)
    }

    /// Number of rows in a table.
    pub fn row_count(&self, table: &str) -> Result<usize, Error> {
        self.store.row_count(table)
    }

    /// Constraint names of a table, in validation order.
    pub fn constraint_names(&self, table: &str) -> Vec<String> {
        self.sets
            .read()
            .get(table)
            .map(|set| set.names().into_iter().map(String::from).collect())
            .unwrap_or_default()
    }

    /// Canonical DDL for a table's constraints, excluding implied index
    /// creation; suitable for schema dump and replay.
    pub fn constraint_sql(&self, table: &str) -> Vec<String> {
        self.sets
            .read()
            .get(table)
            .map(|set| {
                set.iter()
                    .map(|c| c.create_sql_without_indexes().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Names of the physical indexes on a table.
    pub fn index_names(&self, table: &str) -> Vec<String> {
        self.indexes
            .indexes_for(table)
            .into_iter()
            .map(|i| i.name().to_string())
            .collect()
    }

    /// All table names.
    pub fn table_names(&self) -> Vec<String> {
        self.catalog
            .with_current(|s| s.table_names().into_iter().map(String::from).collect())
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.store.flush()?;
        self.catalog.flush()?;
        Ok(())
    }

    // ---- Internals -----------------------------------------------------

    fn apply_index_inserts(&self, table: &str, row_id: RowId, row: &Row) -> Result<(), Error> {
        let indexes = self.indexes.indexes_for(table);
        for (position, index) in indexes.iter().enumerate() {
            if let Err(error) = index.insert(&index.project(row), row_id) {
                for prior in &indexes[..position] {
                    prior.remove(&prior.project(row), row_id)?;
                }
                return Err(error);
            }
        }
        Ok(())
    }

    fn undo_row_insert(&self, table: &str, row_id: RowId, row: &Row) -> Result<(), Error> {
        for index in self.indexes.indexes_for(table) {
            index.remove(&index.project(row), row_id)?;
        }
        self.store.remove(table, row_id)?;
        Ok(())
    }

    fn apply_index_updates(
        &self,
        table: &str,
        row_id: RowId,
        old: &Row,
        new: &Row,
    ) -> Result<(), Error> {
        let indexes = self.indexes.indexes_for(table);
        for (position, index) in indexes.iter().enumerate() {
            let old_key = index.project(old);
            let new_key = index.project(new);
            if old_key == new_key {
                continue;
            }
            index.remove(&old_key, row_id)?;
            if let Err(error) = index.insert(&new_key, row_id) {
                index.insert(&old_key, row_id)?;
                for prior in &indexes[..position] {
                    let prior_old = prior.project(old);
                    let prior_new = prior.project(new);
                    if prior_old == prior_new {
                        continue;
                    }
                    prior.remove(&prior_new, row_id)?;
                    prior.insert(&prior_old, row_id)?;
                }
                return Err(error);
            }
        }
        Ok(())
    }
}

/// Derive the index spec a persisted constraint record implies.
fn index_spec_for(record: &ConstraintRecord) -> Option<IndexSpec> {
    let name = record.index_name.clone()?;
    match &record.def {
        ConstraintDef::PrimaryKey { table, columns, .. }
        | ConstraintDef::Unique { table, columns, .. } => {
            Some(IndexSpec::new(name, table, columns.clone()).unique())
        }
        ConstraintDef::ForeignKey { table, columns, .. } => {
            Some(IndexSpec::new(name, table, columns.clone()))
        }
        ConstraintDef::Check { .. } => None,
    }
}

/// Rebuild the per-table constraint sets from persisted records.
fn build_sets(
    snapshot: &CatalogSnapshot,
    indexes: &IndexManager,
) -> Result<HashMap<String, ConstraintSet>, Error> {
    let mut sets: HashMap<String, ConstraintSet> = HashMap::new();
    for record in &snapshot.constraints {
        let index = record.index_name.as_deref().and_then(|name| indexes.get(name));
        let constraint = Constraint::from_record(record, index)?;
        sets.entry(constraint.table().to_string())
            .or_default()
            .insert(constraint);
    }
    Ok(sets)
}

fn require_columns(table: &TableDef, columns: &[String]) -> Result<(), Error> {
    for column in columns {
        if !table.has_column(column) {
            return Err(Error::UnknownColumn {
                table: table.name.clone(),
                column: column.clone(),
            });
        }
    }
    Ok(())
}

/// Check a row image against the table definition: known columns,
/// storable types, NOT NULL columns present.
fn validate_row_shape(table: &TableDef, row: &Row) -> Result<(), Error> {
    for (column, value) in row.iter() {
        let def = table.column(column).ok_or_else(|| Error::UnknownColumn {
            table: table.name.clone(),
            column: column.clone(),
        })?;
        if !def.ty.accepts(value) {
            return Err(Error::InvalidData(format!(
                "column {}.{} cannot store a {} value",
                table.name,
                column,
                value.type_name()
            )));
        }
    }
    for def in &table.columns {
        if !def.nullable && row.value(&def.name).is_null() {
            return Err(Error::InvalidData(format!(
                "column {}.{} is NOT NULL",
                table.name, def.name
            )));
        }
    }
    Ok(())
}
