//! The constraint entity.
//!
//! One struct carries the identity every constraint shares (id, name,
//! owning table, temporariness, optional backing index); the
//! kind-specific payload and validation algorithm live in a tagged
//! union dispatched by a single match in `check_row`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::{CatalogSnapshot, ConstraintDef, ConstraintRecord, ReferentialAction};
use crate::error::{ConstraintError, Error, SchemaError};
use crate::expr::{self, CheckExpr};
use crate::session::Session;
use crate::storage::{RowStore, TableIndex};
use crate::value::{describe_values, Row, RowId, Value};

use super::set::ConstraintSet;

/// Stable identifier of a constraint within the schema.
pub type ConstraintId = u64;

/// The fixed variant tag of a constraint. Never mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintType {
    /// Boolean expression over a row's columns.
    Check,
    /// Unique key, NULL components forbidden, at most one per table.
    PrimaryKey,
    /// Unique key with any-NULL-means-distinct semantics.
    Unique,
    /// Foreign key into a referenced table.
    Referential,
}

impl ConstraintType {
    /// Validation priority. Cheap local rules first; key constraints
    /// establish row identity before referential rules consult other
    /// tables.
    pub const fn priority(self) -> u8 {
        match self {
            ConstraintType::Check => 0,
            ConstraintType::PrimaryKey => 1,
            ConstraintType::Unique => 2,
            ConstraintType::Referential => 3,
        }
    }

    /// SQL keyword form, for DDL and error text.
    pub fn as_sql(self) -> &'static str {
        match self {
            ConstraintType::Check => "CHECK",
            ConstraintType::PrimaryKey => "PRIMARY KEY",
            ConstraintType::Unique => "UNIQUE",
            ConstraintType::Referential => "FOREIGN KEY",
        }
    }
}

/// A constraint's hold on a physical index.
///
/// `owned` distinguishes "this constraint created the index and drives
/// its lifecycle" from "this constraint merely uses an index owned
/// elsewhere". An owned index is dropped exactly when the constraint is
/// dropped; a borrowed one never is.
#[derive(Clone)]
pub struct IndexBinding {
    /// The bound index.
    pub index: Arc<TableIndex>,
    /// Whether this constraint owns the index's lifecycle.
    pub owned: bool,
}

/// Kind-specific payload.
pub enum ConstraintKind {
    /// CHECK: parsed boolean expression.
    Check {
        /// The expression.
        expr: CheckExpr,
    },
    /// PRIMARY KEY: key columns.
    PrimaryKey {
        /// Key columns in declaration order.
        columns: Vec<String>,
    },
    /// UNIQUE: key columns.
    Unique {
        /// Key columns in declaration order.
        columns: Vec<String>,
    },
    /// REFERENTIAL: foreign key into a referenced table, held as a
    /// catalog-resolved name so table lifetime stays with the catalog.
    Referential {
        /// Foreign key columns on the owning table.
        columns: Vec<String>,
        /// Referenced table name.
        referenced_table: String,
        /// Referenced key columns, positionally matching `columns`.
        referenced_columns: Vec<String>,
        /// Action when a referenced row is deleted.
        on_delete: ReferentialAction,
        /// Action when a referenced key is updated.
        on_update: ReferentialAction,
    },
}

/// Outcome of a single `check_row` call.
#[derive(Debug, Clone, PartialEq)]
pub enum RowCheck {
    /// The row satisfies the constraint.
    Pass,
    /// The mutation is admissible only if the named cascade action is
    /// performed on the listed referencing rows. The constraint signals;
    /// the caller executes.
    CascadeRequired(CascadeRequest),
}

/// The cascade action a referential constraint requires of its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum CascadeAction {
    /// Delete the referencing rows.
    Delete,
    /// Set their foreign key columns to NULL.
    SetNull,
    /// Rewrite their foreign key columns to the referenced row's new key.
    SetValues(Vec<Value>),
}

/// Referencing rows that require a cascade action.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeRequest {
    /// The signaling constraint.
    pub constraint: String,
    /// The referencing table whose rows need action.
    pub table: String,
    /// The foreign key columns in that table.
    pub columns: Vec<String>,
    /// The affected rows.
    pub rows: Vec<RowId>,
    /// What to do with them.
    pub action: CascadeAction,
}

/// Everything `check_row` may consult: the session, the catalog state the
/// statement runs against, the row store, and the per-table constraint
/// sets (for resolving a referenced table's key index).
pub struct CheckContext<'a> {
    /// The calling session.
    pub session: &'a Session,
    /// Catalog state the statement runs against.
    pub snapshot: &'a CatalogSnapshot,
    /// Row storage.
    pub store: &'a RowStore,
    /// Per-table constraint sets.
    pub sets: &'a HashMap<String, ConstraintSet>,
    /// Id of the row being mutated, when known.
    pub row_id: Option<RowId>,
}

/// One integrity rule bound to an owning table.
pub struct Constraint {
    id: ConstraintId,
    name: String,
    table: String,
    temporary: bool,
    backing: Option<IndexBinding>,
    kind: ConstraintKind,
    /// Canonical DDL text, refreshed by `rebuild`.
    create_sql: String,
}

impl Constraint {
    /// Build a constraint from a definition. The expression of a CHECK
    /// definition is parsed here, once.
    pub fn new(id: ConstraintId, def: &ConstraintDef, temporary: bool) -> Result<Self, Error> {
        let kind = match def {
            ConstraintDef::Check { expression, .. } => ConstraintKind::Check {
                expr: expr::parse(expression)?,
            },
            ConstraintDef::PrimaryKey { columns, .. } => ConstraintKind::PrimaryKey {
                columns: columns.clone(),
            },
            ConstraintDef::Unique { columns, .. } => ConstraintKind::Unique {
                columns: columns.clone(),
            },
            ConstraintDef::ForeignKey {
                columns,
                referenced_table,
                referenced_columns,
                on_delete,
                on_update,
                ..
            } => ConstraintKind::Referential {
                columns: columns.clone(),
                referenced_table: referenced_table.clone(),
                referenced_columns: referenced_columns.clone(),
                on_delete: *on_delete,
                on_update: *on_update,
            },
        };

        let mut constraint = Self {
            id,
            name: def.name().to_string(),
            table: def.table().to_string(),
            temporary,
            backing: None,
            kind,
            create_sql: String::new(),
        };
        constraint.create_sql = constraint.render_create_sql();
        Ok(constraint)
    }

    /// Rebuild a constraint from its persisted record, with the backing
    /// index already resolved by the caller.
    pub fn from_record(
        record: &ConstraintRecord,
        index: Option<Arc<TableIndex>>,
    ) -> Result<Self, Error> {
        let mut constraint = Self::new(record.id, &record.def, record.temporary)?;
        if let Some(index) = index {
            constraint.backing = Some(IndexBinding {
                index,
                owned: record.index_owned,
            });
        }
        Ok(constraint)
    }

    /// The persisted form of this constraint.
    pub fn to_record(&self) -> ConstraintRecord {
        ConstraintRecord {
            id: self.id,
            temporary: self.temporary,
            index_name: self.backing.as_ref().map(|b| b.index.name().to_string()),
            index_owned: self.backing.as_ref().map(|b| b.owned).unwrap_or(false),
            def: self.to_def(),
        }
    }

    fn to_def(&self) -> ConstraintDef {
        match &self.kind {
            ConstraintKind::Check { expr } => ConstraintDef::Check {
                name: self.name.clone(),
                table: self.table.clone(),
                expression: expr.to_sql(),
            },
            ConstraintKind::PrimaryKey { columns } => ConstraintDef::PrimaryKey {
                name: self.name.clone(),
                table: self.table.clone(),
                columns: columns.clone(),
            },
            ConstraintKind::Unique { columns } => ConstraintDef::Unique {
                name: self.name.clone(),
                table: self.table.clone(),
                columns: columns.clone(),
            },
            ConstraintKind::Referential {
                columns,
                referenced_table,
                referenced_columns,
                on_delete,
                on_update,
            } => ConstraintDef::ForeignKey {
                name: self.name.clone(),
                table: self.table.clone(),
                columns: columns.clone(),
                referenced_table: referenced_table.clone(),
                referenced_columns: referenced_columns.clone(),
                on_delete: *on_delete,
                on_update: *on_update,
            },
        }
    }

    /// Stable identifier.
    pub fn id(&self) -> ConstraintId {
        self.id
    }

    /// Constraint name, unique within the schema.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Whether the constraint shares a temporary table's teardown.
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    /// The fixed variant tag.
    pub fn constraint_type(&self) -> ConstraintType {
        match self.kind {
            ConstraintKind::Check { .. } => ConstraintType::Check,
            ConstraintKind::PrimaryKey { .. } => ConstraintType::PrimaryKey,
            ConstraintKind::Unique { .. } => ConstraintType::Unique,
            ConstraintKind::Referential { .. } => ConstraintType::Referential,
        }
    }

    /// Validation priority; constraints of the same kind compare equal.
    pub fn priority(&self) -> u8 {
        self.constraint_type().priority()
    }

    /// Whether this constraint must be validated before the physical row
    /// mutation. Referential constraints need the pre-mutation state to
    /// detect dangling references; CHECK and key constraints see the
    /// post-mutation candidate row.
    pub fn is_before(&self) -> bool {
        matches!(self.kind, ConstraintKind::Referential { .. })
    }

    /// Kind-specific payload.
    pub fn kind(&self) -> &ConstraintKind {
        &self.kind
    }

    /// The referenced table, for referential constraints.
    pub fn referenced_table(&self) -> Option<&str> {
        match &self.kind {
            ConstraintKind::Referential {
                referenced_table, ..
            } => Some(referenced_table),
            _ => None,
        }
    }

    /// Key columns, for key-based constraints.
    pub fn key_columns(&self) -> Option<&[String]> {
        match &self.kind {
            ConstraintKind::PrimaryKey { columns }
            | ConstraintKind::Unique { columns }
            | ConstraintKind::Referential { columns, .. } => Some(columns),
            ConstraintKind::Check { .. } => None,
        }
    }

    /// Whether the column participates in this constraint's definition
    /// on the owning table.
    pub fn contains_column(&self, column: &str) -> bool {
        match &self.kind {
            ConstraintKind::Check { expr } => expr.columns().contains(column),
            ConstraintKind::PrimaryKey { columns }
            | ConstraintKind::Unique { columns }
            | ConstraintKind::Referential { columns, .. } => {
                columns.iter().any(|c| c == column)
            }
        }
    }

    /// Whether the column of the given table participates on either side
    /// of this constraint. Used by rename paths.
    pub fn references_column(&self, table: &str, column: &str) -> bool {
        if self.table == table && self.contains_column(column) {
            return true;
        }
        if let ConstraintKind::Referential {
            referenced_table,
            referenced_columns,
            ..
        } = &self.kind
        {
            referenced_table == table && referenced_columns.iter().any(|c| c == column)
        } else {
            false
        }
    }

    /// Current backing index binding.
    pub fn backing_index(&self) -> Option<&IndexBinding> {
        self.backing.as_ref()
    }

    /// Whether `backing_index` is exactly this index.
    pub fn uses_index(&self, index: &TableIndex) -> bool {
        self.backing
            .as_ref()
            .map(|b| b.index.name() == index.name())
            .unwrap_or(false)
    }

    /// Bind a backing index.
    pub fn bind_index(&mut self, index: Arc<TableIndex>, owned: bool) {
        self.backing = Some(IndexBinding { index, owned });
    }

    /// Transfer index ownership to this constraint, rebinding if the
    /// index differs. Idempotent for the already-bound index.
    pub fn set_index_owner(&mut self, index: Arc<TableIndex>) {
        match &mut self.backing {
            Some(binding) if binding.index.name() == index.name() => {
                binding.owned = true;
            }
            _ => {
                self.backing = Some(IndexBinding { index, owned: true });
            }
        }
    }

    /// The unique index enforcing this constraint, if any.
    pub fn unique_index(&self) -> Option<Arc<TableIndex>> {
        self.backing
            .as_ref()
            .filter(|b| b.index.is_unique())
            .map(|b| b.index.clone())
    }

    /// Canonical DDL text reproducing this constraint, excluding any
    /// implied index creation.
    pub fn create_sql_without_indexes(&self) -> &str {
        &self.create_sql
    }

    fn render_create_sql(&self) -> String {
        let head = format!("ALTER TABLE {} ADD CONSTRAINT {}", self.table, self.name);
        match &self.kind {
            ConstraintKind::Check { expr } => format!("{} CHECK ({})", head, expr.to_sql()),
            ConstraintKind::PrimaryKey { columns } => {
                format!("{} PRIMARY KEY ({})", head, columns.join(", "))
            }
            ConstraintKind::Unique { columns } => {
                format!("{} UNIQUE ({})", head, columns.join(", "))
            }
            ConstraintKind::Referential {
                columns,
                referenced_table,
                referenced_columns,
                on_delete,
                on_update,
            } => format!(
                "{} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
                head,
                columns.join(", "),
                referenced_table,
                referenced_columns.join(", "),
                on_delete.as_sql(),
                on_update.as_sql()
            ),
        }
    }

    /// Apply a table rename to this constraint's references.
    pub fn apply_table_rename(&mut self, old: &str, new: &str) {
        if self.table == old {
            self.table = new.to_string();
        }
        if let ConstraintKind::Referential {
            referenced_table, ..
        } = &mut self.kind
        {
            if *referenced_table == old {
                *referenced_table = new.to_string();
            }
        }
    }

    /// Apply a column rename to this constraint's references.
    pub fn apply_column_rename(&mut self, table: &str, old: &str, new: &str) {
        if self.table == table {
            match &mut self.kind {
                ConstraintKind::Check { expr } => expr.rename_column(old, new),
                ConstraintKind::PrimaryKey { columns }
                | ConstraintKind::Unique { columns }
                | ConstraintKind::Referential { columns, .. } => {
                    for column in columns.iter_mut() {
                        if *column == old {
                            *column = new.to_string();
                        }
                    }
                }
            }
        }
        if let ConstraintKind::Referential {
            referenced_table,
            referenced_columns,
            ..
        } = &mut self.kind
        {
            if *referenced_table == table {
                for column in referenced_columns.iter_mut() {
                    if *column == old {
                        *column = new.to_string();
                    }
                }
            }
        }
    }

    /// Refresh cached derived state after a rename of the owning or
    /// referenced table or their columns. Never changes the semantic
    /// rule; fails with `UnresolvableReference` if a referenced name no
    /// longer resolves, so the enclosing rename can abort.
    pub fn rebuild(&mut self, snapshot: &CatalogSnapshot) -> Result<(), Error> {
        let table = snapshot.table(&self.table).ok_or_else(|| {
            Error::Schema(SchemaError::UnresolvableReference {
                constraint: self.name.clone(),
                reference: self.table.clone(),
            })
        })?;

        let unresolvable = |constraint: &str, table: &str, column: &str| {
            Error::Schema(SchemaError::UnresolvableReference {
                constraint: constraint.to_string(),
                reference: format!("{}.{}", table, column),
            })
        };

        match &self.kind {
            ConstraintKind::Check { expr } => {
                for column in expr.columns() {
                    if !table.has_column(&column) {
                        return Err(unresolvable(&self.name, &self.table, &column));
                    }
                }
            }
            ConstraintKind::PrimaryKey { columns } | ConstraintKind::Unique { columns } => {
                for column in columns {
                    if !table.has_column(column) {
                        return Err(unresolvable(&self.name, &self.table, column));
                    }
                }
            }
            ConstraintKind::Referential {
                columns,
                referenced_table,
                referenced_columns,
                ..
            } => {
                for column in columns {
                    if !table.has_column(column) {
                        return Err(unresolvable(&self.name, &self.table, column));
                    }
                }
                let referenced = snapshot.table(referenced_table).ok_or_else(|| {
                    Error::Schema(SchemaError::UnresolvableReference {
                        constraint: self.name.clone(),
                        reference: referenced_table.clone(),
                    })
                })?;
                for column in referenced_columns {
                    if !referenced.has_column(column) {
                        return Err(unresolvable(&self.name, referenced_table, column));
                    }
                }
            }
        }

        self.create_sql = self.render_create_sql();
        tracing::debug!(constraint = %self.name, "rebuilt constraint");
        Ok(())
    }

    /// Check one row mutation against this constraint.
    ///
    /// `mutated_table` is the table whose row is changing: a referential
    /// constraint validates its owning table's rows on one side and its
    /// referenced table's rows on the other. Exactly one of
    /// `old_row`/`new_row` is absent for insert and delete; both are
    /// present for update. Nothing is mutated here; a violation aborts
    /// the surrounding operation.
    pub fn check_row(
        &self,
        cx: &CheckContext<'_>,
        mutated_table: &str,
        old_row: Option<&Row>,
        new_row: Option<&Row>,
    ) -> Result<RowCheck, Error> {
        match &self.kind {
            ConstraintKind::Check { expr } => self.check_expression(expr, new_row),
            ConstraintKind::PrimaryKey { columns } => {
                self.check_key(cx, columns, old_row, new_row, true)
            }
            ConstraintKind::Unique { columns } => {
                self.check_key(cx, columns, old_row, new_row, false)
            }
            ConstraintKind::Referential { .. } => {
                self.check_referential(cx, mutated_table, old_row, new_row)
            }
        }
    }

    /// CHECK: validates row content, not absence; deletes are skipped.
    /// A NULL/unknown result satisfies the constraint.
    fn check_expression(&self, expr: &CheckExpr, new_row: Option<&Row>) -> Result<RowCheck, Error> {
        let new = match new_row {
            Some(row) => row,
            None => return Ok(RowCheck::Pass),
        };
        if expr.eval(new).satisfies_check() {
            return Ok(RowCheck::Pass);
        }
        let columns: Vec<String> = expr.columns().into_iter().collect();
        Err(Error::Constraint(ConstraintError::CheckViolation {
            constraint: self.name.clone(),
            table: self.table.clone(),
            expression: expr.to_sql(),
            values: new.describe(&columns),
        }))
    }

    /// UNIQUE / PRIMARY KEY: probe the backing index for another row with
    /// the same key. A key containing NULL never collides; PRIMARY KEY
    /// additionally forbids NULL components. No-op on delete.
    fn check_key(
        &self,
        cx: &CheckContext<'_>,
        columns: &[String],
        old_row: Option<&Row>,
        new_row: Option<&Row>,
        primary: bool,
    ) -> Result<RowCheck, Error> {
        let new = match new_row {
            Some(row) => row,
            None => return Ok(RowCheck::Pass),
        };

        let key = new.project(columns);
        if primary {
            for (column, value) in columns.iter().zip(&key) {
                if value.is_null() {
                    return Err(Error::Constraint(ConstraintError::NullNotAllowed {
                        constraint: self.name.clone(),
                        table: self.table.clone(),
                        column: column.clone(),
                    }));
                }
            }
        } else if key.iter().any(Value::is_null) {
            return Ok(RowCheck::Pass);
        }

        // An unchanged key cannot newly collide.
        if let Some(old) = old_row {
            if old.project(columns) == key {
                return Ok(RowCheck::Pass);
            }
        }

        let occupied_by = match &self.backing {
            Some(binding) => binding.index.lookup(&key)?,
            None => self.scan_for_key(cx, columns, &key)?,
        };
        match occupied_by {
            Some(existing) if Some(existing) != cx.row_id => {
                Err(Error::Constraint(ConstraintError::UniqueViolation {
                    constraint: self.name.clone(),
                    table: self.table.clone(),
                    columns: columns.to_vec(),
                    values: describe_values(&key),
                }))
            }
            _ => Ok(RowCheck::Pass),
        }
    }

    fn check_referential(
        &self,
        cx: &CheckContext<'_>,
        mutated_table: &str,
        old_row: Option<&Row>,
        new_row: Option<&Row>,
    ) -> Result<RowCheck, Error> {
        let ConstraintKind::Referential {
            columns,
            referenced_table,
            referenced_columns,
            on_delete,
            on_update,
        } = &self.kind
        else {
            return Ok(RowCheck::Pass);
        };

        // Owning side: an inserted or updated row must point at an
        // existing referenced key, unless the foreign key contains NULL
        // (MATCH SIMPLE: vacuously satisfied).
        if mutated_table == self.table {
            if let Some(new) = new_row {
                let fk = new.project(columns);
                let unchanged = old_row.map(|old| old.project(columns) == fk).unwrap_or(false);
                let satisfies_itself = referenced_table == &self.table
                    && new.project(referenced_columns) == fk;

                if !fk.iter().any(Value::is_null) && !unchanged && !satisfies_itself {
                    let exists =
                        self.referenced_key_exists(cx, referenced_table, referenced_columns, &fk)?;
                    if !exists {
                        return Err(Error::Constraint(ConstraintError::ForeignKeyViolation {
                            constraint: self.name.clone(),
                            table: self.table.clone(),
                            referenced_table: referenced_table.clone(),
                            values: describe_values(&fk),
                        }));
                    }
                }
            }
        }

        // Referenced side: deleting a row, or changing its key, must not
        // strand referencing rows. RESTRICT rejects; CASCADE and SET NULL
        // signal the rows the cascade executor must act on.
        if mutated_table == referenced_table {
            if let Some(old) = old_row {
                let old_key = old.project(referenced_columns);
                if old_key.iter().any(Value::is_null) {
                    return Ok(RowCheck::Pass);
                }
                let (action, cascade) = match new_row {
                    None => (*on_delete, CascadeAction::Delete),
                    Some(new) => {
                        let new_key = new.project(referenced_columns);
                        if new_key == old_key {
                            return Ok(RowCheck::Pass);
                        }
                        (*on_update, CascadeAction::SetValues(new_key))
                    }
                };

                let mut rows = self.find_referencing(cx, &old_key)?;
                if self.table == mutated_table {
                    // A self-referencing row does not block its own mutation.
                    rows.retain(|id| Some(*id) != cx.row_id);
                }
                if rows.is_empty() {
                    return Ok(RowCheck::Pass);
                }

                return match action {
                    ReferentialAction::Restrict => {
                        Err(Error::Constraint(ConstraintError::RestrictViolation {
                            constraint: self.name.clone(),
                            table: referenced_table.clone(),
                            referencing_table: self.table.clone(),
                            count: rows.len(),
                        }))
                    }
                    ReferentialAction::Cascade => {
                        Ok(RowCheck::CascadeRequired(CascadeRequest {
                            constraint: self.name.clone(),
                            table: self.table.clone(),
                            columns: columns.clone(),
                            rows,
                            action: cascade,
                        }))
                    }
                    ReferentialAction::SetNull => {
                        Ok(RowCheck::CascadeRequired(CascadeRequest {
                            constraint: self.name.clone(),
                            table: self.table.clone(),
                            columns: columns.clone(),
                            rows,
                            action: CascadeAction::SetNull,
                        }))
                    }
                };
            }
        }

        Ok(RowCheck::Pass)
    }

    /// Look for a referenced key, preferring the referenced table's
    /// unique index and falling back to a scan if none resolves.
    fn referenced_key_exists(
        &self,
        cx: &CheckContext<'_>,
        referenced_table: &str,
        referenced_columns: &[String],
        fk: &[Value],
    ) -> Result<bool, Error> {
        if let Some(index) = resolve_key_index(cx.sets, referenced_table, referenced_columns) {
            // The index's column order may differ from the declaration.
            let by_column: HashMap<&str, &Value> = referenced_columns
                .iter()
                .map(|c| c.as_str())
                .zip(fk.iter())
                .collect();
            let key: Vec<Value> = index
                .columns()
                .iter()
                .map(|c| (*by_column[c.as_str()]).clone())
                .collect();
            return Ok(index.lookup(&key)?.is_some());
        }

        for result in cx.store.scan(referenced_table)? {
            let (_, row) = result?;
            if row.project(referenced_columns) == fk {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Find rows of the owning table holding the given foreign key,
    /// through the backing index when bound.
    fn find_referencing(&self, cx: &CheckContext<'_>, key: &[Value]) -> Result<Vec<RowId>, Error> {
        if let Some(binding) = &self.backing {
            return binding.index.find_rows(key);
        }
        let columns = self.key_columns().unwrap_or(&[]);
        let mut rows = Vec::new();
        for result in cx.store.scan(&self.table)? {
            let (row_id, row) = result?;
            if row.project(columns) == key {
                rows.push(row_id);
            }
        }
        Ok(rows)
    }

    fn scan_for_key(
        &self,
        cx: &CheckContext<'_>,
        columns: &[String],
        key: &[Value],
    ) -> Result<Option<RowId>, Error> {
        for result in cx.store.scan(&self.table)? {
            let (row_id, row) = result?;
            if Some(row_id) != cx.row_id && row.project(columns) == key {
                return Ok(Some(row_id));
            }
        }
        Ok(None)
    }
}

/// Find the unique index enforcing a key over exactly these columns, via
/// the referenced table's PRIMARY KEY or UNIQUE constraints.
pub(crate) fn resolve_key_index(
    sets: &HashMap<String, ConstraintSet>,
    table: &str,
    columns: &[String],
) -> Option<Arc<TableIndex>> {
    let set = sets.get(table)?;
    let mut wanted: Vec<&str> = columns.iter().map(|c| c.as_str()).collect();
    wanted.sort_unstable();

    set.iter()
        .filter(|c| {
            matches!(
                c.constraint_type(),
                ConstraintType::PrimaryKey | ConstraintType::Unique
            )
        })
        .find(|c| {
            let mut key: Vec<&str> = c
                .key_columns()
                .unwrap_or(&[])
                .iter()
                .map(|s| s.as_str())
                .collect();
            key.sort_unstable();
            key == wanted
        })
        .and_then(|c| c.unique_index())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDef, ColumnType, TableDef};
    use crate::storage::{IndexManager, IndexSpec, StorageConfig};

    fn test_indexes() -> IndexManager {
        let db = StorageConfig::temporary().to_sled_config().open().unwrap();
        IndexManager::new(db)
    }

    #[test]
    fn test_priority_order() {
        assert!(ConstraintType::Check.priority() < ConstraintType::PrimaryKey.priority());
        assert!(ConstraintType::PrimaryKey.priority() < ConstraintType::Unique.priority());
        assert!(ConstraintType::Unique.priority() < ConstraintType::Referential.priority());
    }

    #[test]
    fn test_is_before_partition() {
        let check =
            Constraint::new(1, &ConstraintDef::check("c", "t", "a > 0"), false).unwrap();
        let unique = Constraint::new(2, &ConstraintDef::unique("u", "t", "a"), false).unwrap();
        let pk = Constraint::new(3, &ConstraintDef::primary_key("p", "t", ["a"]), false).unwrap();
        let fk =
            Constraint::new(4, &ConstraintDef::foreign_key("f", "t", "a", "r", "b"), false)
                .unwrap();

        assert!(!check.is_before());
        assert!(!unique.is_before());
        assert!(!pk.is_before());
        assert!(fk.is_before());
    }

    #[test]
    fn test_contains_column() {
        let check = Constraint::new(
            1,
            &ConstraintDef::check("c", "t", "a > 0 AND b IS NOT NULL"),
            false,
        )
        .unwrap();
        assert!(check.contains_column("a"));
        assert!(check.contains_column("b"));
        assert!(!check.contains_column("z"));

        let fk =
            Constraint::new(2, &ConstraintDef::foreign_key("f", "t", "a", "r", "rb"), false)
                .unwrap();
        assert!(fk.contains_column("a"));
        assert!(!fk.contains_column("rb"));
        assert!(fk.references_column("r", "rb"));
    }

    #[test]
    fn test_set_index_owner_idempotent() {
        let indexes = test_indexes();
        let index = indexes
            .create_index(IndexSpec::new("t_a_idx", "t", ["a"]).unique())
            .unwrap();

        let mut constraint =
            Constraint::new(1, &ConstraintDef::unique("u", "t", "a"), false).unwrap();
        constraint.bind_index(index.clone(), false);
        assert!(constraint.uses_index(&index));
        assert!(!constraint.backing_index().unwrap().owned);

        constraint.set_index_owner(index.clone());
        assert!(constraint.backing_index().unwrap().owned);

        // Second call with the same index changes nothing.
        constraint.set_index_owner(index.clone());
        assert!(constraint.uses_index(&index));
        assert!(constraint.backing_index().unwrap().owned);
    }

    #[test]
    fn test_unique_index_accessor() {
        let indexes = test_indexes();
        let unique = indexes
            .create_index(IndexSpec::new("u_idx", "t", ["a"]).unique())
            .unwrap();
        let plain = indexes
            .create_index(IndexSpec::new("p_idx", "t", ["a"]))
            .unwrap();

        let mut constraint =
            Constraint::new(1, &ConstraintDef::unique("u", "t", "a"), false).unwrap();
        assert!(constraint.unique_index().is_none());

        constraint.bind_index(unique, true);
        assert!(constraint.unique_index().is_some());

        let mut fk =
            Constraint::new(2, &ConstraintDef::foreign_key("f", "t", "a", "r", "b"), false)
                .unwrap();
        fk.bind_index(plain, true);
        assert!(fk.unique_index().is_none());
    }

    #[test]
    fn test_create_sql() {
        let check = Constraint::new(
            1,
            &ConstraintDef::check("age_positive", "people", "age >= 0"),
            false,
        )
        .unwrap();
        assert_eq!(
            check.create_sql_without_indexes(),
            "ALTER TABLE people ADD CONSTRAINT age_positive CHECK (age >= 0)"
        );

        let fk = Constraint::new(
            2,
            &ConstraintDef::foreign_key("orders_customer_fk", "orders", "customer_id", "customers", "id")
                .with_on_delete(ReferentialAction::Cascade),
            false,
        )
        .unwrap();
        assert_eq!(
            fk.create_sql_without_indexes(),
            "ALTER TABLE orders ADD CONSTRAINT orders_customer_fk FOREIGN KEY (customer_id) \
             REFERENCES customers (id) ON DELETE CASCADE ON UPDATE RESTRICT"
        );
    }

    #[test]
    fn test_rename_and_rebuild() {
        let snapshot = CatalogSnapshot::new(1).with_table(
            TableDef::new("people")
                .with_column(ColumnDef::new("years", ColumnType::Int))
                .with_column(ColumnDef::new("name", ColumnType::String)),
        );

        let mut check = Constraint::new(
            1,
            &ConstraintDef::check("age_positive", "people", "age >= 0"),
            false,
        )
        .unwrap();

        check.apply_column_rename("people", "age", "years");
        check.rebuild(&snapshot).unwrap();
        assert_eq!(
            check.create_sql_without_indexes(),
            "ALTER TABLE people ADD CONSTRAINT age_positive CHECK (years >= 0)"
        );
    }

    #[test]
    fn test_rebuild_reports_unresolvable() {
        let snapshot = CatalogSnapshot::new(1)
            .with_table(TableDef::new("people").with_column(ColumnDef::new("name", ColumnType::String)));

        let mut check = Constraint::new(
            1,
            &ConstraintDef::check("age_positive", "people", "age >= 0"),
            false,
        )
        .unwrap();

        let result = check.rebuild(&snapshot);
        assert!(matches!(
            result,
            Err(Error::Schema(SchemaError::UnresolvableReference { .. }))
        ));
    }

    #[test]
    fn test_record_roundtrip() {
        let def = ConstraintDef::foreign_key("f", "orders", "customer_id", "customers", "id")
            .with_on_delete(ReferentialAction::SetNull);
        let constraint = Constraint::new(7, &def, true).unwrap();

        let record = constraint.to_record();
        assert_eq!(record.id, 7);
        assert!(record.temporary);
        assert_eq!(record.def, def);

        let rebuilt = Constraint::from_record(&record, None).unwrap();
        assert_eq!(rebuilt.name(), "f");
        assert_eq!(rebuilt.constraint_type(), ConstraintType::Referential);
        assert!(rebuilt.is_temporary());
    }
}
