//! Existing-data validation for retroactively added constraints.
//!
//! Invoked once, synchronously, while an `add constraint` statement is
//! in flight and before the constraint becomes visible. Every existing
//! row is treated as a synthetic insert; the first violation aborts the
//! DDL with the table left exactly as before.

use std::collections::HashMap;

use crate::catalog::CatalogSnapshot;
use crate::error::{Error, SchemaError};
use crate::session::Session;
use crate::storage::RowStore;

use super::constraint::{CheckContext, Constraint};
use super::set::ConstraintSet;

/// Scans a table's existing rows against a constraint being attached.
pub struct BulkValidator<'a> {
    snapshot: &'a CatalogSnapshot,
    store: &'a RowStore,
    sets: &'a HashMap<String, ConstraintSet>,
}

impl<'a> BulkValidator<'a> {
    /// Create a bulk validator over the given catalog state.
    pub fn new(
        snapshot: &'a CatalogSnapshot,
        store: &'a RowStore,
        sets: &'a HashMap<String, ConstraintSet>,
    ) -> Self {
        Self {
            snapshot,
            store,
            sets,
        }
    }

    /// Validate all existing rows of the constraint's table, populating
    /// the backing index along the way when `populate_index` is set
    /// (that is, when the index was newly created for this constraint
    /// rather than adopted already filled).
    ///
    /// Duplicate keys surface through the unique index's insertion-time
    /// conflict detection; CHECK and REFERENTIAL rules run through the
    /// same `check_row` logic as live validation. The scan polls the
    /// session interrupt flag, and is skipped entirely when the table is
    /// provably empty.
    pub fn check_existing_data(
        &self,
        session: &Session,
        constraint: &Constraint,
        populate_index: bool,
    ) -> Result<(), Error> {
        let table = constraint.table();
        if self.store.is_empty(table)? {
            return Ok(());
        }

        tracing::debug!(
            constraint = %constraint.name(),
            table,
            "bulk-validating existing rows"
        );

        for result in self.store.scan(table)? {
            session.check_interrupted()?;
            let (row_id, row) = result?;

            if populate_index {
                if let Some(binding) = constraint.backing_index() {
                    binding
                        .index
                        .insert(&binding.index.project(&row), row_id)
                        .map_err(|e| wrap_violation(constraint, e))?;
                }
            }

            let cx = CheckContext {
                session,
                snapshot: self.snapshot,
                store: self.store,
                sets: self.sets,
                row_id: Some(row_id),
            };
            constraint
                .check_row(&cx, table, None, Some(&row))
                .map_err(|e| wrap_violation(constraint, e))?;
        }

        Ok(())
    }
}

/// Rewrap a row violation as a bulk-validation failure; interruption and
/// storage errors pass through unchanged.
fn wrap_violation(constraint: &Constraint, error: Error) -> Error {
    match error {
        Error::Constraint(source) => Error::Schema(SchemaError::ExistingDataViolation {
            constraint: constraint.name().to_string(),
            source,
        }),
        other => other,
    }
}
