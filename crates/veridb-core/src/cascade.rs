//! Cascade execution for referential actions.
//!
//! Referential constraints only *signal* which referencing rows need a
//! CASCADE or SET NULL action; this executor performs the row mutations
//! on the constraint's behalf, standing in for the transaction layer.
//! Cascaded mutations re-enter the normal validate/apply pipeline, so
//! nested constraints fire recursively, bounded by a depth limit.

use std::collections::HashMap;

use crate::catalog::CatalogSnapshot;
use crate::constraint::{CascadeAction, CascadeRequest, ConstraintSet};
use crate::database::Database;
use crate::error::{CascadeError, Error};
use crate::session::Session;
use crate::value::{Row, RowId, Value};

/// Maximum cascade depth to prevent runaway recursion.
const MAX_CASCADE_DEPTH: usize = 100;

/// Executes the cascade actions referential constraints signal.
pub(crate) struct CascadeExecutor<'a> {
    database: &'a Database,
    snapshot: &'a CatalogSnapshot,
    sets: &'a HashMap<String, ConstraintSet>,
}

impl<'a> CascadeExecutor<'a> {
    /// Create a cascade executor over one statement's catalog state.
    pub(crate) fn new(
        database: &'a Database,
        snapshot: &'a CatalogSnapshot,
        sets: &'a HashMap<String, ConstraintSet>,
    ) -> Self {
        Self {
            database,
            snapshot,
            sets,
        }
    }

    /// Perform the requested actions at the given recursion depth.
    pub(crate) fn execute(
        &self,
        session: &Session,
        requests: Vec<CascadeRequest>,
        depth: usize,
    ) -> Result<(), Error> {
        if depth >= MAX_CASCADE_DEPTH {
            return Err(CascadeError::MaxDepthExceeded { depth }.into());
        }

        for request in requests {
            let CascadeRequest {
                constraint,
                table,
                columns,
                rows,
                action,
            } = request;
            tracing::debug!(
                constraint = %constraint,
                table = %table,
                rows = rows.len(),
                "executing cascade action"
            );

            match action {
                CascadeAction::Delete => {
                    for row_id in rows {
                        // Rows already removed by an earlier branch of the
                        // cascade are skipped inside delete_inner.
                        self.database.delete_inner(
                            session,
                            self.snapshot,
                            self.sets,
                            &table,
                            row_id,
                            depth + 1,
                        )?;
                    }
                }
                CascadeAction::SetNull => {
                    let mut patch = Row::new();
                    for column in &columns {
                        patch.set(column.clone(), Value::Null);
                    }
                    self.apply_patch(session, &table, &rows, patch, depth)?;
                }
                CascadeAction::SetValues(values) => {
                    let mut patch = Row::new();
                    for (column, value) in columns.iter().zip(values) {
                        patch.set(column.clone(), value);
                    }
                    self.apply_patch(session, &table, &rows, patch, depth)?;
                }
            }
        }
        Ok(())
    }

    fn apply_patch(
        &self,
        session: &Session,
        table: &str,
        rows: &[RowId],
        patch: Row,
        depth: usize,
    ) -> Result<(), Error> {
        for row_id in rows {
            if self.database.get(table, *row_id)?.is_none() {
                continue;
            }
            self.database.update_inner(
                session,
                self.snapshot,
                self.sets,
                table,
                *row_id,
                patch.clone(),
                depth + 1,
            )?;
        }
        Ok(())
    }
}
