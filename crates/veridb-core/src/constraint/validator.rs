//! Constraint validation for row mutations.
//!
//! For every mutation the caller provides the old row (absent on
//! insert) and the new row (absent on delete). Validation runs in two
//! phases around the physical change: the "before" group (referential
//! constraints, which must see pre-mutation state) and the "after"
//! group (CHECK and key constraints, which see the post-mutation row),
//! each in priority order. The validator signals failure and cascade
//! work; it never mutates rows and never rolls anything back.

use std::collections::HashMap;

use crate::catalog::CatalogSnapshot;
use crate::error::Error;
use crate::session::Session;
use crate::storage::RowStore;
use crate::value::{Row, RowId};

use super::constraint::{CascadeRequest, CheckContext, RowCheck};
use super::set::ConstraintSet;

/// Constraint validator for row mutations against one catalog state.
pub struct ConstraintValidator<'a> {
    snapshot: &'a CatalogSnapshot,
    store: &'a RowStore,
    sets: &'a HashMap<String, ConstraintSet>,
}

impl<'a> ConstraintValidator<'a> {
    /// Create a validator over the given catalog state and constraint
    /// registry.
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

    fn context<'b>(&'b self, session: &'b Session, row_id: Option<RowId>) -> CheckContext<'b> {
        CheckContext {
            session,
            snapshot: self.snapshot,
            store: self.store,
            sets: self.sets,
            row_id,
        }
    }

    /// Run the "before" group: the mutated table's own referential
    /// constraints, then referential constraints of other tables that
    /// reference it (in table-name order, registration order within a
    /// set). Returns the cascade work the mutation requires; a RESTRICT
    /// violation or dangling reference fails here.
    pub fn validate_before(
        &self,
        session: &Session,
        table: &str,
        old_row: Option<&Row>,
        new_row: Option<&Row>,
        row_id: Option<RowId>,
    ) -> Result<Vec<CascadeRequest>, Error> {
        let cx = self.context(session, row_id);
        let mut requests = Vec::new();

        if let Some(set) = self.sets.get(table) {
            for constraint in set.iter_before() {
                session.check_interrupted()?;
                if let RowCheck::CascadeRequired(request) =
                    constraint.check_row(&cx, table, old_row, new_row)?
                {
                    requests.push(request);
                }
            }
        }

        // Referenced-side checks live on other tables' constraints.
        let mut others: Vec<&String> = self.sets.keys().filter(|t| t.as_str() != table).collect();
        others.sort();
        for other in others {
            for constraint in self.sets[other].iter_before() {
                if constraint.referenced_table() != Some(table) {
                    continue;
                }
                session.check_interrupted()?;
                if let RowCheck::CascadeRequired(request) =
                    constraint.check_row(&cx, table, old_row, new_row)?
                {
                    requests.push(request);
                }
            }
        }

        Ok(requests)
    }

    /// Run the "after" group (CHECK, PRIMARY KEY, UNIQUE) in priority
    /// order against the post-mutation row.
    pub fn validate_after(
        &self,
        session: &Session,
        table: &str,
        old_row: Option<&Row>,
        new_row: Option<&Row>,
        row_id: Option<RowId>,
    ) -> Result<(), Error> {
        let cx = self.context(session, row_id);
        if let Some(set) = self.sets.get(table) {
            for constraint in set.iter_after() {
                session.check_interrupted()?;
                constraint.check_row(&cx, table, old_row, new_row)?;
            }
        }
        Ok(())
    }

    /// Validate a mutation without applying it: both phases back to
    /// back. Returns the cascade work the mutation would require.
    pub fn validate_mutation(
        &self,
        session: &Session,
        table: &str,
        old_row: Option<&Row>,
        new_row: Option<&Row>,
        row_id: Option<RowId>,
    ) -> Result<Vec<CascadeRequest>, Error> {
        let requests = self.validate_before(session, table, old_row, new_row, row_id)?;
        self.validate_after(session, table, old_row, new_row, row_id)?;
        Ok(requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{
        ColumnDef, ColumnType, ConstraintDef, ReferentialAction, TableDef,
    };
    use crate::constraint::{CascadeAction, Constraint};
    use crate::error::ConstraintError;
    use crate::storage::{IndexManager, IndexSpec, StorageConfig};
    use crate::value::Value;

    struct Env {
        snapshot: CatalogSnapshot,
        store: RowStore,
        indexes: IndexManager,
        sets: HashMap<String, ConstraintSet>,
        session: Session,
    }

    /// customers(id PK) <- orders(customer_id FK), orders.total CHECK > 0.
    fn referential_env(on_delete: ReferentialAction) -> Env {
        let db = StorageConfig::temporary().to_sled_config().open().unwrap();
        let store = RowStore::new(db.clone());
        let indexes = IndexManager::new(db);

        let snapshot = CatalogSnapshot::new(1)
            .with_table(
                TableDef::new("customers")
                    .with_column(ColumnDef::new("id", ColumnType::Int).not_null()),
            )
            .with_table(
                TableDef::new("orders")
                    .with_column(ColumnDef::new("id", ColumnType::Int).not_null())
                    .with_column(ColumnDef::new("customer_id", ColumnType::Int))
                    .with_column(ColumnDef::new("total", ColumnType::Float)),
            );

        let pk_index = indexes
            .create_index(IndexSpec::new("customers_pk_idx", "customers", ["id"]).unique())
            .unwrap();
        let mut pk =
            Constraint::new(1, &ConstraintDef::primary_key("customers_pk", "customers", ["id"]), false)
                .unwrap();
        pk.bind_index(pk_index, true);

        let fk_index = indexes
            .create_index(IndexSpec::new("orders_customer_fk_idx", "orders", ["customer_id"]))
            .unwrap();
        let mut fk = Constraint::new(
            2,
            &ConstraintDef::foreign_key("orders_customer_fk", "orders", "customer_id", "customers", "id")
                .with_on_delete(on_delete),
            false,
        )
        .unwrap();
        fk.bind_index(fk_index, true);

        let check = Constraint::new(
            3,
            &ConstraintDef::check("orders_total_positive", "orders", "total > 0"),
            false,
        )
        .unwrap();

        let mut sets = HashMap::new();
        let mut customers = ConstraintSet::new();
        customers.insert(pk);
        sets.insert("customers".to_string(), customers);
        let mut orders = ConstraintSet::new();
        orders.insert(fk);
        orders.insert(check);
        sets.insert("orders".to_string(), orders);

        Env {
            snapshot,
            store,
            indexes,
            sets,
            session: Session::new(1),
        }
    }

    /// Store a row and maintain every index on its table.
    fn apply_insert(env: &Env, table: &str, row_id: RowId, row: &Row) {
        for index in env.indexes.indexes_for(table) {
            index.insert(&index.project(row), row_id).unwrap();
        }
        env.store.put(table, row_id, row).unwrap();
    }

    fn validator(env: &Env) -> ConstraintValidator<'_> {
        ConstraintValidator::new(&env.snapshot, &env.store, &env.sets)
    }

    #[test]
    fn test_insert_rejected_without_referenced_row() {
        let env = referential_env(ReferentialAction::Restrict);

        let order = Row::new().with("id", 1i64).with("customer_id", 5i64).with("total", 10.0);
        let result =
            validator(&env).validate_mutation(&env.session, "orders", None, Some(&order), Some(10));

        assert!(matches!(
            result,
            Err(Error::Constraint(ConstraintError::ForeignKeyViolation { .. }))
        ));
    }

    #[test]
    fn test_insert_accepted_once_referenced_row_exists() {
        let env = referential_env(ReferentialAction::Restrict);
        apply_insert(&env, "customers", 1, &Row::new().with("id", 5i64));

        let order = Row::new().with("id", 1i64).with("customer_id", 5i64).with("total", 10.0);
        let requests = validator(&env)
            .validate_mutation(&env.session, "orders", None, Some(&order), Some(10))
            .unwrap();
        assert!(requests.is_empty());
    }

    #[test]
    fn test_null_fk_is_vacuously_satisfied() {
        let env = referential_env(ReferentialAction::Restrict);

        let order = Row::new()
            .with("id", 1i64)
            .with("customer_id", Value::Null)
            .with("total", 10.0);
        validator(&env)
            .validate_mutation(&env.session, "orders", None, Some(&order), Some(10))
            .unwrap();
    }

    #[test]
    fn test_restrict_blocks_referenced_delete() {
        let env = referential_env(ReferentialAction::Restrict);
        let customer = Row::new().with("id", 5i64);
        apply_insert(&env, "customers", 1, &customer);
        apply_insert(
            &env,
            "orders",
            10,
            &Row::new().with("id", 1i64).with("customer_id", 5i64).with("total", 10.0),
        );

        let result =
            validator(&env).validate_before(&env.session, "customers", Some(&customer), None, Some(1));
        assert!(matches!(
            result,
            Err(Error::Constraint(ConstraintError::RestrictViolation { count: 1, .. }))
        ));
    }

    #[test]
    fn test_cascade_is_signaled_not_executed() {
        let env = referential_env(ReferentialAction::Cascade);
        let customer = Row::new().with("id", 5i64);
        apply_insert(&env, "customers", 1, &customer);
        apply_insert(
            &env,
            "orders",
            10,
            &Row::new().with("id", 1i64).with("customer_id", 5i64).with("total", 10.0),
        );

        let requests = validator(&env)
            .validate_before(&env.session, "customers", Some(&customer), None, Some(1))
            .unwrap();

        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].table, "orders");
        assert_eq!(requests[0].rows, vec![10]);
        assert_eq!(requests[0].action, CascadeAction::Delete);
        // The validator did not touch the rows.
        assert_eq!(env.store.row_count("orders").unwrap(), 1);
    }

    #[test]
    fn test_restrict_blocks_referenced_key_update() {
        let env = referential_env(ReferentialAction::Restrict);
        let customer = Row::new().with("id", 5i64);
        apply_insert(&env, "customers", 1, &customer);
        apply_insert(
            &env,
            "orders",
            10,
            &Row::new().with("id", 1i64).with("customer_id", 5i64).with("total", 10.0),
        );

        // Re-key the customer; the FK's on_update action is RESTRICT here.
        let rekeyed = Row::new().with("id", 6i64);
        let result = validator(&env).validate_before(
            &env.session,
            "customers",
            Some(&customer),
            Some(&rekeyed),
            Some(1),
        );
        assert!(matches!(
            result,
            Err(Error::Constraint(ConstraintError::RestrictViolation { .. }))
        ));

        // An update that keeps the key is fine.
        let requests = validator(&env)
            .validate_before(&env.session, "customers", Some(&customer), Some(&customer), Some(1))
            .unwrap();
        assert!(requests.is_empty());
    }

    #[test]
    fn test_after_group_runs_check_before_keys() {
        let env = referential_env(ReferentialAction::Restrict);
        apply_insert(&env, "customers", 1, &Row::new().with("id", 5i64));

        // Violates both the CHECK and (hypothetically) nothing else;
        // the CHECK fires first because of priority order.
        let order = Row::new()
            .with("id", 1i64)
            .with("customer_id", 5i64)
            .with("total", -1.0);
        let result =
            validator(&env).validate_after(&env.session, "orders", None, Some(&order), Some(10));
        assert!(matches!(
            result,
            Err(Error::Constraint(ConstraintError::CheckViolation { .. }))
        ));
    }

    #[test]
    fn test_unique_probe_excludes_own_row() {
        let env = referential_env(ReferentialAction::Restrict);
        let customer = Row::new().with("id", 5i64);
        apply_insert(&env, "customers", 1, &customer);

        // Updating the row to its own key must not self-collide.
        validator(&env)
            .validate_after(&env.session, "customers", Some(&customer), Some(&customer), Some(1))
            .unwrap();

        // A different row with the same key does collide.
        let result =
            validator(&env).validate_after(&env.session, "customers", None, Some(&customer), Some(2));
        assert!(matches!(
            result,
            Err(Error::Constraint(ConstraintError::UniqueViolation { .. }))
        ));
    }

    #[test]
    fn test_interrupted_session_aborts_validation() {
        let env = referential_env(ReferentialAction::Restrict);
        apply_insert(&env, "customers", 1, &Row::new().with("id", 5i64));
        env.session.interrupt();

        let order = Row::new().with("id", 1i64).with("customer_id", 5i64).with("total", 10.0);
        let result =
            validator(&env).validate_mutation(&env.session, "orders", None, Some(&order), Some(10));
        assert!(matches!(result, Err(Error::Interrupted)));
    }
}
