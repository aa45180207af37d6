//! End-to-end constraint enforcement tests against a real database
//! instance: temporary storage, full DDL/DML pipeline.

use veridb_core::{
    ColumnDef, ColumnType, ConstraintDef, ConstraintError, Database, Error, ReferentialAction,
    Row, SchemaError, Session, StorageConfig, TableDef, Value,
};

fn test_db() -> Database {
    Database::open(StorageConfig::temporary()).unwrap()
}

/// customers(id) with PK, orders(id, customer_id, total) with FK + CHECK.
fn shop(db: &Database, session: &Session, on_delete: ReferentialAction) {
    db.create_table(
        TableDef::new("customers")
            .with_column(ColumnDef::new("id", ColumnType::Int))
            .with_column(ColumnDef::new("name", ColumnType::String)),
    )
    .unwrap();
    db.create_table(
        TableDef::new("orders")
            .with_column(ColumnDef::new("id", ColumnType::Int))
            .with_column(ColumnDef::new("customer_id", ColumnType::Int))
            .with_column(ColumnDef::new("total", ColumnType::Float)),
    )
    .unwrap();

    db.add_constraint(session, ConstraintDef::primary_key("customers_pk", "customers", ["id"]))
        .unwrap();
    db.add_constraint(
        session,
        ConstraintDef::foreign_key("orders_customer_fk", "orders", "customer_id", "customers", "id")
            .with_on_delete(on_delete),
    )
    .unwrap();
    db.add_constraint(
        session,
        ConstraintDef::check("orders_total_positive", "orders", "total > 0"),
    )
    .unwrap();
}

#[test]
fn validation_order_follows_priority_not_creation_order() {
    let db = test_db();
    let session = db.session();
    db.create_table(
        TableDef::new("t")
            .with_column(ColumnDef::new("a", ColumnType::Int))
            .with_column(ColumnDef::new("b", ColumnType::Int)),
    )
    .unwrap();
    db.create_table(TableDef::new("r").with_column(ColumnDef::new("k", ColumnType::Int)))
        .unwrap();
    db.add_constraint(&session, ConstraintDef::primary_key("r_pk", "r", ["k"]))
        .unwrap();

    // Register in reverse priority order.
    db.add_constraint(&session, ConstraintDef::foreign_key("t_fk", "t", "b", "r", "k"))
        .unwrap();
    db.add_constraint(&session, ConstraintDef::unique("t_unique", "t", "a"))
        .unwrap();
    db.add_constraint(&session, ConstraintDef::primary_key("t_pk", "t", ["b"]))
        .unwrap();
    db.add_constraint(&session, ConstraintDef::check("t_check", "t", "a >= 0"))
        .unwrap();

    assert_eq!(
        db.constraint_names("t"),
        vec!["t_check", "t_pk", "t_unique", "t_fk"]
    );
}

#[test]
fn composite_unique_treats_null_as_distinct() {
    let db = test_db();
    let session = db.session();
    db.create_table(
        TableDef::new("pairs")
            .with_column(ColumnDef::new("a", ColumnType::Int))
            .with_column(ColumnDef::new("b", ColumnType::Int)),
    )
    .unwrap();
    db.add_constraint(
        &session,
        ConstraintDef::unique_composite("pairs_ab_key", "pairs", ["a", "b"]),
    )
    .unwrap();

    // (1, NULL) twice: NULL keeps the keys distinct.
    db.insert(&session, "pairs", Row::new().with("a", 1i64).with("b", Value::Null))
        .unwrap();
    db.insert(&session, "pairs", Row::new().with("a", 1i64).with("b", Value::Null))
        .unwrap();

    // (1, 2) twice: rejected.
    db.insert(&session, "pairs", Row::new().with("a", 1i64).with("b", 2i64))
        .unwrap();
    let result = db.insert(&session, "pairs", Row::new().with("a", 1i64).with("b", 2i64));
    assert!(matches!(
        result,
        Err(Error::Constraint(ConstraintError::UniqueViolation { .. }))
    ));
}

#[test]
fn primary_key_rejects_null_component() {
    let db = test_db();
    let session = db.session();
    db.create_table(TableDef::new("t").with_column(ColumnDef::new("a", ColumnType::Int)))
        .unwrap();
    db.add_constraint(&session, ConstraintDef::primary_key("t_pk", "t", ["a"]))
        .unwrap();

    let result = db.insert(&session, "t", Row::new().with("a", Value::Null));
    assert!(matches!(
        result,
        Err(Error::Constraint(ConstraintError::NullNotAllowed { .. }))
    ));
}

#[test]
fn check_accepts_unknown_and_rejects_false() {
    let db = test_db();
    let session = db.session();
    db.create_table(TableDef::new("people").with_column(ColumnDef::new("age", ColumnType::Int)))
        .unwrap();
    db.add_constraint(&session, ConstraintDef::check("age_positive", "people", "age >= 0"))
        .unwrap();

    // NULL age: unknown satisfies the constraint.
    db.insert(&session, "people", Row::new().with("age", Value::Null))
        .unwrap();

    let result = db.insert(&session, "people", Row::new().with("age", -1i64));
    assert!(matches!(
        result,
        Err(Error::Constraint(ConstraintError::CheckViolation { .. }))
    ));
}

#[test]
fn referential_integrity_on_insert_and_restrict_on_delete() {
    let db = test_db();
    let session = db.session();
    shop(&db, &session, ReferentialAction::Restrict);

    // No customer 5 yet: rejected.
    let dangling = Row::new().with("id", 1i64).with("customer_id", 5i64).with("total", 9.5);
    let result = db.insert(&session, "orders", dangling.clone());
    assert!(matches!(
        result,
        Err(Error::Constraint(ConstraintError::ForeignKeyViolation { .. }))
    ));

    // Accepted once the referenced row exists.
    let customer = db
        .insert(&session, "customers", Row::new().with("id", 5i64).with("name", "ada"))
        .unwrap();
    db.insert(&session, "orders", dangling).unwrap();

    // Deleting the referenced customer is rejected under RESTRICT.
    let result = db.delete(&session, "customers", customer);
    assert!(matches!(
        result,
        Err(Error::Constraint(ConstraintError::RestrictViolation { .. }))
    ));
    assert!(db.get("customers", customer).unwrap().is_some());
}

#[test]
fn add_unique_over_duplicates_fails_and_registers_nothing() {
    let db = test_db();
    let session = db.session();
    db.create_table(
        TableDef::new("users")
            .with_column(ColumnDef::new("id", ColumnType::Int))
            .with_column(ColumnDef::new("email", ColumnType::String)),
    )
    .unwrap();

    db.insert(&session, "users", Row::new().with("id", 1i64).with("email", "dup@example.com"))
        .unwrap();
    let duplicate = db
        .insert(&session, "users", Row::new().with("id", 2i64).with("email", "dup@example.com"))
        .unwrap();

    let result =
        db.add_constraint(&session, ConstraintDef::unique("users_email_key", "users", "email"));
    assert!(matches!(
        result,
        Err(Error::Schema(SchemaError::ExistingDataViolation { .. }))
    ));

    // Nothing registered, no index left behind, data untouched.
    assert!(db.constraint_names("users").is_empty());
    assert!(db.index_names("users").is_empty());
    assert_eq!(db.row_count("users").unwrap(), 2);

    // After removing the duplicate the same DDL succeeds.
    assert!(db.delete(&session, "users", duplicate).unwrap());
    db.add_constraint(&session, ConstraintDef::unique("users_email_key", "users", "email"))
        .unwrap();
}

#[test]
fn rename_column_rebuilds_check_constraint() {
    let db = test_db();
    let session = db.session();
    db.create_table(TableDef::new("people").with_column(ColumnDef::new("age", ColumnType::Int)))
        .unwrap();
    db.add_constraint(&session, ConstraintDef::check("age_positive", "people", "age >= 0"))
        .unwrap();
    db.insert(&session, "people", Row::new().with("age", 30i64))
        .unwrap();

    db.rename_column("people", "age", "years").unwrap();

    let sql = db.constraint_sql("people");
    assert_eq!(
        sql,
        vec!["ALTER TABLE people ADD CONSTRAINT age_positive CHECK (years >= 0)"]
    );

    // Semantics unchanged under the new name.
    db.insert(&session, "people", Row::new().with("years", 12i64))
        .unwrap();
    let result = db.insert(&session, "people", Row::new().with("years", -3i64));
    assert!(matches!(
        result,
        Err(Error::Constraint(ConstraintError::CheckViolation { .. }))
    ));
}

#[test]
fn rename_table_rebuilds_foreign_key() {
    let db = test_db();
    let session = db.session();
    shop(&db, &session, ReferentialAction::Restrict);
    db.insert(&session, "customers", Row::new().with("id", 5i64).with("name", "ada"))
        .unwrap();

    db.rename_table("customers", "clients").unwrap();

    let sql = db.constraint_sql("orders");
    assert!(sql
        .iter()
        .any(|s| s.contains("REFERENCES clients (id)")), "got {:?}", sql);

    // The FK still validates against the renamed table.
    db.insert(&session, "orders", Row::new().with("id", 1i64).with("customer_id", 5i64).with("total", 1.0))
        .unwrap();
    let result = db.insert(
        &session,
        "orders",
        Row::new().with("id", 2i64).with("customer_id", 6i64).with("total", 1.0),
    );
    assert!(matches!(
        result,
        Err(Error::Constraint(ConstraintError::ForeignKeyViolation { .. }))
    ));
}

#[test]
fn cascade_delete_and_set_null() {
    let db = test_db();
    let session = db.session();
    shop(&db, &session, ReferentialAction::Cascade);

    let customer = db
        .insert(&session, "customers", Row::new().with("id", 5i64).with("name", "ada"))
        .unwrap();
    db.insert(&session, "orders", Row::new().with("id", 1i64).with("customer_id", 5i64).with("total", 1.0))
        .unwrap();
    db.insert(&session, "orders", Row::new().with("id", 2i64).with("customer_id", 5i64).with("total", 2.0))
        .unwrap();

    db.delete(&session, "customers", customer).unwrap();
    assert_eq!(db.row_count("orders").unwrap(), 0);

    // Same shape with SET NULL.
    let db = test_db();
    let session = db.session();
    shop(&db, &session, ReferentialAction::SetNull);
    let customer = db
        .insert(&session, "customers", Row::new().with("id", 7i64).with("name", "bob"))
        .unwrap();
    let order = db
        .insert(&session, "orders", Row::new().with("id", 1i64).with("customer_id", 7i64).with("total", 1.0))
        .unwrap();

    db.delete(&session, "customers", customer).unwrap();
    let orphaned = db.get("orders", order).unwrap().unwrap();
    assert_eq!(orphaned.value("customer_id"), &Value::Null);
}

#[test]
fn update_cascade_rewrites_referencing_keys() {
    let db = test_db();
    let session = db.session();
    db.create_table(TableDef::new("customers").with_column(ColumnDef::new("id", ColumnType::Int)))
        .unwrap();
    db.create_table(
        TableDef::new("orders").with_column(ColumnDef::new("customer_id", ColumnType::Int)),
    )
    .unwrap();
    db.add_constraint(&session, ConstraintDef::primary_key("customers_pk", "customers", ["id"]))
        .unwrap();
    db.add_constraint(
        &session,
        ConstraintDef::foreign_key("orders_customer_fk", "orders", "customer_id", "customers", "id")
            .with_on_update(ReferentialAction::Cascade),
    )
    .unwrap();

    let customer = db
        .insert(&session, "customers", Row::new().with("id", 5i64))
        .unwrap();
    let order = db
        .insert(&session, "orders", Row::new().with("customer_id", 5i64))
        .unwrap();

    db.update(&session, "customers", customer, Row::new().with("id", 9i64))
        .unwrap();

    let rekeyed = db.get("orders", order).unwrap().unwrap();
    assert_eq!(rekeyed.value("customer_id"), &Value::Int(9));
}

#[test]
fn interrupted_bulk_validation_leaves_schema_unchanged() {
    let db = test_db();
    let session = db.session();
    db.create_table(TableDef::new("big").with_column(ColumnDef::new("n", ColumnType::Int)))
        .unwrap();
    for i in 0..20i64 {
        db.insert(&session, "big", Row::new().with("n", i)).unwrap();
    }

    session.interrupt();
    let result = db.add_constraint(&session, ConstraintDef::check("n_ok", "big", "n >= 0"));
    assert!(matches!(result, Err(Error::Interrupted)));

    session.reset();
    assert!(db.constraint_names("big").is_empty());
    assert_eq!(db.row_count("big").unwrap(), 20);

    // The same statement succeeds once the session is no longer
    // interrupted.
    db.add_constraint(&session, ConstraintDef::check("n_ok", "big", "n >= 0"))
        .unwrap();
}

#[test]
fn validate_mutation_reports_without_applying() {
    let db = test_db();
    let session = db.session();
    shop(&db, &session, ReferentialAction::Cascade);

    let customer_row = Row::new().with("id", 5i64).with("name", "ada");
    let customer = db.insert(&session, "customers", customer_row.clone()).unwrap();
    db.insert(&session, "orders", Row::new().with("id", 1i64).with("customer_id", 5i64).with("total", 1.0))
        .unwrap();

    // Deleting the customer would require cascading one order row.
    let requests = db
        .validate_mutation(&session, "customers", Some(&customer_row), None)
        .unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].table, "orders");
    assert_eq!(requests[0].rows.len(), 1);

    // Nothing moved.
    assert!(db.get("customers", customer).unwrap().is_some());
    assert_eq!(db.row_count("orders").unwrap(), 1);
}

#[test]
fn constraints_on_temporary_tables_are_temporary() {
    let db = test_db();
    let session = db.session();
    db.create_table(
        TableDef::new("scratch")
            .temporary()
            .with_column(ColumnDef::new("v", ColumnType::Int)),
    )
    .unwrap();
    db.add_constraint(&session, ConstraintDef::check("v_ok", "scratch", "v > 0"))
        .unwrap();

    // The constraint shares the table's teardown.
    db.drop_table("scratch", false).unwrap();
    assert!(db.constraint_names("scratch").is_empty());
    assert!(db.table_names().is_empty());
}
