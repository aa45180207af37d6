//! Constraint definitions as stored in the catalog.

use rkyv::{Archive, Deserialize, Serialize};

/// Action taken on referencing rows when a referenced row is deleted or
/// its key updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Archive, Serialize, Deserialize)]
pub enum ReferentialAction {
    /// Reject the mutation while referencing rows exist.
    #[default]
    Restrict,
    /// Delete (on delete) or re-key (on update) the referencing rows.
    Cascade,
    /// Set the referencing foreign key columns to NULL.
    SetNull,
}

impl ReferentialAction {
    /// SQL keyword form, for DDL text.
    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
        }
    }
}

/// A user-facing constraint definition, as handed to `add_constraint`.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum ConstraintDef {
    /// Check constraint (expression must not evaluate to false).
    Check {
        /// Constraint name.
        name: String,
        /// Table this constraint applies to.
        table: String,
        /// Boolean expression over the table's columns.
        expression: String,
    },
    /// Primary key constraint (unique, no NULL components, one per table).
    PrimaryKey {
        /// Constraint name.
        name: String,
        /// Table this constraint applies to.
        table: String,
        /// Key columns.
        columns: Vec<String>,
    },
    /// Uniqueness constraint (single or composite).
    Unique {
        /// Constraint name.
        name: String,
        /// Table this constraint applies to.
        table: String,
        /// Key columns.
        columns: Vec<String>,
    },
    /// Referential (foreign key) constraint.
    ForeignKey {
        /// Constraint name.
        name: String,
        /// Referencing table.
        table: String,
        /// Foreign key columns on the referencing table.
        columns: Vec<String>,
        /// Referenced table.
        referenced_table: String,
        /// Referenced key columns.
        referenced_columns: Vec<String>,
        /// Action when a referenced row is deleted.
        on_delete: ReferentialAction,
        /// Action when a referenced key is updated.
        on_update: ReferentialAction,
    },
}

impl ConstraintDef {
    /// Create a check constraint.
    pub fn check(
        name: impl Into<String>,
        table: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        ConstraintDef::Check {
            name: name.into(),
            table: table.into(),
            expression: expression.into(),
        }
    }

    /// Create a primary key constraint.
    pub fn primary_key(
        name: impl Into<String>,
        table: impl Into<String>,
        columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        ConstraintDef::PrimaryKey {
            name: name.into(),
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a unique constraint on a single column.
    pub fn unique(
        name: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        ConstraintDef::Unique {
            name: name.into(),
            table: table.into(),
            columns: vec![column.into()],
        }
    }

    /// Create a composite unique constraint.
    pub fn unique_composite(
        name: impl Into<String>,
        table: impl Into<String>,
        columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        ConstraintDef::Unique {
            name: name.into(),
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a single-column foreign key with RESTRICT actions.
    pub fn foreign_key(
        name: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
        referenced_table: impl Into<String>,
        referenced_column: impl Into<String>,
    ) -> Self {
        ConstraintDef::ForeignKey {
            name: name.into(),
            table: table.into(),
            columns: vec![column.into()],
            referenced_table: referenced_table.into(),
            referenced_columns: vec![referenced_column.into()],
            on_delete: ReferentialAction::Restrict,
            on_update: ReferentialAction::Restrict,
        }
    }

    /// Create a composite foreign key with RESTRICT actions.
    pub fn foreign_key_composite(
        name: impl Into<String>,
        table: impl Into<String>,
        columns: impl IntoIterator<Item = impl Into<String>>,
        referenced_table: impl Into<String>,
        referenced_columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        ConstraintDef::ForeignKey {
            name: name.into(),
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            referenced_table: referenced_table.into(),
            referenced_columns: referenced_columns.into_iter().map(Into::into).collect(),
            on_delete: ReferentialAction::Restrict,
            on_update: ReferentialAction::Restrict,
        }
    }

    /// Set the on-delete action of a foreign key. No-op for other kinds.
    pub fn with_on_delete(mut self, action: ReferentialAction) -> Self {
        if let ConstraintDef::ForeignKey { on_delete, .. } = &mut self {
            *on_delete = action;
        }
        self
    }

    /// Set the on-update action of a foreign key. No-op for other kinds.
    pub fn with_on_update(mut self, action: ReferentialAction) -> Self {
        if let ConstraintDef::ForeignKey { on_update, .. } = &mut self {
            *on_update = action;
        }
        self
    }

    /// Get the constraint name.
    pub fn name(&self) -> &str {
        match self {
            ConstraintDef::Check { name, .. }
            | ConstraintDef::PrimaryKey { name, .. }
            | ConstraintDef::Unique { name, .. }
            | ConstraintDef::ForeignKey { name, .. } => name,
        }
    }

    /// Get the owning table.
    pub fn table(&self) -> &str {
        match self {
            ConstraintDef::Check { table, .. }
            | ConstraintDef::PrimaryKey { table, .. }
            | ConstraintDef::Unique { table, .. }
            | ConstraintDef::ForeignKey { table, .. } => table,
        }
    }

    /// Check if this is a primary key constraint.
    pub fn is_primary_key(&self) -> bool {
        matches!(self, ConstraintDef::PrimaryKey { .. })
    }

    /// Check if this is a foreign key constraint.
    pub fn is_foreign_key(&self) -> bool {
        matches!(self, ConstraintDef::ForeignKey { .. })
    }
}

/// The persisted form of a registered constraint: the definition plus
/// the identity and index bookkeeping the runtime entity is rebuilt from.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct ConstraintRecord {
    /// Stable identifier within the schema.
    pub id: u64,
    /// Inherited from the owning table at creation.
    pub temporary: bool,
    /// Name of the backing index, if any.
    pub index_name: Option<String>,
    /// Whether the constraint owns the backing index's lifecycle.
    pub index_owned: bool,
    /// The definition.
    pub def: ConstraintDef,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let unique = ConstraintDef::unique("users_email_key", "users", "email");
        assert_eq!(unique.name(), "users_email_key");
        assert_eq!(unique.table(), "users");

        let pk = ConstraintDef::primary_key("users_pk", "users", ["id"]);
        assert!(pk.is_primary_key());

        let fk = ConstraintDef::foreign_key("orders_customer_fk", "orders", "customer_id", "customers", "id")
            .with_on_delete(ReferentialAction::Cascade);
        assert!(fk.is_foreign_key());
        if let ConstraintDef::ForeignKey {
            on_delete,
            on_update,
            ..
        } = fk
        {
            assert_eq!(on_delete, ReferentialAction::Cascade);
            assert_eq!(on_update, ReferentialAction::Restrict);
        }
    }

    #[test]
    fn test_composite_builders() {
        let unique = ConstraintDef::unique_composite("m_org_email_key", "members", ["org_id", "email"]);
        if let ConstraintDef::Unique { columns, .. } = unique {
            assert_eq!(columns, vec!["org_id", "email"]);
        } else {
            panic!("expected unique constraint");
        }
    }

    #[test]
    fn test_default_action_is_restrict() {
        assert_eq!(ReferentialAction::default(), ReferentialAction::Restrict);
        assert_eq!(ReferentialAction::SetNull.as_sql(), "SET NULL");
    }
}
