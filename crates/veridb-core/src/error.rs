//! Core error types.

use thiserror::Error;

/// Core database errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Unknown table referenced by name.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// Unknown column referenced by name.
    #[error("unknown column {table}.{column}")]
    UnknownColumn {
        /// Table the lookup ran against.
        table: String,
        /// Column name that failed to resolve.
        column: String,
    },

    /// Row not found.
    #[error("row not found")]
    RowNotFound,

    /// Invalid data format.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A row failed an integrity rule.
    #[error("constraint violation: {0}")]
    Constraint(#[from] ConstraintError),

    /// A DDL operation failed.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Check expression parse error.
    #[error("expression error: {0}")]
    Expression(#[from] ExprError),

    /// Cascade execution error.
    #[error("cascade error: {0}")]
    Cascade(#[from] CascadeError),

    /// The session was interrupted mid-statement.
    #[error("statement interrupted")]
    Interrupted,
}

/// A row-level integrity violation.
///
/// Every variant carries the constraint name, the owning table, and a
/// description of the offending values. A violation aborts the mutating
/// statement; the enclosing transaction may continue.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConstraintError {
    /// A CHECK expression evaluated to false.
    #[error("check constraint {constraint} on {table} violated: {expression} is false for {values}")]
    CheckViolation {
        /// Constraint name.
        constraint: String,
        /// Owning table.
        table: String,
        /// The expression that failed.
        expression: String,
        /// The offending row values.
        values: String,
    },

    /// A UNIQUE or PRIMARY KEY key value already exists.
    #[error("unique constraint {constraint} on {table} violated: duplicate key ({}) = ({values})", .columns.join(", "))]
    UniqueViolation {
        /// Constraint name.
        constraint: String,
        /// Owning table.
        table: String,
        /// Key columns.
        columns: Vec<String>,
        /// The duplicated key values.
        values: String,
    },

    /// A PRIMARY KEY component was NULL.
    #[error("primary key constraint {constraint} on {table} violated: column {column} is NULL")]
    NullNotAllowed {
        /// Constraint name.
        constraint: String,
        /// Owning table.
        table: String,
        /// The NULL key component.
        column: String,
    },

    /// A foreign key value has no matching row in the referenced table.
    #[error("referential constraint {constraint} on {table} violated: ({values}) not present in {referenced_table}")]
    ForeignKeyViolation {
        /// Constraint name.
        constraint: String,
        /// Owning (referencing) table.
        table: String,
        /// Referenced table.
        referenced_table: String,
        /// The dangling key values.
        values: String,
    },

    /// A referenced row still has referencing rows under RESTRICT.
    #[error("referential constraint {constraint} violated: {count} row(s) in {referencing_table} still reference {table}")]
    RestrictViolation {
        /// Constraint name.
        constraint: String,
        /// Referenced table (whose row is being deleted or re-keyed).
        table: String,
        /// Referencing table holding the dangling rows.
        referencing_table: String,
        /// Number of referencing rows.
        count: usize,
    },
}

impl ConstraintError {
    /// The name of the violated constraint.
    pub fn constraint(&self) -> &str {
        match self {
            ConstraintError::CheckViolation { constraint, .. }
            | ConstraintError::UniqueViolation { constraint, .. }
            | ConstraintError::NullNotAllowed { constraint, .. }
            | ConstraintError::ForeignKeyViolation { constraint, .. }
            | ConstraintError::RestrictViolation { constraint, .. } => constraint,
        }
    }
}

/// A schema-change (DDL) failure.
///
/// All variants leave the catalog exactly as it was before the statement.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A constraint with this name already exists in the schema.
    #[error("duplicate constraint name: {0}")]
    DuplicateConstraintName(String),

    /// The table already has a primary key.
    #[error("table {0} already has a primary key")]
    DuplicatePrimaryKey(String),

    /// A table with this name already exists.
    #[error("duplicate table: {0}")]
    DuplicateTable(String),

    /// An index with this name already exists.
    #[error("duplicate index: {0}")]
    DuplicateIndex(String),

    /// No constraint with this name exists on the table.
    #[error("unknown constraint: {0}")]
    UnknownConstraint(String),

    /// No index with this name exists.
    #[error("unknown index: {0}")]
    UnknownIndex(String),

    /// Pre-existing rows violate a newly added constraint. The constraint
    /// was not registered and the table is unchanged.
    #[error("existing data violates constraint {constraint}: {source}")]
    ExistingDataViolation {
        /// The constraint that failed to attach.
        constraint: String,
        /// The underlying row violation.
        #[source]
        source: ConstraintError,
    },

    /// A rename left a constraint's table or column reference unresolvable.
    #[error("constraint {constraint} references unresolvable {reference}")]
    UnresolvableReference {
        /// The constraint that failed to rebuild.
        constraint: String,
        /// The table or column name that no longer resolves.
        reference: String,
    },

    /// The table is still referenced by a foreign key on another table.
    #[error("table {table} is referenced by constraint {constraint}")]
    TableReferenced {
        /// The table being dropped.
        table: String,
        /// The referencing constraint.
        constraint: String,
    },

    /// Foreign key referenced columns are not covered by a unique key.
    #[error("columns ({}) of table {table} are not covered by a primary key or unique constraint", .columns.join(", "))]
    ReferencedKeyMissing {
        /// Referenced table.
        table: String,
        /// Referenced columns.
        columns: Vec<String>,
    },
}

/// Errors that can occur while parsing a check expression.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprError {
    /// Unexpected token in the input.
    #[error("unexpected token {found} (expected {expected})")]
    UnexpectedToken {
        /// What the lexer produced.
        found: String,
        /// What the parser was looking for.
        expected: String,
    },

    /// Input ended mid-expression.
    #[error("unexpected end of expression")]
    UnexpectedEnd,

    /// A character sequence the lexer could not tokenize.
    #[error("invalid token at byte {0}")]
    InvalidToken(usize),

    /// Tokens left over after a complete expression.
    #[error("trailing input after expression: {0}")]
    TrailingInput(String),
}

/// Cascade execution errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CascadeError {
    /// Cascade recursion exceeded the depth limit.
    #[error("cascade depth limit exceeded at depth {depth}")]
    MaxDepthExceeded {
        /// The depth reached.
        depth: usize,
    },
}
