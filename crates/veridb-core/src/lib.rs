//! VeriDB Core - constraint enforcement, catalog, and storage.
//!
//! The core of the VeriDB relational engine: a table's declared
//! integrity rules (CHECK, UNIQUE, PRIMARY KEY, REFERENTIAL) validated
//! on every row mutation, bulk-validated when added over existing data,
//! and kept consistent across schema renames and index-ownership
//! handoffs.

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod cascade;
pub mod catalog;
pub mod constraint;
mod database;
pub mod error;
pub mod expr;
pub mod session;
pub mod storage;
pub mod value;

pub use catalog::{
    Catalog, CatalogSnapshot, ColumnDef, ColumnType, ConstraintDef, ConstraintRecord,
    ReferentialAction, TableDef,
};
pub use constraint::{
    BulkValidator, CascadeAction, CascadeRequest, Constraint, ConstraintId, ConstraintSet,
    ConstraintType, ConstraintValidator, IndexBinding, RowCheck,
};
pub use database::Database;
pub use error::{CascadeError, ConstraintError, Error, ExprError, SchemaError};
pub use expr::{CheckExpr, Truth};
pub use session::Session;
pub use storage::{IndexManager, IndexSpec, RowStore, StorageConfig, TableIndex};
pub use value::{Row, RowId, Value};
