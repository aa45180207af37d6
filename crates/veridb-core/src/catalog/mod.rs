//! Schema catalog.
//!
//! The catalog stores metadata about tables, columns, and registered
//! constraints, versioned as whole-schema snapshots.

mod catalog;
mod constraint;
mod schema;
mod table;

pub use catalog::Catalog;
pub use constraint::{ConstraintDef, ConstraintRecord, ReferentialAction};
pub use schema::CatalogSnapshot;
pub use table::{ColumnDef, ColumnType, TableDef};
