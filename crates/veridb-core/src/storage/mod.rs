//! Storage layer: row store, physical indexes, and configuration.

mod config;
mod index;
mod store;

pub use config::StorageConfig;
pub use index::{IndexManager, IndexSpec, TableIndex};
pub use store::RowStore;

/// Current time in microseconds since the Unix epoch.
pub(crate) fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
