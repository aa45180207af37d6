//! Catalog manager for storing and retrieving schema metadata.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use sled::{Db, Tree};

use super::CatalogSnapshot;
use crate::error::Error;

/// Tree name for schema snapshots.
const SCHEMA_TREE: &str = "catalog:schemas";

/// Tree name for catalog metadata.
const META_TREE: &str = "catalog:meta";

/// Key for current schema version in meta tree.
const CURRENT_VERSION_KEY: &[u8] = b"current_version";

/// The catalog manager for schema metadata.
///
/// Keeps the full version history in sled and the current snapshot in an
/// in-memory cache. `apply` persists a new snapshot and swaps the cache
/// atomically with respect to readers.
pub struct Catalog {
    /// Schema snapshots tree.
    schema_tree: Tree,
    /// Metadata tree.
    meta_tree: Tree,
    /// Current schema version (cached).
    current_version: AtomicU64,
    /// Current snapshot (cached).
    current: RwLock<CatalogSnapshot>,
}

impl Catalog {
    /// Open or create a catalog using the given sled database.
    pub fn open(db: &Db) -> Result<Self, Error> {
        let schema_tree = db.open_tree(SCHEMA_TREE)?;
        let meta_tree = db.open_tree(META_TREE)?;

        let current_version = match meta_tree.get(CURRENT_VERSION_KEY)? {
            Some(bytes) => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes);
                u64::from_be_bytes(buf)
            }
            None => 0,
        };

        let mut current = CatalogSnapshot::default();
        if current_version > 0 {
            let key = current_version.to_be_bytes();
            if let Some(bytes) = schema_tree.get(key)? {
                current = CatalogSnapshot::from_bytes(&bytes)?;
            }
        }

        Ok(Self {
            schema_tree,
            meta_tree,
            current_version: AtomicU64::new(current_version),
            current: RwLock::new(current),
        })
    }

    /// Get the current schema version.
    pub fn current_version(&self) -> u64 {
        self.current_version.load(Ordering::SeqCst)
    }

    /// Clone the current snapshot, e.g. as the base for a copy-on-write
    /// DDL operation.
    pub fn snapshot(&self) -> CatalogSnapshot {
        self.current.read().clone()
    }

    /// Read the current snapshot under the cache lock.
    pub fn with_current<T>(&self, f: impl FnOnce(&CatalogSnapshot) -> T) -> T {
        f(&self.current.read())
    }

    /// Get a snapshot at a specific version.
    pub fn snapshot_at_version(&self, version: u64) -> Result<Option<CatalogSnapshot>, Error> {
        let key = version.to_be_bytes();
        match self.schema_tree.get(key)? {
            Some(bytes) => Ok(Some(CatalogSnapshot::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Persist a new snapshot as the next version and swap the cache.
    ///
    /// Returns the new version number.
    pub fn apply(&self, mut snapshot: CatalogSnapshot) -> Result<u64, Error> {
        let new_version = self.current_version() + 1;
        snapshot.version = new_version;

        let key = new_version.to_be_bytes();
        let value = snapshot.to_bytes()?;
        self.schema_tree.insert(key, value)?;
        self.meta_tree
            .insert(CURRENT_VERSION_KEY, &new_version.to_be_bytes())?;

        self.current_version.store(new_version, Ordering::SeqCst);
        *self.current.write() = snapshot;

        Ok(new_version)
    }

    /// List all schema versions.
    pub fn list_versions(&self) -> Result<Vec<u64>, Error> {
        let mut versions = Vec::new();
        for result in self.schema_tree.iter() {
            let (key, _) = result?;
            if key.len() == 8 {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&key);
                versions.push(u64::from_be_bytes(buf));
            }
        }
        versions.sort();
        Ok(versions)
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.schema_tree.flush()?;
        self.meta_tree.flush()?;
        Ok(())
    }
}
