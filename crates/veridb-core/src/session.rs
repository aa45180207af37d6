//! Session handles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Error;

/// A session: the statement-execution context constraint checks run in.
///
/// Carries an interrupt flag so long-running work (notably the bulk
/// validator's full-table scan) can be aborted from another thread,
/// leaving the catalog and data unchanged.
#[derive(Debug, Clone)]
pub struct Session {
    id: u64,
    interrupted: Arc<AtomicBool>,
}

impl Session {
    /// Create a session with the given id.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Session id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Request interruption of the currently running statement.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    /// Whether interruption has been requested.
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Clear the interrupt flag for the next statement.
    pub fn reset(&self) {
        self.interrupted.store(false, Ordering::SeqCst);
    }

    /// Fail with `Error::Interrupted` if interruption was requested.
    pub fn check_interrupted(&self) -> Result<(), Error> {
        if self.is_interrupted() {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }
}
