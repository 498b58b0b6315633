//! # Sync Status
//!
//! Progress snapshot for health checks. The worker writes it after every
//! job; readers copy it out under a short read lock.

use crate::domain::SyncPhase;
use parking_lot::RwLock;

/// Worker progress at the end of the last job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Local execution height.
    pub local_height: u64,
    /// Size of the primary pending set.
    pub pending_count: usize,
    /// Number of tracked branches.
    pub branch_count: usize,
    /// Current phase.
    pub phase: SyncPhase,
}

/// Shared progress snapshot.
#[derive(Debug)]
pub struct SyncStatus(RwLock<StatusSnapshot>);

impl Default for SyncStatus {
    fn default() -> Self {
        Self(RwLock::new(StatusSnapshot {
            local_height: 0,
            pending_count: 0,
            branch_count: 0,
            phase: SyncPhase::Idle,
        }))
    }
}

impl SyncStatus {
    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> StatusSnapshot {
        *self.0.read()
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut StatusSnapshot)) {
        f(&mut *self.0.write());
    }
}
