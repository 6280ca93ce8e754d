//! Synchronization status of the local cart against the remote service.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Scheduling state of the sync scheduler.
///
/// ```text
/// Idle -> PendingSync -> Syncing -> Idle
///                        Syncing -> SyncFailed -> PendingSync
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Nothing to push; local and baseline agree (or there is no session).
    #[default]
    Idle,
    /// A debounce timer is armed; a pass will start when it fires.
    PendingSync,
    /// A pass is executing remote calls.
    Syncing,
    /// The last pass failed; a retry is about to be armed.
    SyncFailed,
}

impl SyncStatus {
    /// Whether work is outstanding (armed or running).
    #[must_use]
    pub const fn is_busy(self) -> bool {
        matches!(self, Self::PendingSync | Self::Syncing)
    }

    /// Get the status as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::PendingSync => "pending_sync",
            Self::Syncing => "syncing",
            Self::SyncFailed => "sync_failed",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
