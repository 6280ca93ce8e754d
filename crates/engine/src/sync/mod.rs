//! Outbound synchronization of the local cart.
//!
//! Bursts of local mutations are debounced into one pass; passes are
//! serialized so at most one is in flight. A pass diffs the current cart
//! against the baseline (the best-known server snapshot) and issues the
//! unit-step remote calls that close the gap.
//!
//! # Baseline policy
//!
//! After a successful pass the baseline is the cart just pushed. After a
//! failed pass (including one that applied some calls before failing) the
//! baseline is marked stale, and the next pass re-fetches the server cart
//! before planning. This keeps a half-applied `add` followed by missing
//! `increase` calls from being under-counted on retry.
//!
//! # Reconciliation gate
//!
//! No pass runs for a session until the sign-in merge has handed the
//! scheduler a baseline (`rebase`) or a restart under an already reconciled
//! session has resumed it (`resume`). Changes made before that are held and
//! go out with the first pass after the gate opens. Sign-out closes it.
//!
//! # Retries
//!
//! Transient failures are retried after `retry_delay`, or after the delay a
//! rate limit asked for when that is longer. Other failures leave the
//! scheduler in `SyncFailed` until the next local change.

mod plan;
mod scheduler;

use cart_sync_core::{Cart, SyncStatus};

pub use plan::{RemoteOp, plan_pass};
pub use scheduler::{SyncHandle, SyncScheduler};

/// Best-known server state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Baseline {
    /// Server cart is believed to equal this snapshot.
    Known(Cart),
    /// Server state is uncertain; re-fetch before planning.
    Stale,
}

impl Baseline {
    /// The snapshot, when known.
    #[must_use]
    pub const fn known(&self) -> Option<&Cart> {
        match self {
            Self::Known(cart) => Some(cart),
            Self::Stale => None,
        }
    }
}

/// Outcome of one completed pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Remote mutation calls issued.
    pub calls: usize,
    /// Whether the baseline was re-fetched before planning.
    pub refreshed_baseline: bool,
}

/// Observable scheduler state, published after every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSnapshot {
    /// Scheduling state.
    pub status: SyncStatus,
    /// Diff baseline.
    pub baseline: Baseline,
    /// Accepted local changes so far.
    pub generation: u64,
    /// Generation included in the last successful pass.
    pub synced_generation: u64,
    /// Passes completed (successful or not).
    pub passes: u64,
    /// Passes that failed.
    pub failures: u64,
    /// Error of the most recent pass, cleared by a success.
    pub last_error: Option<String>,
    /// Whether passes may run for the current session.
    pub reconciled: bool,
    /// Commands processed; lets handles wait for their own commands.
    pub commands_seen: u64,
}

impl Default for SyncSnapshot {
    fn default() -> Self {
        Self {
            status: SyncStatus::Idle,
            baseline: Baseline::Stale,
            generation: 0,
            synced_generation: 0,
            passes: 0,
            failures: 0,
            last_error: None,
            reconciled: false,
            commands_seen: 0,
        }
    }
}
