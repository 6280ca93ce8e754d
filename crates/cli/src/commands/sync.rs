//! Commands that talk to the cart service.

use cart_sync::{CartEngine, CartService, ReconcileOutcome};
use tracing::{info, warn};

use super::CliError;

/// Reconcile with the server cart, or resume a session merged by an
/// earlier run. Returns whether pushing is allowed.
pub async fn sign_in<S: CartService>(engine: &CartEngine<S>) -> Result<bool, CliError> {
    match engine.auth_changed().await? {
        Some(ReconcileOutcome::ServerUnavailable) => {
            warn!("Server cart unavailable, local changes stay queued");
            Ok(false)
        }
        Some(ReconcileOutcome::Resumed) => {
            info!("Session already reconciled");
            Ok(true)
        }
        Some(outcome) => {
            info!(?outcome, "Cart reconciled");
            Ok(true)
        }
        None => Ok(true),
    }
}

/// Push pending local changes.
pub async fn push<S: CartService>(engine: &CartEngine<S>) -> Result<(), CliError> {
    let report = engine.flush().await?;
    // A pass the timer started before the flush arrived reports here
    if let Some(error) = engine.snapshot().last_error {
        return Err(CliError::SyncFailed(error));
    }
    info!(
        calls = report.calls,
        refreshed = report.refreshed_baseline,
        "Cart synced"
    );
    Ok(())
}
