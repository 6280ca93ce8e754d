//! `CartEngine`: the store, wishlist and sync machinery wired together.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cart_sync_core::{Cart, CartItem, ProductId, Quantity, SyncStatus};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::auth::{
    AuthSession, AuthTransition, AuthTransitions, SessionMarker, session_fingerprint,
};
use crate::client::CartService;
use crate::config::SyncConfig;
use crate::error::{SyncError, capture};
use crate::normalize::RawItem;
use crate::reconcile::{ReconcileOutcome, Reconciler};
use crate::storage::{CartPersistence, StorageError};
use crate::store::LocalCartStore;
use crate::sync::{PassReport, SyncHandle, SyncScheduler, SyncSnapshot};
use crate::wishlist::Wishlist;

/// Local-first cart with background sync to a remote cart service.
///
/// Mutations apply locally and return immediately; the scheduler pushes
/// them once the shopper pauses. Call [`auth_changed`](Self::auth_changed)
/// whenever the session may have changed. Nothing is pushed for a session
/// until it has been reconciled.
///
/// Must be created inside a tokio runtime.
pub struct CartEngine<S: CartService + 'static> {
    store: Arc<Mutex<LocalCartStore>>,
    wishlist: Mutex<Wishlist>,
    sync: SyncHandle,
    reconciler: Arc<Reconciler<S>>,
    session: Arc<dyn AuthSession>,
    storage: Arc<dyn CartPersistence>,
    transitions: Mutex<AuthTransitions>,
    /// Bumped on every auth edge; a deferred merge for an older session
    /// gives up.
    epoch: Arc<AtomicU64>,
    retry_delay: Duration,
}

impl<S: CartService + 'static> CartEngine<S> {
    pub fn new(
        service: Arc<S>,
        session: Arc<dyn AuthSession>,
        storage: Arc<dyn CartPersistence>,
        config: SyncConfig,
    ) -> Self {
        let sync = SyncScheduler::spawn(Arc::clone(&service), Arc::clone(&session), config);

        let mut store = LocalCartStore::open(Arc::clone(&storage));
        store.set_listener(Arc::new(sync.clone()));

        Self {
            store: Arc::new(Mutex::new(store)),
            wishlist: Mutex::new(Wishlist::open(Arc::clone(&storage))),
            sync,
            reconciler: Arc::new(Reconciler::new(service)),
            session,
            storage,
            transitions: Mutex::new(AuthTransitions::new()),
            epoch: Arc::new(AtomicU64::new(0)),
            retry_delay: config.retry_delay,
        }
    }

    // -------------------------------------------------------------------------
    // Cart
    // -------------------------------------------------------------------------

    /// Snapshot of the cart.
    #[must_use]
    pub fn cart(&self) -> Cart {
        self.store.lock().cart().clone()
    }

    /// # Errors
    ///
    /// Returns an error if the cart could not be persisted.
    pub fn add(&self, item: RawItem, qty: Quantity) -> Result<(), StorageError> {
        self.store.lock().add(item, qty)
    }

    /// # Errors
    ///
    /// Returns an error if the cart could not be persisted.
    pub fn remove(&self, id: &ProductId) -> Result<(), StorageError> {
        self.store.lock().remove(id)
    }

    /// # Errors
    ///
    /// Returns an error if the cart could not be persisted.
    pub fn set_qty(&self, id: &ProductId, qty: u32) -> Result<(), StorageError> {
        self.store.lock().set_qty(id, qty)
    }

    /// # Errors
    ///
    /// Returns an error if the cart could not be persisted.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.store.lock().clear()
    }

    // -------------------------------------------------------------------------
    // Wishlist
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn wishlist(&self) -> Vec<CartItem> {
        self.wishlist.lock().items().cloned().collect()
    }

    /// # Errors
    ///
    /// Returns an error if the wishlist could not be persisted.
    pub fn wishlist_add(&self, item: RawItem) -> Result<bool, StorageError> {
        self.wishlist.lock().add(item)
    }

    /// # Errors
    ///
    /// Returns an error if the wishlist could not be persisted.
    pub fn wishlist_remove(&self, id: &ProductId) -> Result<bool, StorageError> {
        self.wishlist.lock().remove(id)
    }

    /// # Errors
    ///
    /// Returns an error if the cart or wishlist could not be persisted.
    pub fn move_to_cart(&self, id: &ProductId) -> Result<bool, StorageError> {
        let mut wishlist = self.wishlist.lock();
        let mut store = self.store.lock();
        wishlist.move_to_cart(id, &mut store)
    }

    // -------------------------------------------------------------------------
    // Sync
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.sync.status()
    }

    #[must_use]
    pub fn snapshot(&self) -> SyncSnapshot {
        self.sync.snapshot()
    }

    #[must_use]
    pub const fn sync(&self) -> &SyncHandle {
        &self.sync
    }

    /// Push pending changes now.
    ///
    /// # Errors
    ///
    /// Returns the pass error; the scheduler retries on its own.
    pub async fn flush(&self) -> Result<PassReport, SyncError> {
        self.sync.flush().await
    }

    /// React to a possible session change.
    ///
    /// On sign-in the local and server carts are reconciled once per
    /// session; a session already reconciled by an earlier run resumes
    /// syncing instead. When the server cart is unreachable the merge is
    /// retried in the background every `retry_delay`. On sign-out the sync
    /// baseline and pending work are discarded; the local cart is kept.
    /// Returns the reconciliation outcome when one ran.
    ///
    /// # Errors
    ///
    /// Returns an error if the reconciled cart could not be persisted.
    #[instrument(skip(self))]
    pub async fn auth_changed(&self) -> Result<Option<ReconcileOutcome>, SyncError> {
        let transition = self
            .transitions
            .lock()
            .observe(self.session.is_authenticated());

        match transition {
            AuthTransition::SignedIn => {
                let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
                let fingerprint = self.session.bearer_token().map(|t| session_fingerprint(&t));

                if fingerprint.as_deref().is_some_and(|fp| self.reconciled_for(fp)) {
                    info!("Session already reconciled, resuming sync");
                    let store = self.store.lock();
                    self.sync.resume(store.cart().clone());
                    return Ok(Some(ReconcileOutcome::Resumed));
                }

                info!("Signed in, reconciling cart");
                let result = self.reconciler.reconcile(&self.store, &self.sync).await;
                if matches!(result, Ok(ReconcileOutcome::ServerUnavailable)) {
                    self.retry_reconcile(epoch, fingerprint);
                } else {
                    mark_reconciled(self.storage.as_ref(), fingerprint.as_deref());
                }
                result.map(Some)
            }
            AuthTransition::SignedOut => {
                info!("Signed out, keeping local cart");
                self.epoch.fetch_add(1, Ordering::SeqCst);
                self.sync.reset();
                if let Err(e) = SessionMarker::clear(self.storage.as_ref()) {
                    warn!(error = %e, "Failed to clear session marker");
                }
                Ok(None)
            }
            AuthTransition::Unchanged => Ok(None),
        }
    }

    fn reconciled_for(&self, fingerprint: &str) -> bool {
        SessionMarker::load(self.storage.as_ref()).is_some_and(|marker| marker.is_for(fingerprint))
    }

    /// Keep trying the sign-in merge until the server answers or the
    /// session changes.
    fn retry_reconcile(&self, epoch: u64, fingerprint: Option<String>) {
        let reconciler = Arc::clone(&self.reconciler);
        let store = Arc::clone(&self.store);
        let sync = self.sync.clone();
        let storage = Arc::clone(&self.storage);
        let current = Arc::clone(&self.epoch);
        let delay = self.retry_delay;

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(delay).await;
                if current.load(Ordering::SeqCst) != epoch {
                    debug!("Session changed, dropping deferred reconciliation");
                    return;
                }
                let result = reconciler.reconcile(&store, &sync).await;
                if matches!(result, Ok(ReconcileOutcome::ServerUnavailable)) {
                    continue;
                }
                match result {
                    Ok(outcome) => info!(?outcome, "Deferred reconciliation complete"),
                    Err(e) => capture(&e, "Deferred reconciliation failed to persist cart"),
                }
                mark_reconciled(storage.as_ref(), fingerprint.as_deref());
                return;
            }
        });
    }
}

/// Record that the current session has been merged.
fn mark_reconciled(storage: &dyn CartPersistence, fingerprint: Option<&str>) {
    let Some(fingerprint) = fingerprint else {
        return;
    };
    if let Err(e) = SessionMarker::new(fingerprint.to_string()).save(storage) {
        warn!(error = %e, "Failed to record reconciled session");
    }
}
