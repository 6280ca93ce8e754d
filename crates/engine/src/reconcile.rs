//! One-time merge of the local cart with the server cart on sign-in.
//!
//! Items added while anonymous must survive sign-in, and so must items the
//! shopper already had on the server. The merge is additive: it never
//! deletes, so no `remove` is ever planned from a reconciliation.
//!
//! The scheduler stays gated until a merge has completed. When the server
//! cart cannot be fetched nothing is pushed; the caller retries the merge.

use std::sync::Arc;

use cart_sync_core::Cart;
use parking_lot::Mutex;
use tracing::{info, instrument, warn};

use crate::client::CartService;
use crate::error::{SyncError, add_breadcrumb};
use crate::store::LocalCartStore;
use crate::sync::SyncHandle;

/// What reconciliation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Merged cart differs from the server; a push was scheduled.
    Pushed,
    /// Local cart was empty; the server cart was adopted as-is.
    AdoptedServer,
    /// Both carts were empty.
    AlreadyInSync,
    /// Server cart could not be fetched; the local cart is kept and the
    /// merge is still owed.
    ServerUnavailable,
    /// The session was reconciled by an earlier run; syncing resumed
    /// without merging.
    Resumed,
}

/// Union of two carts.
///
/// Shared ids get the sum of both quantities and the server's metadata.
/// Local lines come first, in local order, then server-only lines.
#[must_use]
pub fn merge(local: &Cart, server: &Cart) -> Cart {
    let mut merged = Cart::new();
    for item in local {
        match server.get(&item.id) {
            Some(remote) => {
                merged.upsert(remote.clone().with_qty(item.qty.saturating_add(remote.qty)));
            }
            None => {
                merged.upsert(item.clone());
            }
        }
    }
    for item in server {
        if !merged.contains(&item.id) {
            merged.upsert(item.clone());
        }
    }
    merged
}

/// Runs the sign-in merge.
pub struct Reconciler<S: CartService> {
    service: Arc<S>,
}

impl<S: CartService> Reconciler<S> {
    #[must_use]
    pub const fn new(service: Arc<S>) -> Self {
        Self { service }
    }

    /// Merge the server cart into the local one and hand the result to the
    /// scheduler.
    ///
    /// The store lock is only held while the merged cart is written, never
    /// across the fetch.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if the merged cart could not be
    /// persisted. The merge still takes effect in memory and is still
    /// pushed.
    #[instrument(skip_all)]
    pub async fn reconcile(
        &self,
        store: &Mutex<LocalCartStore>,
        sync: &SyncHandle,
    ) -> Result<ReconcileOutcome, SyncError> {
        let server = match self.service.view().await {
            Ok(cart) => cart,
            Err(e) => {
                warn!(error = %e, "Server cart unavailable, keeping local cart");
                add_breadcrumb("sync", "reconcile", &[("outcome", "server_unavailable")]);
                return Ok(ReconcileOutcome::ServerUnavailable);
            }
        };

        let (outcome, persisted) = {
            let mut store = store.lock();
            let merged = merge(store.cart(), &server);

            if merged == server {
                let outcome = if server.is_empty() {
                    ReconcileOutcome::AlreadyInSync
                } else {
                    ReconcileOutcome::AdoptedServer
                };
                let persisted = store.replace(merged);
                sync.rebase(server, None);
                (outcome, persisted)
            } else {
                let persisted = store.replace(merged.clone());
                sync.rebase(server, Some(merged));
                (ReconcileOutcome::Pushed, persisted)
            }
        };

        info!(?outcome, "Cart reconciled");
        let label = format!("{outcome:?}");
        add_breadcrumb("sync", "reconcile", &[("outcome", label.as_str())]);
        persisted?;
        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cart_sync_core::{CartItem, Price, ProductId, Quantity};
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use secrecy::SecretString;

    use super::*;
    use crate::auth::SessionCell;
    use crate::config::SyncConfig;
    use crate::storage::MemoryStorage;
    use crate::sync::{RemoteOp, SyncScheduler, plan_pass};
    use crate::test_support::{FakeCartService, arb_cart, cart};

    fn id(s: &str) -> ProductId {
        ProductId::new(s)
    }

    struct Harness {
        service: Arc<FakeCartService>,
        store: Arc<Mutex<LocalCartStore>>,
        sync: SyncHandle,
    }

    fn harness(local: &Cart, server: Cart) -> Harness {
        let service = Arc::new(FakeCartService::with_server(server));
        let session = Arc::new(SessionCell::signed_in(SecretString::from("token")));
        let sync = SyncScheduler::spawn(Arc::clone(&service), session, SyncConfig::default());

        let mut store = LocalCartStore::open(Arc::new(MemoryStorage::new()));
        for item in local {
            store.add_item(item.clone(), item.qty).unwrap();
        }
        store.set_listener(Arc::new(sync.clone()));

        Harness {
            service,
            store: Arc::new(Mutex::new(store)),
            sync,
        }
    }

    impl Harness {
        async fn reconcile(&self) -> ReconcileOutcome {
            Reconciler::new(Arc::clone(&self.service))
                .reconcile(&self.store, &self.sync)
                .await
                .unwrap()
        }
    }

    #[test]
    fn test_merge_sums_shared_quantities() {
        let merged = merge(&cart(&[("A", 1), ("B", 3)]), &cart(&[("B", 1), ("C", 1)]));
        assert_eq!(merged, cart(&[("A", 1), ("B", 4), ("C", 1)]));
    }

    #[test]
    fn test_merge_prefers_server_metadata() {
        let local = Cart::from_iter([CartItem::new("A", "old title")]);
        let server = Cart::from_iter([CartItem::new("A", "new title")
            .with_price(Price::new(Decimal::new(999, 2)).unwrap())]);

        let merged = merge(&local, &server);
        let line = merged.get(&id("A")).unwrap();
        assert_eq!(line.title, "new title");
        assert_eq!(line.price.amount(), Decimal::new(999, 2));
        assert_eq!(line.qty, Quantity::new(2).unwrap());
    }

    #[test]
    fn test_merge_is_commutative_on_quantities() {
        let a = cart(&[("A", 2), ("B", 1)]);
        let b = cart(&[("B", 5), ("C", 1)]);
        assert_eq!(merge(&a, &b), merge(&b, &a));
    }

    #[test]
    fn test_merge_with_empty_side() {
        let a = cart(&[("A", 2)]);
        assert_eq!(merge(&a, &Cart::new()), a);
        assert_eq!(merge(&Cart::new(), &a), a);
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_only_cart_is_pushed() {
        let h = harness(&cart(&[("A", 2)]), Cart::new());

        assert_eq!(h.reconcile().await, ReconcileOutcome::Pushed);
        h.sync.wait_idle().await.unwrap();

        assert_eq!(
            h.service.calls(),
            vec![RemoteOp::Add(id("A")), RemoteOp::Increase(id("A"))]
        );
        assert_eq!(h.service.server(), cart(&[("A", 2)]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_carts_merge_without_removes() {
        let h = harness(&cart(&[("A", 1), ("B", 3)]), cart(&[("B", 1), ("C", 1)]));

        assert_eq!(h.reconcile().await, ReconcileOutcome::Pushed);
        h.sync.wait_idle().await.unwrap();

        let expected = cart(&[("A", 1), ("B", 4), ("C", 1)]);
        assert_eq!(*h.store.lock().cart(), expected);
        assert_eq!(h.service.server(), expected);
        assert!(
            h.service
                .calls()
                .iter()
                .all(|op| !matches!(op, RemoteOp::Remove(_) | RemoteOp::Clear))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_local_adopts_server() {
        let h = harness(&Cart::new(), cart(&[("C", 2)]));

        assert_eq!(h.reconcile().await, ReconcileOutcome::AdoptedServer);
        h.sync.wait_idle().await.unwrap();

        assert_eq!(*h.store.lock().cart(), cart(&[("C", 2)]));
        assert!(h.service.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_empty_is_in_sync() {
        let h = harness(&Cart::new(), Cart::new());
        assert_eq!(h.reconcile().await, ReconcileOutcome::AlreadyInSync);
        let snapshot = h.sync.wait_idle().await.unwrap();
        assert_eq!(snapshot.passes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_server_keeps_local_and_merges_later() {
        let h = harness(&cart(&[("A", 1)]), cart(&[("Z", 1)]));
        h.service.set_offline(true);

        assert_eq!(h.reconcile().await, ReconcileOutcome::ServerUnavailable);
        assert_eq!(*h.store.lock().cart(), cart(&[("A", 1)]));

        // Nothing is pushed while the merge is owed
        h.service.set_offline(false);
        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        assert!(h.service.calls().is_empty());
        assert!(!h.sync.snapshot().reconciled);

        assert_eq!(h.reconcile().await, ReconcileOutcome::Pushed);
        h.sync.wait_idle().await.unwrap();
        let expected = cart(&[("A", 1), ("Z", 1)]);
        assert_eq!(*h.store.lock().cart(), expected);
        assert_eq!(h.service.server(), expected);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Every id on either side is kept, with both quantities summed.
        #[test]
        fn prop_merge_sums_quantities(local in arb_cart(), server in arb_cart()) {
            let merged = merge(&local, &server);

            for item in local.iter().chain(server.iter()) {
                prop_assert_eq!(
                    merged.quantity_of(&item.id),
                    local.quantity_of(&item.id) + server.quantity_of(&item.id)
                );
            }
            let union = local.iter().chain(server.iter()).map(|item| &item.id);
            prop_assert_eq!(
                merged.len(),
                union.collect::<std::collections::BTreeSet<_>>().len()
            );
        }

        /// Quantities do not depend on which side an item came from.
        #[test]
        fn prop_merge_quantities_commute(local in arb_cart(), server in arb_cart()) {
            let forward = merge(&local, &server);
            let backward = merge(&server, &local);
            prop_assert_eq!(forward.len(), backward.len());
            for item in &forward {
                prop_assert_eq!(item.qty, backward.get(&item.id).unwrap().qty);
            }
        }

        /// An empty side contributes nothing.
        #[test]
        fn prop_merge_with_empty_is_identity(items in arb_cart()) {
            prop_assert_eq!(merge(&items, &Cart::new()), items.clone());
            prop_assert_eq!(merge(&Cart::new(), &items), items);
        }

        /// Pushing a merge against the server cart never deletes anything.
        #[test]
        fn prop_merge_push_never_deletes(local in arb_cart(), server in arb_cart()) {
            let merged = merge(&local, &server);
            let ops = plan_pass(&merged, &server);
            prop_assert!(!ops.iter().any(|op| matches!(
                op,
                RemoteOp::Remove(_) | RemoteOp::Decrease(_) | RemoteOp::Clear
            )));
        }
    }
}
