//! End-to-end tests for the cart sync engine.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cart-sync-integration-tests
//! ```
//!
//! Everything runs in-process: the remote cart service is replaced by
//! [`FakeCartService`], which models the unit-step protocol and records
//! every call, and time is driven by tokio's paused clock.
//!
//! # Test Categories
//!
//! - `offline_first` - local mutations, persistence, anonymous sessions
//! - `sync_convergence` - debounce, single-flight, server convergence
//! - `reconciliation` - sign-in merge scenarios
//! - `failure_recovery` - unreachable service, partial passes, retries
//! - `http_client` - wire format of the HTTP client against a stub server

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cart_sync::normalize::RawItem;
use cart_sync::storage::CartPersistence;
use cart_sync::{CartEngine, CartService, ClientError, MemoryStorage, SessionCell, SyncConfig};
use cart_sync_core::{Cart, CartItem, ProductId, Quantity};
use parking_lot::Mutex;
use secrecy::SecretString;
use serde_json::json;

/// Debounce used by [`TestContext`].
pub const DEBOUNCE: Duration = Duration::from_millis(700);

/// Retry delay used by [`TestContext`].
pub const RETRY: Duration = Duration::from_secs(2);

// =============================================================================
// Fake cart service
// =============================================================================

/// A remote call as the server saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    View,
    Add(String),
    Increase(String),
    Decrease(String),
    Remove(String),
    Clear,
}

impl Call {
    #[must_use]
    pub const fn is_destructive(&self) -> bool {
        matches!(self, Self::Remove(_) | Self::Clear)
    }
}

/// In-memory cart service speaking the unit-step protocol.
#[derive(Default)]
pub struct FakeCartService {
    server: Mutex<Cart>,
    calls: Mutex<Vec<Call>>,
    offline: Mutex<bool>,
    fail_after: Mutex<Option<usize>>,
    latency: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeCartService {
    #[must_use]
    pub fn with_server(server: Cart) -> Self {
        Self {
            server: Mutex::new(server),
            ..Self::default()
        }
    }

    /// Make every call fail until switched back.
    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock() = offline;
    }

    /// Let `calls` more mutations succeed, then fail the rest.
    pub fn fail_after(&self, calls: Option<usize>) {
        *self.fail_after.lock() = calls;
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    #[must_use]
    pub fn server(&self) -> Cart {
        self.server.lock().clone()
    }

    /// Successful calls, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Successful mutation calls, in order.
    #[must_use]
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| *call != Call::View)
            .collect()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    /// Most calls ever observed running at once.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, mutation: bool) -> Result<(), ClientError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if *self.offline.lock() {
            return Err(unavailable());
        }
        if mutation {
            let mut budget = self.fail_after.lock();
            if let Some(remaining) = budget.as_mut() {
                if *remaining == 0 {
                    return Err(unavailable());
                }
                *remaining -= 1;
            }
        }
        Ok(())
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

fn unavailable() -> ClientError {
    ClientError::Api {
        status: 503,
        message: "service unavailable".to_string(),
    }
}

fn server_item(id: &ProductId) -> CartItem {
    CartItem::new(id.clone(), id.as_str())
}

#[async_trait]
impl CartService for FakeCartService {
    async fn view(&self) -> Result<Cart, ClientError> {
        self.enter(false).await?;
        self.record(Call::View);
        Ok(self.server())
    }

    async fn add(&self, id: &ProductId) -> Result<(), ClientError> {
        self.enter(true).await?;
        let mut server = self.server.lock();
        if !server.contains(id) {
            server.add(server_item(id), Quantity::ONE);
        }
        drop(server);
        self.record(Call::Add(id.to_string()));
        Ok(())
    }

    async fn increase(&self, id: &ProductId) -> Result<(), ClientError> {
        self.enter(true).await?;
        self.server.lock().add(server_item(id), Quantity::ONE);
        self.record(Call::Increase(id.to_string()));
        Ok(())
    }

    async fn decrease(&self, id: &ProductId) -> Result<(), ClientError> {
        self.enter(true).await?;
        {
            let mut server = self.server.lock();
            match Quantity::new(server.quantity_of(id).saturating_sub(1)) {
                Some(qty) => {
                    server.set_quantity(id, qty);
                }
                None => {
                    server.remove(id);
                }
            }
        }
        self.record(Call::Decrease(id.to_string()));
        Ok(())
    }

    async fn remove(&self, id: &ProductId) -> Result<(), ClientError> {
        self.enter(true).await?;
        self.server.lock().remove(id);
        self.record(Call::Remove(id.to_string()));
        Ok(())
    }

    async fn clear(&self) -> Result<(), ClientError> {
        self.enter(true).await?;
        self.server.lock().clear();
        self.record(Call::Clear);
        Ok(())
    }
}

// =============================================================================
// Test context
// =============================================================================

/// An engine wired to a fake service and in-memory storage.
pub struct TestContext {
    pub service: Arc<FakeCartService>,
    pub session: Arc<SessionCell>,
    pub storage: Arc<MemoryStorage>,
    pub engine: CartEngine<FakeCartService>,
}

impl TestContext {
    /// Anonymous shopper, empty server cart.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::build(Cart::new(), Arc::new(MemoryStorage::new()), false)
    }

    /// Anonymous shopper with an existing server cart.
    #[must_use]
    pub fn anonymous_with_server(server: Cart) -> Self {
        Self::build(server, Arc::new(MemoryStorage::new()), false)
    }

    /// Signed-in shopper with an existing server cart; reconciliation has
    /// not run yet.
    #[must_use]
    pub fn signed_in_with_server(server: Cart) -> Self {
        Self::build(server, Arc::new(MemoryStorage::new()), true)
    }

    fn build(server: Cart, storage: Arc<MemoryStorage>, signed_in: bool) -> Self {
        let service = Arc::new(FakeCartService::with_server(server));
        let session = Arc::new(if signed_in {
            SessionCell::signed_in(token())
        } else {
            SessionCell::anonymous()
        });
        let engine = engine_over(&service, &session, storage.clone());
        Self {
            service,
            session,
            storage,
            engine,
        }
    }

    /// Sign in and run the sign-in transition.
    pub async fn sign_in(&self) {
        self.session.sign_in(token());
        self.engine.auth_changed().await.unwrap();
    }

    /// Sign out and run the sign-out transition.
    pub async fn sign_out(&self) {
        self.session.sign_out();
        self.engine.auth_changed().await.unwrap();
    }

    /// Wait until the scheduler has nothing left to do.
    pub async fn settle(&self) {
        self.engine.sync().wait_idle().await.unwrap();
    }
}

/// Build an engine over existing collaborators.
pub fn engine_over(
    service: &Arc<FakeCartService>,
    session: &Arc<SessionCell>,
    storage: Arc<dyn CartPersistence>,
) -> CartEngine<FakeCartService> {
    let config = SyncConfig {
        debounce: DEBOUNCE,
        retry_delay: RETRY,
    };
    CartEngine::new(Arc::clone(service), session.clone(), storage, config)
}

#[must_use]
pub fn token() -> SecretString {
    SecretString::from("test-session-token")
}

// =============================================================================
// Builders
// =============================================================================

/// Catalog product as a caller hands it to `add`.
#[must_use]
pub fn product(id: &str) -> RawItem {
    RawItem::classify(json!({ "id": id, "title": id }))
}

/// Cart from `(id, qty)` pairs, with the metadata the fake server assigns.
#[must_use]
pub fn cart(lines: &[(&str, u32)]) -> Cart {
    lines
        .iter()
        .map(|(id, qty)| CartItem::new(*id, *id).with_qty(Quantity::new(*qty).unwrap()))
        .collect()
}

#[must_use]
pub fn qty(n: u32) -> Quantity {
    Quantity::new(n).unwrap()
}

#[must_use]
pub fn id(s: &str) -> ProductId {
    ProductId::new(s)
}
