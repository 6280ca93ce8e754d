//! Shared helpers for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cart_sync_core::{Cart, CartItem, ProductId, Quantity};
use parking_lot::Mutex;
use proptest::prelude::*;

use crate::client::{CartService, ClientError};
use crate::sync::RemoteOp;

/// Apply remote calls to a cart the way the service does.
///
/// New lines take their metadata from `catalog` when it has them.
pub fn apply_ops(cart: &mut Cart, ops: &[RemoteOp], catalog: &Cart) {
    for op in ops {
        match op {
            RemoteOp::Add(id) => {
                if !cart.contains(id) {
                    cart.add(catalog_item(catalog, id), Quantity::ONE);
                }
            }
            RemoteOp::Increase(id) => {
                if cart.contains(id) {
                    let qty = Quantity::new(cart.quantity_of(id) + 1).unwrap_or(Quantity::ONE);
                    cart.set_quantity(id, qty);
                } else {
                    cart.add(catalog_item(catalog, id), Quantity::ONE);
                }
            }
            RemoteOp::Decrease(id) => match Quantity::new(cart.quantity_of(id).saturating_sub(1)) {
                Some(qty) => {
                    cart.set_quantity(id, qty);
                }
                None => {
                    cart.remove(id);
                }
            },
            RemoteOp::Remove(id) => {
                cart.remove(id);
            }
            RemoteOp::Clear => cart.clear(),
        }
    }
}

fn catalog_item(catalog: &Cart, id: &ProductId) -> CartItem {
    catalog
        .get(id)
        .cloned()
        .unwrap_or_else(|| CartItem::new(id.clone(), id.as_str()))
        .with_qty(Quantity::ONE)
}

/// Error the fake returns while failing.
#[derive(Debug, Clone, Copy, Default)]
pub enum Failure {
    #[default]
    Unavailable,
    RateLimited(u64),
    Rejected(u16),
}

impl Failure {
    fn to_error(self) -> ClientError {
        match self {
            Self::Unavailable => ClientError::Api {
                status: 503,
                message: "unavailable".to_string(),
            },
            Self::RateLimited(secs) => ClientError::RateLimited(secs),
            Self::Rejected(status) => ClientError::Api {
                status,
                message: "rejected".to_string(),
            },
        }
    }
}

/// In-memory cart service with failure injection.
#[derive(Default)]
pub struct FakeCartService {
    pub server: Mutex<Cart>,
    pub catalog: Cart,
    pub calls: Mutex<Vec<RemoteOp>>,
    pub views: AtomicUsize,
    /// Fail every call while set.
    pub offline: Mutex<bool>,
    /// Succeed this many more mutation calls, then fail.
    pub fail_after: Mutex<Option<usize>>,
    /// What failing calls return.
    pub failure: Mutex<Failure>,
    /// Delay each call, to make overlapping passes observable.
    pub latency: Option<Duration>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeCartService {
    pub fn with_server(server: Cart) -> Self {
        Self {
            server: Mutex::new(server),
            ..Self::default()
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn with_server_and_latency(server: Cart, latency: Duration) -> Self {
        Self {
            server: Mutex::new(server),
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Fail every call with `failure` while set.
    pub fn fail_with(&self, failure: Option<Failure>) {
        if let Some(failure) = failure {
            *self.failure.lock() = failure;
        }
        self.set_offline(failure.is_some());
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock() = offline;
    }

    pub fn server(&self) -> Cart {
        self.server.lock().clone()
    }

    pub fn calls(&self) -> Vec<RemoteOp> {
        self.calls.lock().clone()
    }

    async fn enter(&self) -> Result<(), ClientError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if *self.offline.lock() {
            return Err(self.failure.lock().to_error());
        }
        Ok(())
    }

    async fn mutate(&self, op: RemoteOp) -> Result<(), ClientError> {
        self.enter().await?;
        {
            let mut budget = self.fail_after.lock();
            if let Some(remaining) = budget.as_mut() {
                if *remaining == 0 {
                    return Err(self.failure.lock().to_error());
                }
                *remaining -= 1;
            }
        }
        apply_ops(&mut self.server.lock(), std::slice::from_ref(&op), &self.catalog);
        self.calls.lock().push(op);
        Ok(())
    }
}

#[async_trait]
impl CartService for FakeCartService {
    async fn view(&self) -> Result<Cart, ClientError> {
        self.enter().await?;
        self.views.fetch_add(1, Ordering::SeqCst);
        Ok(self.server())
    }

    async fn add(&self, id: &ProductId) -> Result<(), ClientError> {
        self.mutate(RemoteOp::Add(id.clone())).await
    }

    async fn increase(&self, id: &ProductId) -> Result<(), ClientError> {
        self.mutate(RemoteOp::Increase(id.clone())).await
    }

    async fn decrease(&self, id: &ProductId) -> Result<(), ClientError> {
        self.mutate(RemoteOp::Decrease(id.clone())).await
    }

    async fn remove(&self, id: &ProductId) -> Result<(), ClientError> {
        self.mutate(RemoteOp::Remove(id.clone())).await
    }

    async fn clear(&self) -> Result<(), ClientError> {
        self.mutate(RemoteOp::Clear).await
    }
}

/// Build a cart from `(id, qty)` pairs.
pub fn cart(lines: &[(&str, u32)]) -> Cart {
    lines
        .iter()
        .filter_map(|(id, qty)| Some(CartItem::new(*id, *id).with_qty(Quantity::new(*qty)?)))
        .collect()
}

/// Carts of up to five lines over a small id space, so generated pairs
/// overlap often. Titles equal ids, matching what the fake server assigns.
pub fn arb_cart() -> impl Strategy<Value = Cart> {
    prop::collection::btree_map("[a-f]", 1u32..6, 0..5).prop_map(|lines| {
        lines
            .into_iter()
            .filter_map(|(id, qty)| {
                Some(CartItem::new(id.as_str(), id.as_str()).with_qty(Quantity::new(qty)?))
            })
            .collect()
    })
}
