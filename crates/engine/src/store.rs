//! `LocalCartStore`: in-memory cart state plus its durable mirror.
//!
//! The store is the single source of truth for rendering and for what gets
//! synced. Every operation is synchronous: the in-memory cart is updated,
//! the whole cart is persisted, and listeners are notified before control
//! returns. Nothing here inspects network or session state, so the cart
//! keeps working offline.

use std::sync::Arc;

use cart_sync_core::{Cart, CartItem, ProductId, Quantity};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::add_breadcrumb;
use crate::normalize::{RawItem, normalize, normalize_list};
use crate::storage::{CartPersistence, Record, RecordEnvelope, StorageError};

/// Receives the full cart after every mutation.
pub trait CartListener: Send + Sync {
    fn cart_changed(&self, cart: &Cart);
}

/// Local-first cart state.
pub struct LocalCartStore {
    cart: Cart,
    storage: Arc<dyn CartPersistence>,
    listener: Option<Arc<dyn CartListener>>,
}

impl LocalCartStore {
    /// Hydrate the cart from storage.
    ///
    /// A missing record yields an empty cart. An unreadable record also
    /// yields an empty cart (logged), since a broken mirror must not make
    /// the cart unusable.
    pub fn open(storage: Arc<dyn CartPersistence>) -> Self {
        let cart = match storage.load(Record::Cart) {
            Ok(Some(value)) => hydrate(value),
            Ok(None) => Cart::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read persisted cart, starting empty");
                Cart::new()
            }
        };
        debug!(lines = cart.len(), "Cart hydrated");

        Self {
            cart,
            storage,
            listener: None,
        }
    }

    /// Attach the listener notified after each mutation.
    pub fn set_listener(&mut self, listener: Arc<dyn CartListener>) {
        self.listener = Some(listener);
    }

    /// Current cart.
    #[must_use]
    pub const fn cart(&self) -> &Cart {
        &self.cart
    }

    /// Add `qty` units of a product given in any recognized shape.
    ///
    /// Items whose id cannot be determined are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart could not be persisted. The in-memory
    /// cart is updated regardless.
    pub fn add(&mut self, item: RawItem, qty: Quantity) -> Result<(), StorageError> {
        let item = normalize(item);
        if item.id.is_empty() {
            warn!(title = %item.title, "Ignoring add of item without an id");
            return Ok(());
        }
        add_breadcrumb("cart", "add", &[("id", item.id.as_str())]);
        self.cart.add(item, qty);
        self.commit()
    }

    /// Add a canonical item.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart could not be persisted.
    pub fn add_item(&mut self, item: CartItem, qty: Quantity) -> Result<(), StorageError> {
        self.add(RawItem::Stored(item), qty)
    }

    /// Delete a line; no-op when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart could not be persisted.
    pub fn remove(&mut self, id: &ProductId) -> Result<(), StorageError> {
        if self.cart.remove(id).is_none() {
            return Ok(());
        }
        add_breadcrumb("cart", "remove", &[("id", id.as_str())]);
        self.commit()
    }

    /// Overwrite a line's quantity.
    ///
    /// No-op when `qty < 1` (lines reach zero only through [`remove`]) or
    /// when `id` is absent.
    ///
    /// [`remove`]: Self::remove
    ///
    /// # Errors
    ///
    /// Returns an error if the cart could not be persisted.
    pub fn set_qty(&mut self, id: &ProductId, qty: u32) -> Result<(), StorageError> {
        let Some(qty) = Quantity::new(qty) else {
            debug!(%id, "Ignoring quantity below one");
            return Ok(());
        };
        if self.cart.quantity_of(id) == qty.get() || !self.cart.set_quantity(id, qty) {
            return Ok(());
        }
        add_breadcrumb("cart", "set_qty", &[("id", id.as_str())]);
        self.commit()
    }

    /// Empty the cart.
    ///
    /// Only the local state is cleared here; the remote clear is issued by
    /// the sync scheduler when it sees the empty cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart could not be persisted.
    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.cart.clear();
        add_breadcrumb("cart", "clear", &[]);
        self.commit()
    }

    /// Replace the whole cart (used by reconciliation).
    ///
    /// # Errors
    ///
    /// Returns an error if the cart could not be persisted.
    pub fn replace(&mut self, cart: Cart) -> Result<(), StorageError> {
        if cart == self.cart {
            return Ok(());
        }
        self.cart = cart;
        self.commit()
    }

    /// Persist the current cart, then notify the listener.
    ///
    /// The listener is notified even when persistence fails: the in-memory
    /// cart is authoritative and still has to reach the server.
    fn commit(&self) -> Result<(), StorageError> {
        let result = RecordEnvelope::new(&self.cart)
            .to_value()
            .and_then(|value| self.storage.save(Record::Cart, &value));
        if let Err(e) = &result {
            error!(error = %e, "Failed to persist cart");
        }
        if let Some(listener) = &self.listener {
            listener.cart_changed(&self.cart);
        }
        result
    }
}

/// Build a cart from any persisted layout.
fn hydrate(value: Value) -> Cart {
    normalize_list(value).into_iter().collect()
}
