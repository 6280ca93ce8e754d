//! The cart: an id-keyed, insertion-ordered set of line items.
//!
//! # Invariants
//!
//! - Every `id` appears at most once; adding an existing id grows its
//!   quantity.
//! - Every line has `qty >= 1` (enforced by [`Quantity`]).
//! - Items without an id are never stored.
//!
//! Insertion order is kept for display stability only. Equality ignores it.

use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{CartItem, ProductId, Quantity};

/// A shopper's cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cart {
    items: IndexMap<ProductId, CartItem>,
}

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Look up a line by id.
    #[must_use]
    pub fn get(&self, id: &ProductId) -> Option<&CartItem> {
        self.items.get(id)
    }

    /// Whether a line with `id` exists.
    #[must_use]
    pub fn contains(&self, id: &ProductId) -> bool {
        self.items.contains_key(id)
    }

    /// Quantity of `id`, or 0 when absent.
    #[must_use]
    pub fn quantity_of(&self, id: &ProductId) -> u32 {
        self.items.get(id).map_or(0, |item| item.qty.get())
    }

    /// Iterate lines in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &CartItem> {
        self.items.values()
    }

    /// Ids in ascending order, for deterministic processing.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<&ProductId> {
        let mut ids: Vec<&ProductId> = self.items.keys().collect();
        ids.sort();
        ids
    }

    /// Add `qty` units of `item`.
    ///
    /// An existing line keeps its metadata and grows by `qty`; otherwise the
    /// item is inserted with exactly `qty` units. Returns `false` (and does
    /// nothing) when the item has no id.
    pub fn add(&mut self, item: CartItem, qty: Quantity) -> bool {
        if item.id.is_empty() {
            return false;
        }
        match self.items.get_mut(&item.id) {
            Some(existing) => existing.qty = existing.qty.saturating_add(qty),
            None => {
                let id = item.id.clone();
                self.items.insert(id, CartItem { qty, ..item });
            }
        }
        true
    }

    /// Insert or replace a line as-is.
    pub fn upsert(&mut self, item: CartItem) -> bool {
        if item.id.is_empty() {
            return false;
        }
        self.items.insert(item.id.clone(), item);
        true
    }

    /// Remove a line, returning it if present.
    pub fn remove(&mut self, id: &ProductId) -> Option<CartItem> {
        self.items.shift_remove(id)
    }

    /// Overwrite the quantity of an existing line.
    ///
    /// Returns `false` when `id` is absent.
    pub fn set_quantity(&mut self, id: &ProductId, qty: Quantity) -> bool {
        self.items.get_mut(id).is_some_and(|item| {
            item.qty = qty;
            true
        })
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Total units across all lines.
    #[must_use]
    pub fn total_quantity(&self) -> u64 {
        self.items.values().map(|item| u64::from(item.qty.get())).sum()
    }

    /// Sum of `price * qty` over all lines.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.items
            .values()
            .map(|item| item.price.line_total(item.qty))
            .sum()
    }
}

impl FromIterator<CartItem> for Cart {
    /// Builds a cart, folding repeated ids into one line.
    fn from_iter<I: IntoIterator<Item = CartItem>>(iter: I) -> Self {
        let mut cart = Self::new();
        for item in iter {
            let qty = item.qty;
            cart.add(item, qty);
        }
        cart
    }
}

impl<'a> IntoIterator for &'a Cart {
    type Item = &'a CartItem;
    type IntoIter = indexmap::map::Values<'a, ProductId, CartItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.values()
    }
}
