//! Canonical cart line item.

use serde::{Deserialize, Serialize};

use super::{Price, ProductId, Quantity};

/// Image shown when a source provides none.
pub const PLACEHOLDER_IMAGE: &str = "/assets/placeholder-rect.png";

/// A product in the cart, in the one shape every source is normalized to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    /// Stable product identifier.
    pub id: ProductId,
    /// Display title.
    pub title: String,
    /// Unit price.
    pub price: Price,
    /// Image URL or path.
    pub image: String,
    /// Units on this line.
    pub qty: Quantity,
    /// Catalog category, if known.
    pub category: Option<String>,
    /// Product description.
    pub description: String,
}

impl CartItem {
    /// Create an item with a single unit and defaults for everything but id
    /// and title.
    #[must_use]
    pub fn new(id: impl Into<ProductId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            price: Price::ZERO,
            image: PLACEHOLDER_IMAGE.to_string(),
            qty: Quantity::ONE,
            category: None,
            description: String::new(),
        }
    }

    /// Set the unit price.
    #[must_use]
    pub const fn with_price(mut self, price: Price) -> Self {
        self.price = price;
        self
    }

    /// Set the quantity.
    #[must_use]
    pub const fn with_qty(mut self, qty: Quantity) -> Self {
        self.qty = qty;
        self
    }
}
