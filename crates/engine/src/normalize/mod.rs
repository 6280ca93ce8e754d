//! Normalizer: heterogeneous item representations to one `CartItem` shape.
//!
//! Items arrive from the catalog, from remote cart responses, and from the
//! durable local mirror. None of those shapes is contractually fixed, so
//! normalization is total: every input yields a `CartItem`, and anything
//! unrecognized degrades to defaults (price 0, placeholder image, qty 1).
//! An item whose id cannot be determined gets an empty id; stores skip it.
//!
//! # Example
//!
//! ```rust
//! use cart_sync::normalize::normalize_value;
//! use serde_json::json;
//!
//! let item = normalize_value(json!({
//!     "productId": { "_id": "p1", "title": "Mug", "price": 9.5 },
//!     "quantity": 2
//! }));
//! assert_eq!(item.id.as_str(), "p1");
//! assert_eq!(item.qty.get(), 2);
//! ```

mod coerce;
mod shapes;

use cart_sync_core::CartItem;
use serde_json::Value;

pub use shapes::{CatalogProduct, IntoCartItem, ProductFields, ServerLine};

/// An incoming item, tagged by the source shape it was recognized as.
#[derive(Debug, Clone)]
pub enum RawItem {
    /// Already in canonical form (previously normalized and persisted).
    Stored(CartItem),
    /// A remote cart line item.
    ServerLine(ServerLine),
    /// A catalog product.
    Catalog(CatalogProduct),
    /// Anything else; converts to an all-defaults item.
    Unknown(Value),
}

impl RawItem {
    /// Recognize the shape of `value`.
    ///
    /// Checks run from most to least specific: an exact canonical item, then
    /// anything carrying line-item markers (`product`, `productId`,
    /// `quantity`), then anything naming a product.
    #[must_use]
    pub fn classify(value: Value) -> Self {
        if !value.is_object() {
            return Self::Unknown(value);
        }

        if let Ok(item) = serde_json::from_value::<CartItem>(value.clone()) {
            return Self::Stored(item);
        }

        let fields = ProductFields::from_value(&value);
        if fields.product.as_ref().is_some_and(Value::is_object)
            || fields.product_id.is_some()
            || fields.quantity.is_some()
        {
            return Self::ServerLine(ServerLine::from_value(&value));
        }

        if fields.is_identifiable() {
            return Self::Catalog(CatalogProduct(fields));
        }

        Self::Unknown(value)
    }

    /// Short name of the recognized shape, for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Stored(_) => "stored",
            Self::ServerLine(_) => "server_line",
            Self::Catalog(_) => "catalog",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Convert a tagged item to canonical form. Never fails.
#[must_use]
pub fn normalize(raw: RawItem) -> CartItem {
    match raw {
        RawItem::Stored(item) => item.into_cart_item(),
        RawItem::ServerLine(line) => line.into_cart_item(),
        RawItem::Catalog(product) => product.into_cart_item(),
        RawItem::Unknown(value) => {
            tracing::debug!(value = %truncate(&value), "Unrecognized item shape, using defaults");
            CatalogProduct::default().into_cart_item()
        }
    }
}

/// Classify and normalize a JSON value.
#[must_use]
pub fn normalize_value(value: Value) -> CartItem {
    normalize(RawItem::classify(value))
}

/// Normalize a collection of items.
///
/// Accepts an array, an object with an `items` field, or an id-keyed object
/// (the key fills in a missing id). Entries without an id are dropped.
#[must_use]
pub fn normalize_list(value: Value) -> Vec<CartItem> {
    match value {
        Value::Array(entries) => entries
            .into_iter()
            .map(normalize_value)
            .filter(|item| !item.id.is_empty())
            .collect(),
        Value::Object(mut map) => {
            if let Some(items) = map.remove("items") {
                return normalize_list(items);
            }
            map.into_iter()
                .map(|(key, entry)| {
                    let mut item = normalize_value(entry);
                    if item.id.is_empty() {
                        item.id = key.into();
                    }
                    item
                })
                .filter(|item| !item.id.is_empty())
                .collect()
        }
        other => {
            tracing::debug!(value = %truncate(&other), "Expected a list of items, got a scalar");
            Vec::new()
        }
    }
}

fn truncate(value: &Value) -> String {
    value.to_string().chars().take(200).collect()
}
