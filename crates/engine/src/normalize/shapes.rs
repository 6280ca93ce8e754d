//! Known source shapes and their conversions to `CartItem`.

use cart_sync_core::{CartItem, PLACEHOLDER_IMAGE, Price, ProductId, Quantity};
use serde::Deserialize;
use serde_json::Value;

use super::coerce::{decimal, first_of, first_text, product_id, quantity, text};

// =============================================================================
// ProductFields - every alias any source has been seen to use
// =============================================================================

/// Loosely-typed product attributes.
///
/// Every field is an untyped `Value` so deserializing an object can never
/// fail; interpretation happens in the conversions below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProductFields {
    #[serde(rename = "_id")]
    pub underscore_id: Option<Value>,
    pub id: Option<Value>,
    #[serde(rename = "productId")]
    pub product_id: Option<Value>,
    pub title: Option<Value>,
    pub name: Option<Value>,
    #[serde(rename = "productName")]
    pub product_name: Option<Value>,
    pub price: Option<Value>,
    pub amount: Option<Value>,
    pub image: Option<Value>,
    pub images: Option<Value>,
    pub qty: Option<Value>,
    pub quantity: Option<Value>,
    pub category: Option<Value>,
    pub cat: Option<Value>,
    pub description: Option<Value>,
    pub desc: Option<Value>,
    pub product: Option<Value>,
}

impl ProductFields {
    /// Read the fields of a JSON object. Non-objects yield all-`None`.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        if value.is_object() {
            serde_json::from_value(value.clone()).unwrap_or_default()
        } else {
            Self::default()
        }
    }

    /// Whether the object names a product at all.
    #[must_use]
    pub const fn is_identifiable(&self) -> bool {
        self.underscore_id.is_some()
            || self.id.is_some()
            || self.title.is_some()
            || self.name.is_some()
            || self.product_name.is_some()
    }

    fn resolve_id(&self) -> Option<ProductId> {
        first_of(
            &[
                self.underscore_id.as_ref(),
                self.id.as_ref(),
                self.product_id.as_ref(),
            ],
            product_id,
        )
    }

    fn resolve_title(&self) -> Option<String> {
        first_of(
            &[
                self.title.as_ref(),
                self.name.as_ref(),
                self.product_name.as_ref(),
            ],
            text,
        )
    }

    fn resolve_price(&self) -> Option<Price> {
        let nested = self.product.as_ref().and_then(|p| p.get("price"));
        first_of(&[self.price.as_ref(), self.amount.as_ref(), nested], decimal)
            .map(Price::clamped)
    }

    fn resolve_image(&self) -> Option<String> {
        let nested = self.product.as_ref().and_then(|p| p.get("image"));
        first_of(&[self.image.as_ref()], text)
            .or_else(|| self.images.as_ref().and_then(first_text))
            .or_else(|| nested.and_then(text))
    }

    fn resolve_qty(&self) -> Option<Quantity> {
        first_of(&[self.qty.as_ref(), self.quantity.as_ref()], quantity)
    }

    fn resolve_category(&self) -> Option<String> {
        first_of(&[self.category.as_ref(), self.cat.as_ref()], text)
    }

    fn resolve_description(&self) -> Option<String> {
        first_of(&[self.description.as_ref(), self.desc.as_ref()], text)
    }
}

// =============================================================================
// Source shapes
// =============================================================================

/// A product object as returned by the catalog.
#[derive(Debug, Clone, Default)]
pub struct CatalogProduct(pub ProductFields);

/// A line item from the remote cart service.
///
/// The product may be nested under `product`, or under an object-valued
/// `productId`; the quantity may be `quantity` or `qty`.
#[derive(Debug, Clone, Default)]
pub struct ServerLine {
    /// Fields on the line itself.
    pub line: ProductFields,
    /// Fields of the nested product, when there is one.
    pub product: Option<ProductFields>,
}

impl ServerLine {
    /// Split a line object into line and nested-product fields.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let line = ProductFields::from_value(value);
        let product = line
            .product
            .as_ref()
            .filter(|p| p.is_object())
            .or_else(|| line.product_id.as_ref().filter(|p| p.is_object()))
            .map(ProductFields::from_value);
        Self { line, product }
    }
}

// =============================================================================
// IntoCartItem - one conversion per shape
// =============================================================================

/// Conversion from a known source shape into the canonical item.
pub trait IntoCartItem {
    fn into_cart_item(self) -> CartItem;
}

impl IntoCartItem for CartItem {
    fn into_cart_item(self) -> CartItem {
        self
    }
}

impl IntoCartItem for CatalogProduct {
    fn into_cart_item(self) -> CartItem {
        let fields = self.0;
        CartItem {
            id: fields.resolve_id().unwrap_or_default(),
            title: fields.resolve_title().unwrap_or_default(),
            price: fields.resolve_price().unwrap_or(Price::ZERO),
            image: fields
                .resolve_image()
                .unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string()),
            qty: fields.resolve_qty().unwrap_or(Quantity::ONE),
            category: fields.resolve_category(),
            description: fields.resolve_description().unwrap_or_default(),
        }
    }
}

impl IntoCartItem for ServerLine {
    fn into_cart_item(self) -> CartItem {
        let Self { line, product } = self;
        // The line's scalar productId names the product; a nested object's
        // own id comes next, then whatever the line itself carries.
        let line_id = line
            .product_id
            .as_ref()
            .filter(|v| !v.is_object())
            .and_then(product_id);
        let product = product.unwrap_or_default();

        CartItem {
            id: line_id
                .or_else(|| product.resolve_id())
                .or_else(|| line.resolve_id())
                .unwrap_or_default(),
            title: product
                .resolve_title()
                .or_else(|| line.resolve_title())
                .unwrap_or_default(),
            price: product
                .resolve_price()
                .or_else(|| line.resolve_price())
                .unwrap_or(Price::ZERO),
            image: product
                .resolve_image()
                .or_else(|| line.resolve_image())
                .unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string()),
            qty: first_of(&[line.quantity.as_ref(), line.qty.as_ref()], quantity)
                .unwrap_or(Quantity::ONE),
            category: product
                .resolve_category()
                .or_else(|| line.resolve_category()),
            description: product
                .resolve_description()
                .or_else(|| line.resolve_description())
                .unwrap_or_default(),
        }
    }
}
