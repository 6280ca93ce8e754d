//! Core types for the cart synchronization engine.
//!
//! This module provides type-safe wrappers for cart domain concepts.

pub mod cart;
pub mod id;
pub mod item;
pub mod price;
pub mod quantity;
pub mod status;

pub use cart::Cart;
pub use id::ProductId;
pub use item::{CartItem, PLACEHOLDER_IMAGE};
pub use price::{Price, PriceError};
pub use quantity::{Quantity, QuantityError};
pub use status::SyncStatus;
