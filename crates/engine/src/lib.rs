//! Cart Sync engine library.
//!
//! Local-first cart state that stays usable offline and converges with a
//! remote cart service that only understands unit steps (`add`,
//! `increase`, `decrease`, `remove`, `clear`).
//!
//! - [`normalize`] turns any incoming item shape into a [`CartItem`]
//! - [`store::LocalCartStore`] owns the cart and persists every mutation
//! - [`sync`] debounces changes and pushes them, one pass at a time
//! - [`reconcile`] merges local and server carts once per sign-in
//! - [`engine::CartEngine`] wires these together
//!
//! [`CartItem`]: cart_sync_core::CartItem

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod normalize;
pub mod reconcile;
pub mod storage;
pub mod store;
pub mod sync;
pub mod wishlist;

#[cfg(test)]
mod test_support;

pub use auth::{AuthSession, SessionCell};
pub use client::{CartService, ClientError, HttpCartClient};
pub use config::{CartSyncConfig, SyncConfig};
pub use engine::CartEngine;
pub use error::SyncError;
pub use reconcile::ReconcileOutcome;
pub use storage::{JsonFileStorage, MemoryStorage, StorageError};
pub use sync::{SyncHandle, SyncSnapshot};
