//! Cart Sync Core - Shared cart domain types.
//!
//! This crate provides the types shared by every cart-sync component:
//! - `cart-sync` - The synchronization engine (store, scheduler, reconciliation)
//! - `cart-sync-cli` - Command-line driver for a file-backed cart
//!
//! # Architecture
//!
//! The core crate contains only types and pure operations - no I/O, no
//! persistence, no HTTP clients. Every invariant of a cart (unique ids,
//! quantities of at least one, non-negative prices) is enforced here so the
//! engine cannot represent an invalid cart.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for product ids, prices, quantities, plus
//!   `CartItem`, `Cart` and `SyncStatus`

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
