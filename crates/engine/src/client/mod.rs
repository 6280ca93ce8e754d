//! Remote cart service client.
//!
//! # Protocol
//!
//! | Operation | Effect | Idempotent |
//! |---|---|---|
//! | `view` | current server-side cart | yes |
//! | `add(id)` | adds the item with qty 1 if absent | no |
//! | `increase(id)` | qty += 1 | no |
//! | `decrease(id)` | qty -= 1 (server removes at zero) | no |
//! | `remove(id)` | deletes the line | yes |
//! | `clear` | empties the cart | yes |
//!
//! There is no "set absolute quantity" operation; convergence is reached by
//! issuing the right number of unit steps.

mod http;

use async_trait::async_trait;
use cart_sync_core::{Cart, ProductId};
use thiserror::Error;

pub use http::HttpCartClient;

/// Errors that can occur when talking to the remote cart service.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Service returned a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Rate limited by the service.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// No session credential to attach.
    #[error("No authenticated session")]
    Unauthenticated,

    /// Response body could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl ClientError {
    /// Whether retrying the same call later can succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 408,
            Self::Unauthenticated | Self::Parse(_) => false,
        }
    }
}

/// The remote cart service's operations.
#[async_trait]
pub trait CartService: Send + Sync {
    /// Fetch the server-side cart, normalized.
    async fn view(&self) -> Result<Cart, ClientError>;

    /// Add one unit of a product not yet in the cart.
    async fn add(&self, id: &ProductId) -> Result<(), ClientError>;

    /// Increase a line by one unit.
    async fn increase(&self, id: &ProductId) -> Result<(), ClientError>;

    /// Decrease a line by one unit.
    async fn decrease(&self, id: &ProductId) -> Result<(), ClientError>;

    /// Delete a line.
    async fn remove(&self, id: &ProductId) -> Result<(), ClientError>;

    /// Empty the cart.
    async fn clear(&self) -> Result<(), ClientError>;
}
