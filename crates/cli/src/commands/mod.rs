//! Command implementations.

pub mod cart;
pub mod sync;
pub mod wishlist;

use std::io::Write;
use std::sync::Arc;

use cart_sync::config::is_plausible_token;
use cart_sync::normalize::{RawItem, normalize_value};
use cart_sync::{
    CartEngine, CartSyncConfig, ClientError, HttpCartClient, JsonFileStorage, SessionCell,
    StorageError, SyncError,
};
use cart_sync_core::{CartItem, Price};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::{Value, json};
use thiserror::Error;

/// Errors surfaced by `cartctl` commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// A command needs a session but no token is configured.
    #[error("No cart service token: set CART_API_TOKEN or pass --token")]
    MissingToken,

    /// Token failed the placeholder/entropy check.
    #[error("Token rejected: looks like a placeholder or is too short")]
    InsecureToken,

    /// `--json` was not valid JSON.
    #[error("Invalid item JSON: {0}")]
    InvalidItem(#[from] serde_json::Error),

    /// Item has no usable product id.
    #[error("Item has no product id")]
    MissingId,

    /// Quantity argument was zero.
    #[error("Quantity must be at least 1")]
    ZeroQuantity,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The sign-in merge could not fetch the server cart.
    #[error("Server cart unavailable: local cart kept, run `cartctl sync` to merge")]
    MergePending,

    /// A background pass failed; the change stays queued locally.
    #[error("Sync failed: {0}")]
    SyncFailed(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),
}

/// A product as given on the command line.
pub enum ItemSpec {
    Fields {
        id: String,
        title: Option<String>,
        price: Option<Decimal>,
    },
    Json(String),
}

impl ItemSpec {
    /// Parse into a normalizer input.
    pub fn to_raw(&self) -> Result<RawItem, CliError> {
        let value: Value = match self {
            Self::Fields { id, title, price } => json!({
                "id": id,
                "title": title.clone().unwrap_or_default(),
                "price": price.map(|p| p.to_string()),
            }),
            Self::Json(text) => serde_json::from_str(text)?,
        };
        if normalize_value(value.clone()).id.is_empty() {
            return Err(CliError::MissingId);
        }
        Ok(RawItem::classify(value))
    }
}

/// Build the engine over the configured storage directory and service.
///
/// With `wants_session` the session is signed in with the override token
/// or `CART_API_TOKEN`; otherwise the engine stays anonymous and nothing
/// leaves the machine.
pub fn open_engine(
    config: &CartSyncConfig,
    token_override: Option<String>,
    wants_session: bool,
) -> Result<CartEngine<HttpCartClient>, CliError> {
    let session = if wants_session {
        let token = match token_override {
            Some(token) => {
                let token = SecretString::from(token);
                if !is_plausible_token(&token) {
                    return Err(CliError::InsecureToken);
                }
                token
            }
            None => config.api.token.clone().ok_or(CliError::MissingToken)?,
        };
        SessionCell::signed_in(token)
    } else {
        SessionCell::anonymous()
    };
    let session = Arc::new(session);

    let service = Arc::new(HttpCartClient::new(&config.api, session.clone())?);
    let storage = Arc::new(JsonFileStorage::new(&config.storage_dir));

    Ok(CartEngine::new(service, session, storage, config.sync))
}

/// Write item lines as a table.
pub fn print_items<'a>(
    out: &mut impl Write,
    items: impl IntoIterator<Item = &'a CartItem>,
) -> std::io::Result<()> {
    for item in items {
        let total = Price::clamped(item.price.line_total(item.qty));
        writeln!(
            out,
            "{:>4} x {:<32} {:>10} {:>10}  [{}]",
            item.qty.get(),
            item.title,
            item.price.to_string(),
            total.to_string(),
            item.id
        )?;
    }
    Ok(())
}
