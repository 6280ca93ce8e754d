//! Wishlist commands. The wishlist is local-only.

use std::io::Write;

use cart_sync::{CartEngine, CartService};
use cart_sync_core::ProductId;
use tracing::info;

use super::{CliError, ItemSpec, print_items};

pub fn show<S: CartService>(engine: &CartEngine<S>) -> Result<(), CliError> {
    let items = engine.wishlist();
    let mut out = std::io::stdout().lock();
    if items.is_empty() {
        writeln!(out, "Wishlist is empty")?;
        return Ok(());
    }
    print_items(&mut out, &items)?;
    Ok(())
}

pub fn add<S: CartService>(engine: &CartEngine<S>, item: &ItemSpec) -> Result<(), CliError> {
    if !engine.wishlist_add(item.to_raw()?)? {
        info!("Already on the wishlist");
    }
    Ok(())
}

pub fn remove<S: CartService>(engine: &CartEngine<S>, id: &str) -> Result<(), CliError> {
    if !engine.wishlist_remove(&ProductId::new(id))? {
        info!(%id, "Not on the wishlist");
    }
    Ok(())
}

/// Move one unit into the cart.
pub fn move_to_cart<S: CartService>(engine: &CartEngine<S>, id: &str) -> Result<(), CliError> {
    if engine.move_to_cart(&ProductId::new(id))? {
        info!(%id, "Moved to cart");
    } else {
        info!(%id, "Not on the wishlist");
    }
    Ok(())
}
