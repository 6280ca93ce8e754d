//! Cart commands. All of them work offline against the local record.

use std::io::Write;

use cart_sync::{CartEngine, CartService};
use cart_sync_core::{Price, ProductId, Quantity};
use tracing::info;

use super::{CliError, ItemSpec, print_items};

/// Print the cart and its subtotal.
pub fn show<S: CartService>(engine: &CartEngine<S>, json: bool) -> Result<(), CliError> {
    let cart = engine.cart();
    let mut out = std::io::stdout().lock();

    if json {
        serde_json::to_writer_pretty(&mut out, &cart).map_err(std::io::Error::from)?;
        writeln!(out)?;
        return Ok(());
    }

    if cart.is_empty() {
        writeln!(out, "Cart is empty")?;
        return Ok(());
    }
    print_items(&mut out, &cart)?;
    writeln!(
        out,
        "Subtotal: {} ({} units)",
        Price::clamped(cart.subtotal()),
        cart.total_quantity()
    )?;
    writeln!(out, "Sync: {}", engine.status())?;
    Ok(())
}

/// Add `qty` units of a product.
pub fn add<S: CartService>(
    engine: &CartEngine<S>,
    item: &ItemSpec,
    qty: u32,
) -> Result<(), CliError> {
    let qty = Quantity::new(qty).ok_or(CliError::ZeroQuantity)?;
    engine.add(item.to_raw()?, qty)?;
    info!(%qty, "Added to cart");
    Ok(())
}

/// Remove a line.
pub fn remove<S: CartService>(engine: &CartEngine<S>, id: &str) -> Result<(), CliError> {
    engine.remove(&ProductId::new(id))?;
    Ok(())
}

/// Overwrite a line's quantity.
pub fn set_qty<S: CartService>(engine: &CartEngine<S>, id: &str, qty: u32) -> Result<(), CliError> {
    engine.set_qty(&ProductId::new(id), qty)?;
    Ok(())
}

/// Empty the cart.
pub fn clear<S: CartService>(engine: &CartEngine<S>) -> Result<(), CliError> {
    engine.clear()?;
    info!("Cart cleared");
    Ok(())
}
