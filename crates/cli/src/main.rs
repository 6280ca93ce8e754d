//! Cart Sync CLI - drive a file-backed cart and sync it with the cart service.
//!
//! # Usage
//!
//! ```bash
//! # Work offline: changes land in $CART_STORAGE_DIR/cart.json
//! cartctl add 42 --title "Pineapple Tee" --price 24.00 --qty 2
//! cartctl set-qty 42 3
//! cartctl show
//!
//! # Sign in with CART_API_TOKEN, merge with the server cart and push.
//! # A session is merged once; later runs only push.
//! cartctl sync
//!
//! # Mutate and push straight away (merging first on a new session)
//! cartctl --push remove 42
//!
//! # Wishlist
//! cartctl wishlist add 7 --title "Sticker"
//! cartctl wishlist move 7
//! ```
//!
//! # Environment Variables
//!
//! - `CART_API_BASE_URL` - Cart service base URL (required)
//! - `CART_API_TOKEN` - Bearer token for `sync` and `--push`
//! - `CART_STORAGE_DIR` - Where cart and wishlist records live
//! - `SENTRY_DSN` - Error reporting (optional)
//! - `RUST_LOG` - Log filter, logs go to stderr

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cart_sync::CartSyncConfig;

mod commands;

#[derive(Parser)]
#[command(name = "cartctl")]
#[command(author, version, about = "Local-first cart with server sync")]
struct Cli {
    /// Push local changes to the cart service after the command
    #[arg(long, global = true)]
    push: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the cart
    Show {
        /// Print the raw cart as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add units of a product
    Add {
        #[command(flatten)]
        item: ItemArgs,

        /// Units to add
        #[arg(short, long, default_value_t = 1)]
        qty: u32,
    },
    /// Remove a line
    Remove {
        /// Product id
        id: String,
    },
    /// Set a line's quantity (values below 1 are ignored)
    SetQty {
        /// Product id
        id: String,
        /// New quantity
        qty: u32,
    },
    /// Empty the cart
    Clear,
    /// Manage the wishlist
    Wishlist {
        #[command(subcommand)]
        action: WishlistAction,
    },
    /// Sign in, merge with the server cart and push the result
    Sync {
        /// Bearer token (defaults to `CART_API_TOKEN`)
        #[arg(long)]
        token: Option<String>,
    },
}

#[derive(Subcommand)]
enum WishlistAction {
    /// Print the wishlist
    Show,
    /// Save a product
    Add {
        #[command(flatten)]
        item: ItemArgs,
    },
    /// Drop a product
    Remove {
        /// Product id
        id: String,
    },
    /// Move a product into the cart
    Move {
        /// Product id
        id: String,
    },
}

/// A product given on the command line.
#[derive(Args)]
struct ItemArgs {
    /// Product id
    #[arg(required_unless_present = "json")]
    id: Option<String>,

    /// Display title
    #[arg(short, long)]
    title: Option<String>,

    /// Unit price
    #[arg(short, long)]
    price: Option<Decimal>,

    /// Raw product JSON in any supported shape, instead of the fields above
    #[arg(long, conflicts_with_all = ["id", "title", "price"])]
    json: Option<String>,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &CartSyncConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Sentry must be initialized before the tracing subscriber
    let config = CartSyncConfig::from_env();
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cart_sync=info,cart_sync_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let result: Result<(), Box<dyn std::error::Error>> = match config {
        Ok(config) => run(cli, config).await.map_err(Into::into),
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: CartSyncConfig) -> Result<(), commands::CliError> {
    let token_override = match &cli.command {
        Commands::Sync { token } => token.clone(),
        _ => None,
    };
    let wants_session = cli.push || matches!(cli.command, Commands::Sync { .. });
    let engine = commands::open_engine(&config, token_override, wants_session)?;

    // Merge before mutating so nothing is pushed against an unmerged server
    let reconciled = if wants_session {
        commands::sync::sign_in(&engine).await?
    } else {
        false
    };

    match cli.command {
        Commands::Show { json } => commands::cart::show(&engine, json)?,
        Commands::Add { item, qty } => commands::cart::add(&engine, &item.into(), qty)?,
        Commands::Remove { id } => commands::cart::remove(&engine, &id)?,
        Commands::SetQty { id, qty } => commands::cart::set_qty(&engine, &id, qty)?,
        Commands::Clear => commands::cart::clear(&engine)?,
        Commands::Wishlist { action } => match action {
            WishlistAction::Show => commands::wishlist::show(&engine)?,
            WishlistAction::Add { item } => commands::wishlist::add(&engine, &item.into())?,
            WishlistAction::Remove { id } => commands::wishlist::remove(&engine, &id)?,
            WishlistAction::Move { id } => commands::wishlist::move_to_cart(&engine, &id)?,
        },
        Commands::Sync { .. } => {}
    }

    if wants_session {
        if !reconciled {
            return Err(commands::CliError::MergePending);
        }
        commands::sync::push(&engine).await?;
    }
    Ok(())
}

impl From<ItemArgs> for commands::ItemSpec {
    fn from(args: ItemArgs) -> Self {
        match args.json {
            Some(json) => Self::Json(json),
            None => Self::Fields {
                id: args.id.unwrap_or_default(),
                title: args.title,
                price: args.price,
            },
        }
    }
}
