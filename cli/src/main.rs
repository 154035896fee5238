use std::sync::Arc;

use cart::config::{CartConfig, ConfigError};
use cart::net::api::{ApiError, Catalog, HttpCatalog};
use cart::net::types::CartItem;
use cart::state::cart::CartStore;
use cart::state::notice::{Notice, NoticeLog};
use cart::util::format::format_price;
use cart::util::storage::{FileStore, StorageError};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("storage unavailable: {0}")]
    Storage(#[from] StorageError),
    #[error("catalog client setup failed: {0}")]
    Api(#[from] ApiError),
    #[error("cart encode failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "cart", about = "Storefront cart backed by the catalog stock API")]
struct Cli {
    /// Catalog API root.
    #[arg(long, env = "CART_API_BASE_URL")]
    base_url: Option<String>,

    /// File backing the cart storage.
    #[arg(long, env = "CART_STORAGE_PATH")]
    storage_path: Option<String>,

    /// Storage key holding the cart.
    #[arg(long, env = "CART_STORAGE_KEY")]
    storage_key: Option<String>,

    /// Print the cart as JSON instead of a table.
    #[arg(long, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Show the current cart.
    List,
    /// Add one unit of a product.
    Add { product_id: u64 },
    /// Remove a product from the cart.
    Remove { product_id: u64 },
    /// Set the quantity of a product already in the cart.
    Update {
        product_id: u64,
        #[arg(allow_negative_numbers = true)]
        amount: i64,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    init_tracing();
    let cli = Cli::parse();

    let config = apply_overrides(CartConfig::from_env()?, &cli)?;
    tracing::debug!(
        base_url = %config.api_base_url,
        storage_path = %config.storage_path,
        storage_key = %config.storage_key,
        "config resolved"
    );
    let catalog = Arc::new(HttpCatalog::from_config(&config)?);

    let (notices, output) = run(&cli, &config, catalog).await?;
    for notice in notices {
        eprintln!("error: {}", notice.message);
    }
    print!("{output}");
    Ok(())
}

/// Apply one command to the stored cart.
///
/// Cart failures come back as notices alongside the rendered cart; only an
/// unusable store or an encode failure is an `Err`.
async fn run(cli: &Cli, config: &CartConfig, catalog: Arc<dyn Catalog>) -> Result<(Vec<Notice>, String), CliError> {
    let storage = FileStore::open(&config.storage_path)?;
    let mut store = CartStore::load(catalog, storage, config.storage_key.clone(), NoticeLog::new());

    match cli.command {
        Command::List => {}
        Command::Add { product_id } => store.add_product(product_id).await,
        Command::Remove { product_id } => store.remove_product(product_id),
        Command::Update { product_id, amount } => store.update_product_amount(product_id, amount).await,
    }

    let output = if cli.json {
        format!("{}\n", serde_json::to_string_pretty(store.cart())?)
    } else {
        render_cart(store.cart(), store.total())
    };
    Ok((store.notifier_mut().drain(), output))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error")))
        .with_writer(std::io::stderr)
        .init();
}

fn apply_overrides(mut config: CartConfig, cli: &Cli) -> Result<CartConfig, ConfigError> {
    if let Some(base_url) = &cli.base_url {
        base_url.trim_end_matches('/').clone_into(&mut config.api_base_url);
    }
    if let Some(path) = &cli.storage_path {
        config.storage_path.clone_from(path);
    }
    if let Some(key) = &cli.storage_key {
        config.storage_key.clone_from(key);
    }
    config.validate()?;
    Ok(config)
}

fn render_cart(items: &[CartItem], total: f64) -> String {
    if items.is_empty() {
        return "cart is empty\n".to_owned();
    }
    let mut out = String::new();
    for item in items {
        out.push_str(&format!(
            "{:>6}  {:>3} x {}  {}\n",
            item.id(),
            item.amount,
            item.product.title,
            format_price(item.subtotal())
        ));
    }
    out.push_str(&format!("total: {}\n", format_price(total)));
    out
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
