use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mechanic_shop::config::AppConfig;
use mechanic_shop::database::{DatabaseManager, MemoryShopStore, PgShopStore, ShopStore};
use mechanic_shop::{app, AppState};

#[derive(Parser, Debug)]
#[command(name = "mechanic-shop", version, about = "Mechanic shop HTTP API")]
struct Cli {
    /// Listen port (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Keep everything in process memory instead of PostgreSQL
    #[arg(long)]
    memory: bool,

    /// Create missing tables before serving
    #[arg(long)]
    init_schema: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so DATABASE_URL, SECURITY_TOKEN_SECRET, etc. are picked up
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mechanic_shop=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::from_env();
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if cli.memory {
        config.database.use_memory_store = true;
    }
    config.validate()?;
    tracing::info!("Starting mechanic shop API in {:?} mode", config.environment);

    let store: Arc<dyn ShopStore> = if config.database.use_memory_store {
        tracing::warn!("Using the in-memory store; data is lost on exit");
        Arc::new(MemoryShopStore::new())
    } else {
        let pool = DatabaseManager::connect(&config.database)
            .await
            .context("failed to connect to PostgreSQL")?;
        let store = PgShopStore::new(pool);
        if cli.init_schema {
            store.install_schema().await.context("failed to install schema")?;
            tracing::info!("Schema installed");
        }
        Arc::new(store)
    };

    let bind_addr = format!("{}:{}", config.server.bind_host, config.server.port);
    let state = AppState::new(config, store).context("invalid security configuration")?;
    spawn_limiter_sweep(&state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("Mechanic shop API listening on http://{}", bind_addr);

    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;

    Ok(())
}

/// Forget rate windows idle for longer than the widest configured rule
fn spawn_limiter_sweep(state: &AppState) {
    let limits = &state.config.rate_limits;
    let widest = limits.customer_create.window().max(limits.customer_login.window());
    if !limits.enabled || widest.is_zero() {
        return;
    }

    let limiter = state.limiter.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(widest);
        loop {
            ticker.tick().await;
            limiter.purge_expired(widest);
            tracing::debug!("rate limiter tracking {} keys", limiter.tracked_keys());
        }
    });
}
