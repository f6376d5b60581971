//! Tether user sync service.
//!
//! Main entry point for the Tether server. Loads configuration, connects to
//! the user store and serves the identity provider webhook until shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tether_api::{config::DEFAULT_LOG_FILTER, AppState, ClerkClient, Config, ServerOptions};
use tether_core::{storage::run_migrations, PostgresUserStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    init_tracing(&config.rust_log);

    info!("Starting Tether user sync service");

    let addr = config.parse_server_addr()?;
    info!(
        database_url = %config.database_url_masked(),
        server_addr = %addr,
        max_connections = config.database_max_connections,
        "Configuration loaded"
    );

    let webhook = config.webhook().context("Invalid webhook configuration")?;
    let identity = ClerkClient::new(config.to_identity_config()?)
        .context("Failed to build identity provider client")?;

    let db_pool = create_database_pool(&config).await?;
    info!("Database connection pool established");

    run_migrations(&db_pool).await.context("Failed to run database migrations")?;
    info!("Database migrations completed");

    let state = AppState::new(
        webhook,
        Arc::new(PostgresUserStore::new(db_pool.clone())),
        Arc::new(identity),
    );

    info!(addr = %addr, "Tether is ready to receive webhooks");
    tether_api::start_server(state, ServerOptions::from(&config), addr)
        .await
        .context("Server failed")?;

    db_pool.close().await;
    info!("Database connections closed");

    info!("Tether shutdown complete");
    Ok(())
}

/// Initializes tracing from the configured filter directives.
///
/// `RUST_LOG` reaches `rust_log` through the configuration's environment
/// layer, so it still takes precedence over `config.toml`.
fn init_tracing(directives: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(env_filter(directives)).with(fmt_layer).init();
}

/// Parses filter directives, falling back to the default filter.
fn env_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Creates the database connection pool with retry logic.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);
    let mut retries = 0;

    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connection_timeout))
            .idle_timeout(Duration::from_secs(config.database_idle_timeout))
            .max_lifetime(Duration::from_secs(config.database_max_lifetime))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .context("Failed to verify database connection")?;

                return Ok(pool);
            },
            Err(e) if retries < MAX_RETRIES => {
                retries += 1;
                info!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    error = %e,
                    "Database connection failed, retrying..."
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("Failed to create database connection pool after retries");
            },
        }
    }
}
