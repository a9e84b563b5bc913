//! Duka payments core service.
//!
//! Main entry point. Initializes tracing, configuration, the database pool
//! (with tenant-scope hygiene installed), the idempotency store, and the
//! metrics exporter, then serves until shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use duka_api::{AppState, Config, OrderStatusProcessor};
use duka_core::{storage, Storage};
use duka_idempotency::{IdempotencyGuard, IdempotencyStore, MemoryStore, RedisStore};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    init_tracing(&config.rust_log);

    info!("Starting Duka payments core");
    info!(
        database_url = %config.database_url_masked(),
        base_domain = %config.base_domain,
        redis = config.redis_url.is_some(),
        "Configuration loaded"
    );

    let pool = create_database_pool(&config).await?;
    info!("Database connection pool established");

    storage::schema::bootstrap(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("schema bootstrap failed: {e}"))?;
    info!("Schema and row-level-security policies installed");

    let storage = Storage::new(pool.clone());

    let store: Arc<dyn IdempotencyStore> = match &config.redis_url {
        Some(url) => {
            let store = RedisStore::connect(url)
                .map_err(|e| anyhow::anyhow!("redis connection failed: {e}"))?;
            info!("Idempotency store: redis");
            Arc::new(store)
        },
        None => {
            warn!("REDIS_URL not set; idempotency state is in-memory and single-node only");
            Arc::new(MemoryStore::new())
        },
    };

    let guard = IdempotencyGuard::new(store, config.to_guard_config());
    let processor = Arc::new(OrderStatusProcessor::new(storage.clone()));

    install_metrics_exporter(&config);

    let addr = config.parse_server_addr()?;
    let state = AppState::new(storage, guard, processor, config);

    info!(addr = %addr, "Duka is ready to receive webhooks");

    if let Err(e) = duka_api::start_server(state, addr).await {
        error!(error = %e, "Server failed");
    }

    pool.close().await;
    info!("Database connections closed");

    info!("Duka shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .or_else(|_| EnvFilter::try_new("info"))
        .expect("default tracing filter is valid");

    let fmt_layer = fmt::layer().with_target(true).with_file(true).with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Creates the database connection pool with retry logic.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    let mut retries = 0;
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    let settings = config.to_pool_settings();

    loop {
        match storage::connect(&config.database_url, &settings).await {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .context("Failed to verify database connection")?;

                return Ok(pool);
            },
            Err(_e) if retries < MAX_RETRIES => {
                retries += 1;
                info!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
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

/// Installs the Prometheus exporter on the configured metrics port.
fn install_metrics_exporter(config: &Config) {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let addr = match config.parse_metrics_addr() {
        Ok(addr) => addr,
        Err(e) => {
            warn!(error = %e, "invalid metrics address; exporter disabled");
            return;
        },
    };

    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => info!(addr = %addr, "Prometheus exporter listening"),
        Err(e) => warn!(error = %e, "failed to install metrics exporter; continuing without"),
    }
}
