//! Serial Registry Service
//!
//! Operator console and lookup API for serial numbers

use anyhow::{Context, Result};
use serial_registry::{create_router, AppState, Config, RedisSerialStore};
use std::sync::Arc;
use tagpage_common::Nonces;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "serial_registry=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    info!("Starting Serial Registry Service");
    info!("Redis URL: {}", config.redis_url);
    info!("Listening on {}", config.address());

    // Initialize storage
    let storage = RedisSerialStore::new(&config.redis_url)
        .await
        .context("Failed to initialize storage")?;

    // Create application state
    let state = AppState {
        storage: Arc::new(storage),
        nonces: Nonces::new(config.nonce_secret.as_bytes()),
    };

    // Create router
    let app = create_router(state);

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(&config.address())
        .await
        .context("Failed to bind to address")?;

    info!("Serial Registry Service running on http://{}", config.address());

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
