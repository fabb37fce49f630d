//! Registration Service
//!
//! Order webhook, buyer registration forms and public tag pages

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use registration_service::{
    create_router,
    media::FileMediaStore,
    notices::RedisNoticeStore,
    orders::RedisOrderStore,
    pages::RedisPageStore,
    AppState, Config,
};
use serial_registry::RedisSerialStore;
use std::sync::Arc;
use tagpage_common::Nonces;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "registration_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    info!("Starting Registration Service");
    info!("Redis URL: {}", config.redis_url);
    info!("Public base URL: {}", config.public_base_url);
    info!("Media directory: {}", config.media_dir.display());

    if config.manual_test_mode {
        warn!(
            "Manual test mode is enabled: registrations without an order are accepted for product {}",
            config.manual_test_product_id
        );
    }
    if config.webhook_secret.is_none() {
        warn!("WEBHOOK_SECRET is not set, order webhooks are not authenticated");
    }

    // Initialize storage
    let client = redis::Client::open(config.redis_url.as_str())
        .context("Failed to create Redis client")?;
    let conn = ConnectionManager::new(client)
        .await
        .context("Failed to connect to Redis")?;

    let media = FileMediaStore::open(&config.media_dir, &config.public_base_url)
        .context("Failed to open media directory")?;

    // Create application state
    let state = AppState::new(
        config.settings(),
        Nonces::new(config.nonce_secret.as_bytes()),
        Arc::new(RedisSerialStore::with_connection(conn.clone())),
        Arc::new(RedisOrderStore::new(conn.clone())),
        Arc::new(RedisPageStore::new(conn.clone())),
        Arc::new(media),
        Arc::new(RedisNoticeStore::new(conn)),
    );

    // Create router
    let app = create_router(state);

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(&config.api_address())
        .await
        .context("Failed to bind to address")?;

    info!("Registration Service running on http://{}", config.api_address());

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
