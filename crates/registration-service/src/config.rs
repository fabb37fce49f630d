//! Configuration management for the Registration Service
//!
//! Loads configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

use crate::Settings;

/// Default product id for manual registrations
pub const DEFAULT_MANUAL_TEST_PRODUCT_ID: u64 = 35;

/// Default upload limit (8 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 8 * 1024 * 1024;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis connection URL
    pub redis_url: String,

    /// API server host
    pub api_host: String,

    /// API server port
    pub api_port: u16,

    /// Base URL the service is reachable under from browsers
    pub public_base_url: String,

    /// Directory for uploaded images
    pub media_dir: PathBuf,

    /// Secret used to sign anti-forgery tokens
    pub nonce_secret: String,

    /// Shared secret of the order webhook
    pub webhook_secret: Option<String>,

    /// Accept manual registrations without an order
    pub manual_test_mode: bool,

    /// Product manual registrations are filed under
    pub manual_test_product_id: u64,

    /// Largest accepted request body
    pub max_upload_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        let api_host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let api_port: u16 = env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .context("Invalid API_PORT")?;

        let config = Config {
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),

            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}", api_port)),

            api_host,
            api_port,

            media_dir: env::var("MEDIA_DIR")
                .unwrap_or_else(|_| "./media".to_string())
                .into(),

            nonce_secret: env::var("NONCE_SECRET").unwrap_or_default(),

            webhook_secret: env::var("WEBHOOK_SECRET").ok().filter(|s| !s.is_empty()),

            manual_test_mode: env::var("MANUAL_TEST_MODE")
                .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
                .unwrap_or(false),

            manual_test_product_id: env::var("MANUAL_TEST_PRODUCT_ID")
                .unwrap_or_else(|_| DEFAULT_MANUAL_TEST_PRODUCT_ID.to_string())
                .parse()
                .context("Invalid MANUAL_TEST_PRODUCT_ID")?,

            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .unwrap_or_else(|_| DEFAULT_MAX_UPLOAD_BYTES.to_string())
                .parse()
                .context("Invalid MAX_UPLOAD_BYTES")?,
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.api_port == 0 {
            anyhow::bail!("API_PORT must be greater than 0");
        }

        if self.nonce_secret.len() < 16 {
            anyhow::bail!("NONCE_SECRET must be at least 16 characters");
        }

        if !self.public_base_url.starts_with("http://")
            && !self.public_base_url.starts_with("https://")
        {
            anyhow::bail!("PUBLIC_BASE_URL must be an http(s) URL");
        }

        if self.manual_test_product_id == 0 {
            anyhow::bail!("MANUAL_TEST_PRODUCT_ID must be greater than 0");
        }

        if self.max_upload_bytes == 0 {
            anyhow::bail!("MAX_UPLOAD_BYTES must be greater than 0");
        }

        Ok(())
    }

    /// Get the API server address
    pub fn api_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    /// Settings handed to the router
    pub fn settings(&self) -> Settings {
        Settings {
            public_base_url: self.public_base_url.clone(),
            manual_test_mode: self.manual_test_mode,
            manual_test_product_id: self.manual_test_product_id,
            webhook_secret: self.webhook_secret.clone(),
            media_dir: self.media_dir.clone(),
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}
