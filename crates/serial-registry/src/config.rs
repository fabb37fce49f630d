//! Configuration management for the Serial Registry
//!
//! Loads configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis connection URL
    pub redis_url: String,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Secret used to sign anti-forgery tokens
    pub nonce_secret: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        let config = Config {
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),

            host: env::var("REGISTRY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),

            port: env::var("REGISTRY_PORT")
                .unwrap_or_else(|_| "8083".to_string())
                .parse()
                .context("Invalid REGISTRY_PORT")?,

            nonce_secret: env::var("NONCE_SECRET").unwrap_or_default(),
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("REGISTRY_PORT must be greater than 0");
        }

        if self.nonce_secret.len() < 16 {
            anyhow::bail!("NONCE_SECRET must be at least 16 characters");
        }

        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
