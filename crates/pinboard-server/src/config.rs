use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

/// Placeholder JWT secrets that must not reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let jwt_secret =
            std::env::var("PINBOARD_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            warn!("PINBOARD_JWT_SECRET is unset or still a placeholder; tokens are forgeable");
        }

        let port = std::env::var("PINBOARD_PORT")
            .unwrap_or_else(|_| "5000".into())
            .parse()
            .context("PINBOARD_PORT must be a port number")?;

        let token_ttl_days = std::env::var("PINBOARD_TOKEN_TTL_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|days| *days > 0)
            .unwrap_or(7);

        Ok(Self {
            host: std::env::var("PINBOARD_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            db_path: std::env::var("PINBOARD_DB_PATH")
                .unwrap_or_else(|_| "pinboard.db".into())
                .into(),
            jwt_secret,
            token_ttl_days,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}
