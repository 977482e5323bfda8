use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Secrets that ship in sample files and must never reach a running server.
const PLACEHOLDER_SECRETS: &[&str] = &["", "change-me", "dev-secret-change-me", "secret", "changeme"];

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub token_ttl: chrono::Duration,
    pub dispatch_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("CAMPUSNEST_JWT_SECRET").context("CAMPUSNEST_JWT_SECRET must be set")?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.trim()) {
            bail!("CAMPUSNEST_JWT_SECRET is a placeholder; set a real secret");
        }

        let db_path = get("CAMPUSNEST_DB_PATH").unwrap_or_else(|| "campusnest.db".into());
        let host = get("CAMPUSNEST_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("CAMPUSNEST_PORT")
            .unwrap_or_else(|| "8000".into())
            .parse()
            .context("CAMPUSNEST_PORT must be a port number")?;
        let ttl_minutes: i64 = get("CAMPUSNEST_TOKEN_TTL_MINUTES")
            .unwrap_or_else(|| "30".into())
            .parse()
            .context("CAMPUSNEST_TOKEN_TTL_MINUTES must be a whole number")?;
        if ttl_minutes <= 0 {
            bail!("CAMPUSNEST_TOKEN_TTL_MINUTES must be positive");
        }
        let dispatch_ms: u64 = get("CAMPUSNEST_DISPATCH_TIMEOUT_MS")
            .unwrap_or_else(|| "2000".into())
            .parse()
            .context("CAMPUSNEST_DISPATCH_TIMEOUT_MS must be a whole number")?;

        Ok(Self {
            jwt_secret,
            db_path: PathBuf::from(db_path),
            host,
            port,
            token_ttl: chrono::Duration::minutes(ttl_minutes),
            dispatch_timeout: Duration::from_millis(dispatch_ms),
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}
