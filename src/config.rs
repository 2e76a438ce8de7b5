use anyhow::{bail, Context, Result};
use std::time::Duration;

use crate::store::PoolSettings;

/// Upper bound on the pool size; the deployment target allows little concurrency.
const MAX_POOL_CONNECTIONS: u32 = 10;

/// Application configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // ── Server ──────────────────────────────────────────────────────────
    pub host: String,
    pub port: u16,

    // ── Database ────────────────────────────────────────────────────────
    /// Left unset here on purpose: a missing URL only fails on first use.
    pub database_url: Option<String>,
    pub database_ssl: bool,
    pub db_max_connections: u32,
    pub db_connect_timeout: Duration,
    pub db_idle_timeout: Duration,

    // ── Token store ─────────────────────────────────────────────────────
    /// Prepended to `access_token` / `refresh_token` to form the row keys.
    pub kv_prefix: String,
    pub operation_timeout: Duration,
    pub purge_expired_on_read: bool,
    /// 32-byte base64-encoded AES-256-GCM key. Values are stored verbatim without it.
    pub token_encryption_key: Option<String>,

    // ── Service-to-service auth ─────────────────────────────────────────
    pub internal_api_secret: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let production = var("APP_ENV").as_deref() == Some("production");

        let db_max_connections: u32 = parse_or(&var, "DB_MAX_CONNECTIONS", 5)?;

        Ok(Config {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&var, "PORT", 8430)?,

            database_url: var("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_ssl: parse_bool_or(&var, "DATABASE_SSL", production)?,
            db_max_connections: db_max_connections.clamp(1, MAX_POOL_CONNECTIONS),
            db_connect_timeout: Duration::from_secs(parse_or(&var, "DB_CONNECT_TIMEOUT_SECS", 5)?),
            db_idle_timeout: Duration::from_secs(parse_or(&var, "DB_IDLE_TIMEOUT_SECS", 30)?),

            kv_prefix: var("KV_PREFIX").unwrap_or_default(),
            operation_timeout: Duration::from_secs(parse_or(
                &var,
                "TOKEN_OPERATION_TIMEOUT_SECS",
                10,
            )?),
            purge_expired_on_read: parse_bool_or(&var, "PURGE_EXPIRED_ON_READ", true)?,
            token_encryption_key: var("TOKEN_ENCRYPTION_KEY").filter(|k| !k.is_empty()),

            internal_api_secret: var("INTERNAL_API_SECRET")
                .filter(|s| !s.is_empty())
                .context("INTERNAL_API_SECRET is required for the internal token API")?,
        })
    }

    /// Pool options for the connection manager.
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_connections: self.db_max_connections,
            connect_timeout: self.db_connect_timeout,
            idle_timeout: self.db_idle_timeout,
            require_ssl: self.database_ssl,
        }
    }
}

fn parse_or<F, T>(var: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {name}: {raw:?}")),
        None => Ok(default),
    }
}

fn parse_bool_or<F>(var: &F, name: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = var(name) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("Invalid {name}: {raw:?} (expected true/false)"),
    }
}
