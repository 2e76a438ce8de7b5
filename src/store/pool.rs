//! Lazily created, bounded PostgreSQL connection pool.

use std::str::FromStr;
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::OnceCell;
use tracing::info;

use crate::error::TokenStoreError;

/// Pool sizing and timeouts.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    /// Bounds both establishing a connection and waiting for a free one.
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    /// Require TLS without verifying the server certificate.
    pub require_ssl: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(30),
            require_ssl: false,
        }
    }
}

/// Owns the pool. Nothing connects until the first acquisition, and a missing
/// URL is only reported then.
pub struct ConnectionManager {
    database_url: Option<String>,
    settings: PoolSettings,
    pool: OnceCell<PgPool>,
}

impl ConnectionManager {
    pub fn new(database_url: Option<String>, settings: PoolSettings) -> Self {
        Self {
            database_url,
            settings,
            pool: OnceCell::new(),
        }
    }

    /// The shared pool, created on first call. A failed attempt leaves nothing
    /// cached, so the next caller tries again.
    pub async fn pool(&self) -> Result<&PgPool, TokenStoreError> {
        let url = self.database_url.as_deref().ok_or_else(|| {
            TokenStoreError::Configuration(
                "DATABASE_URL is required (PostgreSQL connection string)".into(),
            )
        })?;

        self.pool
            .get_or_try_init(|| async {
                let mut options = PgConnectOptions::from_str(url).map_err(|e| {
                    TokenStoreError::Configuration(format!("Invalid DATABASE_URL: {e}"))
                })?;
                if self.settings.require_ssl {
                    options = options.ssl_mode(PgSslMode::Require);
                }

                let pool = PgPoolOptions::new()
                    .max_connections(self.settings.max_connections)
                    .acquire_timeout(self.settings.connect_timeout)
                    .idle_timeout(self.settings.idle_timeout)
                    .connect_with(options)
                    .await?;

                info!(
                    max_connections = self.settings.max_connections,
                    "Token store pool connected"
                );
                Ok::<_, TokenStoreError>(pool)
            })
            .await
    }

    /// Check out a connection. It returns to the pool when dropped.
    pub async fn acquire(&self) -> Result<PoolConnection<Postgres>, TokenStoreError> {
        Ok(self.pool().await?.acquire().await?)
    }

    /// Start a transaction on a pooled connection. Dropping it uncommitted
    /// rolls back and releases the connection.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, TokenStoreError> {
        Ok(self.pool().await?.begin().await?)
    }
}
