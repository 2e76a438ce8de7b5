//! Public surface of the token store: read the cached pair, persist a new one.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use super::backend::{TokenBackend, TokenKeys, TokenPair, TokenRecord};
use super::pool::ConnectionManager;
use super::postgres::PgTokenBackend;
use super::schema::SchemaInitializer;
use crate::config::Config;
use crate::crypto::TokenCipher;
use crate::error::TokenStoreError;

/// Reads and writes the access/refresh token pair for one key prefix.
///
/// Holds no token state of its own; every call goes to the backend. Share one
/// instance per process so table creation is attempted once.
pub struct TokenRepository {
    backend: Arc<dyn TokenBackend>,
    schema: SchemaInitializer,
    keys: TokenKeys,
    cipher: TokenCipher,
    operation_timeout: Option<Duration>,
    purge_expired_on_read: bool,
}

impl TokenRepository {
    pub fn new(backend: Arc<dyn TokenBackend>, kv_prefix: &str) -> Self {
        Self {
            backend,
            schema: SchemaInitializer::new(),
            keys: TokenKeys::with_prefix(kv_prefix),
            cipher: TokenCipher::plaintext(),
            operation_timeout: None,
            purge_expired_on_read: true,
        }
    }

    /// PostgreSQL-backed repository wired from service configuration.
    pub fn from_config(config: &Config) -> Result<Self, TokenStoreError> {
        let connections = Arc::new(ConnectionManager::new(
            config.database_url.clone(),
            config.pool_settings(),
        ));
        let cipher = TokenCipher::from_config_key(config.token_encryption_key.as_deref())?;

        Ok(Self::new(Arc::new(PgTokenBackend::new(connections)), &config.kv_prefix)
            .with_cipher(cipher)
            .with_operation_timeout(config.operation_timeout)
            .with_purge_on_read(config.purge_expired_on_read))
    }

    pub fn with_cipher(mut self, cipher: TokenCipher) -> Self {
        self.cipher = cipher;
        self
    }

    /// Abort `get`/`store` calls that take longer than `limit`.
    pub fn with_operation_timeout(mut self, limit: Duration) -> Self {
        self.operation_timeout = Some(limit);
        self
    }

    pub fn with_purge_on_read(mut self, enabled: bool) -> Self {
        self.purge_expired_on_read = enabled;
        self
    }

    pub fn keys(&self) -> &TokenKeys {
        &self.keys
    }

    pub fn schema_ready(&self) -> bool {
        self.schema.is_ready()
    }

    /// Create the table if this repository has not done so yet.
    pub async fn ensure_schema(&self) -> Result<(), TokenStoreError> {
        self.schema.ensure(self.backend.as_ref()).await
    }

    /// Current tokens. An expired access token reads as `None`; missing rows
    /// are not an error.
    pub async fn get(&self) -> Result<TokenPair, TokenStoreError> {
        self.bounded(async {
            self.ensure_schema().await?;
            let now = Utc::now();

            if self.purge_expired_on_read {
                match self.backend.purge_expired(&self.keys, now).await {
                    Ok(0) => {}
                    Ok(removed) => debug!(removed, "Purged expired token rows"),
                    Err(e) => warn!("Expired token cleanup failed: {e}"),
                }
            }

            let stored = self.backend.fetch(&self.keys, now).await?;

            Ok::<_, TokenStoreError>(TokenPair {
                access_token: self.open(&self.keys.access, stored.access_token),
                refresh_token: self.open(&self.keys.refresh, stored.refresh_token),
            })
        })
        .await
    }

    /// Replace both tokens in one transaction. The access token expires
    /// `access_token_expiry_secs` from now; the refresh token never does.
    pub async fn store(
        &self,
        access_token: &str,
        access_token_expiry_secs: i64,
        refresh_token: &str,
    ) -> Result<(), TokenStoreError> {
        if access_token.is_empty() {
            return Err(TokenStoreError::InvalidArgument(
                "access token must not be empty".into(),
            ));
        }
        if refresh_token.is_empty() {
            return Err(TokenStoreError::InvalidArgument(
                "refresh token must not be empty".into(),
            ));
        }
        if access_token_expiry_secs < 0 {
            return Err(TokenStoreError::InvalidArgument(format!(
                "access token expiry must be non-negative, got {access_token_expiry_secs}"
            )));
        }

        let expires_at = chrono::Duration::try_seconds(access_token_expiry_secs)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| {
                TokenStoreError::InvalidArgument(format!(
                    "access token expiry out of range: {access_token_expiry_secs}"
                ))
            })?;

        let access = TokenRecord {
            key: self.keys.access.clone(),
            value: self.cipher.seal(access_token)?,
            expires_at: Some(expires_at),
        };
        let refresh = TokenRecord {
            key: self.keys.refresh.clone(),
            value: self.cipher.seal(refresh_token)?,
            expires_at: None,
        };

        self.bounded(async {
            self.ensure_schema().await?;

            match self.backend.upsert_pair(&access, &refresh).await {
                Err(e) if e.is_transient() => {
                    warn!("Retrying token write after transient error: {e}");
                    self.backend.upsert_pair(&access, &refresh).await?;
                }
                other => other?,
            }

            debug!(%expires_at, "Stored token pair");
            Ok::<_, TokenStoreError>(())
        })
        .await
    }

    /// A value that cannot be opened (written in plaintext, or under another
    /// key) reads as absent so the caller falls back to a fresh auth flow.
    fn open(&self, key: &str, stored: Option<String>) -> Option<String> {
        let value = stored?;
        match self.cipher.open(&value) {
            Ok(plain) => Some(plain),
            Err(e) => {
                warn!(key, "Ignoring unreadable token value: {e}");
                None
            }
        }
    }

    async fn bounded<T, F>(&self, operation: F) -> Result<T, TokenStoreError>
    where
        F: Future<Output = Result<T, TokenStoreError>>,
    {
        match self.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, operation).await?,
            None => operation.await,
        }
    }
}
