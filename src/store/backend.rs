//! Token data model and the storage seam the repository talks to.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::TokenStoreError;

pub const ACCESS_TOKEN_SUFFIX: &str = "access_token";
pub const REFRESH_TOKEN_SUFFIX: &str = "refresh_token";

/// The two row keys owned by one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenKeys {
    pub access: String,
    pub refresh: String,
}

impl TokenKeys {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            access: format!("{prefix}{ACCESS_TOKEN_SUFFIX}"),
            refresh: format!("{prefix}{REFRESH_TOKEN_SUFFIX}"),
        }
    }
}

/// One persisted row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub key: String,
    /// Opaque token material, possibly sealed.
    pub value: String,
    /// `None` means the record never expires.
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenRecord {
    /// A record is live until its expiry instant has been reached.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expires_at| expires_at > now)
    }
}

/// The pair handed back to callers. Either side may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl TokenPair {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }

    /// Nothing usable is cached; the caller must run a fresh authorization flow.
    pub fn needs_reauthentication(&self) -> bool {
        self.is_empty()
    }

    /// The access token lapsed but a refresh token can mint a new one.
    pub fn needs_refresh(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_some()
    }
}

/// Durable storage for token records.
///
/// Implementations must make [`TokenBackend::upsert_pair`] atomic and must
/// read both keys in [`TokenBackend::fetch`] from a single consistent
/// snapshot, so a reader racing a writer sees either the old pair or the new
/// one.
#[async_trait]
pub trait TokenBackend: Send + Sync {
    /// Create the backing table if it is absent. Must be idempotent.
    async fn create_schema(&self) -> Result<(), TokenStoreError>;

    /// Read both values as stored. The access key is filtered by expiry at
    /// `now`; the refresh key is not.
    async fn fetch(
        &self,
        keys: &TokenKeys,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, TokenStoreError>;

    /// Delete rows under `keys` whose expiry is before `now`. Returns the
    /// number of rows removed.
    async fn purge_expired(
        &self,
        keys: &TokenKeys,
        now: DateTime<Utc>,
    ) -> Result<u64, TokenStoreError>;

    /// Insert-or-replace both records as one unit.
    async fn upsert_pair(
        &self,
        access: &TokenRecord,
        refresh: &TokenRecord,
    ) -> Result<(), TokenStoreError>;
}
