//! In-process token backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::backend::{TokenBackend, TokenKeys, TokenPair, TokenRecord};
use crate::error::TokenStoreError;

/// Keeps records in a map behind one lock, so a pair write and a pair read
/// never interleave.
#[derive(Debug, Default)]
pub struct MemoryTokenBackend {
    rows: RwLock<HashMap<String, TokenRecord>>,
}

impl MemoryTokenBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored record, live or not, ordered by key.
    pub async fn records(&self) -> Vec<TokenRecord> {
        let rows = self.rows.read().await;
        let mut records: Vec<TokenRecord> = rows.values().cloned().collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }

    pub async fn record(&self, key: &str) -> Option<TokenRecord> {
        self.rows.read().await.get(key).cloned()
    }
}

#[async_trait]
impl TokenBackend for MemoryTokenBackend {
    async fn create_schema(&self) -> Result<(), TokenStoreError> {
        Ok(())
    }

    async fn fetch(
        &self,
        keys: &TokenKeys,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, TokenStoreError> {
        let rows = self.rows.read().await;

        Ok(TokenPair {
            access_token: rows
                .get(&keys.access)
                .filter(|record| record.is_live_at(now))
                .map(|record| record.value.clone()),
            refresh_token: rows.get(&keys.refresh).map(|record| record.value.clone()),
        })
    }

    async fn purge_expired(
        &self,
        keys: &TokenKeys,
        now: DateTime<Utc>,
    ) -> Result<u64, TokenStoreError> {
        let mut rows = self.rows.write().await;
        let mut removed = 0;

        for key in [&keys.access, &keys.refresh] {
            let expired = rows
                .get(key)
                .and_then(|record| record.expires_at)
                .is_some_and(|expires_at| expires_at < now);
            if expired {
                rows.remove(key);
                removed += 1;
            }
        }

        Ok(removed)
    }

    async fn upsert_pair(
        &self,
        access: &TokenRecord,
        refresh: &TokenRecord,
    ) -> Result<(), TokenStoreError> {
        let mut rows = self.rows.write().await;
        rows.insert(access.key.clone(), access.clone());
        rows.insert(refresh.key.clone(), refresh.clone());
        Ok(())
    }
}
