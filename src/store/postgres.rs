//! PostgreSQL backend for the token table.
//!
//! Table: `auth_tokens (key PRIMARY KEY, value NOT NULL, expires_at NULL)`.
//! Several deployments may share it; each only touches its own prefixed keys.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::debug;

use super::backend::{TokenBackend, TokenKeys, TokenPair, TokenRecord};
use super::pool::ConnectionManager;
use crate::error::TokenStoreError;

/// `duplicate_table`: another process created the table first.
const DUPLICATE_TABLE: &str = "42P07";
/// `unique_violation` on `pg_type`: two concurrent `CREATE TABLE IF NOT EXISTS`.
const UNIQUE_VIOLATION: &str = "23505";

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS auth_tokens (
        key         VARCHAR(255) PRIMARY KEY,
        value       TEXT NOT NULL,
        expires_at  TIMESTAMPTZ
    )
"#;

const UPSERT_TOKEN: &str = r#"
    INSERT INTO auth_tokens (key, value, expires_at)
    VALUES ($1, $2, $3)
    ON CONFLICT (key)
    DO UPDATE SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
"#;

/// Token backend over a pooled PostgreSQL connection.
pub struct PgTokenBackend {
    connections: Arc<ConnectionManager>,
}

impl PgTokenBackend {
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self { connections }
    }
}

#[async_trait]
impl TokenBackend for PgTokenBackend {
    async fn create_schema(&self) -> Result<(), TokenStoreError> {
        let mut conn = self.connections.acquire().await?;

        match sqlx::query(CREATE_TABLE).execute(&mut *conn).await {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db))
                if matches!(db.code().as_deref(), Some(DUPLICATE_TABLE) | Some(UNIQUE_VIOLATION)) =>
            {
                debug!("auth_tokens created concurrently by another session");
                Ok(())
            }
            Err(e) => Err(match TokenStoreError::from(e) {
                TokenStoreError::Database(msg) | TokenStoreError::Transient(msg) => {
                    TokenStoreError::Schema(msg)
                }
                other => other,
            }),
        }
    }

    async fn fetch(
        &self,
        keys: &TokenKeys,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, TokenStoreError> {
        let mut conn = self.connections.acquire().await?;

        // One statement, one snapshot: both keys come from the same commit.
        let rows = sqlx::query(
            r#"
            SELECT key, value
            FROM auth_tokens
            WHERE (key = $1 AND (expires_at IS NULL OR expires_at > $3))
               OR key = $2
            "#,
        )
        .bind(&keys.access)
        .bind(&keys.refresh)
        .bind(now)
        .fetch_all(&mut *conn)
        .await?;

        let mut pair = TokenPair::default();
        for row in rows {
            let key: String = row.try_get(0)?;
            let value: String = row.try_get(1)?;
            if key == keys.access {
                pair.access_token = Some(value);
            } else if key == keys.refresh {
                pair.refresh_token = Some(value);
            }
        }

        Ok(pair)
    }

    async fn purge_expired(
        &self,
        keys: &TokenKeys,
        now: DateTime<Utc>,
    ) -> Result<u64, TokenStoreError> {
        let mut conn = self.connections.acquire().await?;

        let affected = sqlx::query(
            r#"
            DELETE FROM auth_tokens
            WHERE key IN ($1, $2)
              AND expires_at IS NOT NULL
              AND expires_at < $3
            "#,
        )
        .bind(&keys.access)
        .bind(&keys.refresh)
        .bind(now)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        Ok(affected)
    }

    async fn upsert_pair(
        &self,
        access: &TokenRecord,
        refresh: &TokenRecord,
    ) -> Result<(), TokenStoreError> {
        let mut tx = self.connections.begin().await?;

        // Fixed write order keeps concurrent writers from deadlocking each other.
        for record in [access, refresh] {
            sqlx::query(UPSERT_TOKEN)
                .bind(&record.key)
                .bind(&record.value)
                .bind(record.expires_at)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
