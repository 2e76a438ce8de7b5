use tokio::sync::OnceCell;
use tracing::info;

use super::backend::TokenBackend;
use crate::error::TokenStoreError;

/// Memoizes table creation for the lifetime of the owning repository.
///
/// Concurrent first callers share one attempt. A failed attempt is not
/// remembered, so the next call tries again.
#[derive(Debug, Default)]
pub struct SchemaInitializer {
    ready: OnceCell<()>,
}

impl SchemaInitializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.initialized()
    }

    pub async fn ensure(&self, backend: &dyn TokenBackend) -> Result<(), TokenStoreError> {
        self.ready
            .get_or_try_init(|| async {
                backend.create_schema().await?;
                info!("Token table ready ✓");
                Ok::<_, TokenStoreError>(())
            })
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::backend::{TokenKeys, TokenPair, TokenRecord};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Fails the first `failures` schema attempts, then succeeds.
    struct FlakySchema {
        failures: usize,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl TokenBackend for FlakySchema {
        async fn create_schema(&self) -> Result<(), TokenStoreError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if attempt < self.failures {
                Err(TokenStoreError::Schema("permission denied".into()))
            } else {
                Ok(())
            }
        }

        async fn fetch(&self, _: &TokenKeys, _: DateTime<Utc>) -> Result<TokenPair, TokenStoreError> {
            Ok(TokenPair::default())
        }

        async fn purge_expired(&self, _: &TokenKeys, _: DateTime<Utc>) -> Result<u64, TokenStoreError> {
            Ok(0)
        }

        async fn upsert_pair(&self, _: &TokenRecord, _: &TokenRecord) -> Result<(), TokenStoreError> {
            Ok(())
        }
    }

    fn flaky(failures: usize) -> FlakySchema {
        FlakySchema {
            failures,
            attempts: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn runs_once_after_success() {
        let backend = flaky(0);
        let schema = SchemaInitializer::new();
        schema.ensure(&backend).await.unwrap();
        schema.ensure(&backend).await.unwrap();
        assert!(schema.is_ready());
        assert_eq!(backend.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_is_retried_on_next_call() {
        let backend = flaky(1);
        let schema = SchemaInitializer::new();

        let err = schema.ensure(&backend).await.unwrap_err();
        assert!(matches!(err, TokenStoreError::Schema(_)));
        assert!(!schema.is_ready());

        schema.ensure(&backend).await.unwrap();
        assert!(schema.is_ready());
        assert_eq!(backend.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_first_callers_share_one_attempt() {
        let backend = Arc::new(flaky(0));
        let schema = Arc::new(SchemaInitializer::new());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let backend = backend.clone();
                let schema = schema.clone();
                tokio::spawn(async move { schema.ensure(backend.as_ref()).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(backend.attempts.load(Ordering::SeqCst), 1);
    }
}
