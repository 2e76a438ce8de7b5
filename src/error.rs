use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// SQLSTATE codes the backing store reports for retryable transaction conflicts.
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// Unified error type for the token store.
#[derive(Debug, thiserror::Error)]
pub enum TokenStoreError {
    // ── Setup ───────────────────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Schema error: {0}")]
    Schema(String),

    // ── Backing store ───────────────────────────────────────────────────
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Transient database error: {0}")]
    Transient(String),

    #[error("Database error: {0}")]
    Database(String),

    // ── Caller errors ───────────────────────────────────────────────────
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Authentication required")]
    Unauthorized,

    // ── Sealing ─────────────────────────────────────────────────────────
    #[error("Crypto error: {0}")]
    Crypto(String),
}

impl TokenStoreError {
    /// Whether a whole transaction may be retried after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, TokenStoreError::Transient(_))
    }
}

impl From<sqlx::Error> for TokenStoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => TokenStoreError::Connection(e.to_string()),
            sqlx::Error::Configuration(_) => TokenStoreError::Configuration(e.to_string()),
            sqlx::Error::Database(db)
                if matches!(
                    db.code().as_deref(),
                    Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED)
                ) =>
            {
                tracing::warn!("Transient database error: {e}");
                TokenStoreError::Transient(e.to_string())
            }
            _ => {
                tracing::error!("Database error: {e}");
                TokenStoreError::Database(e.to_string())
            }
        }
    }
}

impl From<tokio::time::error::Elapsed> for TokenStoreError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        TokenStoreError::Connection("operation timed out".into())
    }
}

impl IntoResponse for TokenStoreError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            TokenStoreError::Configuration(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error")
            }
            TokenStoreError::Schema(_) => (StatusCode::INTERNAL_SERVER_ERROR, "schema_error"),
            TokenStoreError::Connection(_) => (StatusCode::SERVICE_UNAVAILABLE, "connection_error"),
            TokenStoreError::Transient(_) => (StatusCode::SERVICE_UNAVAILABLE, "transient_error"),
            TokenStoreError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            TokenStoreError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
            TokenStoreError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            TokenStoreError::Crypto(_) => (StatusCode::INTERNAL_SERVER_ERROR, "crypto_error"),
        };

        let body = json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_is_a_connection_error() {
        let err: TokenStoreError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, TokenStoreError::Connection(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn row_not_found_is_a_database_error() {
        let err: TokenStoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, TokenStoreError::Database(_)));
    }

    #[test]
    fn invalid_argument_maps_to_bad_request() {
        let resp = TokenStoreError::InvalidArgument("empty".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn connection_error_maps_to_service_unavailable() {
        let resp = TokenStoreError::Connection("down".into()).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
