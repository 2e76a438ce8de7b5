pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod store;

pub use config::Config;
pub use error::TokenStoreError;
pub use store::{TokenPair, TokenRepository};

use std::sync::Arc;

/// Shared application state passed to all API handlers.
pub struct AppState {
    pub config: Config,
    pub tokens: TokenRepository,
}

pub type SharedState = Arc<AppState>;
