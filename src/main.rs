use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use drive_token_store::{api, AppState, Config, SharedState, TokenRepository};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drive_token_store=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    info!("drive-token-store v{}", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}:{}", config.host, config.port);

    let tokens = TokenRepository::from_config(&config)?;

    // Missing or unreachable databases only fail the calls that need them.
    match tokens.ensure_schema().await {
        Ok(()) => info!("Token store connected ✓"),
        Err(e) => warn!("Token store not ready yet: {e}. Will retry on first request."),
    }

    let state: SharedState = Arc::new(AppState {
        config: config.clone(),
        tokens,
    });

    let app = api::router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server ready ✓");
    axum::serve(listener, app).await?;

    Ok(())
}
