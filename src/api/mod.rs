//! Internal HTTP surface over the token repository.
//!
//! Mounts under /v1/:
//! - /v1/status — Health check
//! - /v1/tokens — Read or replace the cached token pair

pub mod routes;

use crate::SharedState;
use axum::http::{header, HeaderName, Method};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn router(state: SharedState) -> Router {
    // Only the token verbs and the headers they need.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::PUT])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(routes::INTERNAL_SECRET_HEADER),
        ]);

    Router::new()
        .nest("/v1", routes::v1_router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
