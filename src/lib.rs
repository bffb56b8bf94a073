pub mod config;
pub mod error;
pub mod state;
pub mod db;
pub mod models;
pub mod middleware;
pub mod routes;
pub mod engine;
pub mod indexing;
pub mod scheduler;

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use sqlx::PgPool;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::indexing::{IndexingApi, TokenProvider};
use crate::state::{AppState, SharedState};

/// Assemble the router and shared state. The token and indexing adapters
/// are injected so tests can wire in scripted doubles.
pub fn build_app(
    pool: PgPool,
    config: Config,
    tokens: Arc<dyn TokenProvider>,
    indexer: Arc<dyn IndexingApi>,
) -> (Router, SharedState) {
    let state: SharedState = Arc::new(AppState::new(pool, config, tokens, indexer));

    let router = Router::new()
        .merge(routes::api_routes().layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::api_key::require_api_key,
        )))
        .route("/health", axum::routing::get(health))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .with_state(state.clone());

    (router, state)
}

async fn health() -> &'static str {
    "ok"
}
