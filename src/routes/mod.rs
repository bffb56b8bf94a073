pub mod accounts;
pub mod batches;
pub mod process;
pub mod queue;
pub mod rebalance;
pub mod submissions;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::SharedState;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        // Accounts
        .route(
            "/api/v1/accounts",
            get(accounts::list).post(accounts::create),
        )
        .route("/api/v1/accounts/{id}", delete(accounts::delete))
        .route("/api/v1/accounts/{id}/probe", post(accounts::probe))
        .route("/api/v1/accounts/{id}/quota", get(accounts::quota_status))
        // Queue
        .route("/api/v1/queue", get(queue::list).post(queue::enqueue))
        .route("/api/v1/queue/url", post(queue::enqueue_single))
        .route("/api/v1/queue/pending", delete(queue::clear_pending))
        // Processing
        .route("/api/v1/process", post(process::process_now))
        // Rebalancing
        .route("/api/v1/rebalance/preview", get(rebalance::preview))
        .route("/api/v1/rebalance/commit", post(rebalance::commit))
        // Batches
        .route("/api/v1/batches", get(batches::list))
        .route("/api/v1/batches/{id}", get(batches::get))
        .route("/api/v1/batches/{id}/cancel", post(batches::cancel))
        // Submission log
        .route("/api/v1/submissions", get(submissions::list))
}
