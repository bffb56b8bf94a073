use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::AppError;
use crate::state::SharedState;

/// Static API key check for the management API. A deployment without
/// INDEXFLOW_API_KEY runs open (local/single-user setups).
pub async fn require_api_key(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(expected) = &state.config.api_key {
        let provided = req
            .headers()
            .get("x-api-key")
            .and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            return Err(AppError::Unauthorized(
                "Missing or invalid API key".to_string(),
            ));
        }
    }
    Ok(next.run(req).await)
}
