use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::db;
use crate::error::AppError;
use crate::models::SubmissionRecord;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
}

pub async fn list(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<SubmissionRecord>>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let records = db::submissions::list_recent(&state.pool, limit).await?;
    Ok(Json(records))
}
