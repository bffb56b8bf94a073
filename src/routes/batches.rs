use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::db;
use crate::error::AppError;
use crate::models::Batch;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
}

pub async fn list(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Batch>>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let batches = db::batches::list(&state.pool, limit).await?;
    Ok(Json(batches))
}

pub async fn get(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let batch = db::batches::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Batch not found".to_string()))?;

    let counts = db::queue::status_counts_for_batch(&state.pool, id).await?;
    let items: serde_json::Map<String, serde_json::Value> = counts
        .into_iter()
        .map(|(status, count)| (status, json!(count)))
        .collect();

    Ok(Json(json!({ "batch": batch, "items": items })))
}

/// Cancel a batch: its pending items stop being dispatched. Already
/// in-flight submissions are not recalled.
pub async fn cancel(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Some(batch) = db::batches::cancel(&state.pool, id).await? else {
        return match db::batches::find_by_id(&state.pool, id).await? {
            Some(batch) => Err(AppError::Conflict(format!(
                "Batch is already {}",
                batch.status
            ))),
            None => Err(AppError::NotFound("Batch not found".to_string())),
        };
    };

    let cancelled_items = db::queue::cancel_for_batch(&state.pool, id).await?;

    tracing::info!(batch_id = %id, cancelled_items, "Batch cancelled");

    Ok(Json(json!({ "batch": batch, "cancelled_items": cancelled_items })))
}
