use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::engine::rebalance::{self, RebalancePlan, RebalanceSummary};
use crate::error::AppError;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct CommitRequest {
    #[serde(default)]
    pub confirm: bool,
}

pub async fn preview(State(state): State<SharedState>) -> Result<Json<RebalancePlan>, AppError> {
    let plan = rebalance::preview(&state.pool).await?;
    Ok(Json(plan))
}

/// Apply a freshly recomputed rebalance plan. Destructive: every pending
/// item loses its current batch/account assignment, so an explicit confirm
/// flag is required.
pub async fn commit(
    State(state): State<SharedState>,
    Json(req): Json<CommitRequest>,
) -> Result<Json<RebalanceSummary>, AppError> {
    if !req.confirm {
        return Err(AppError::BadRequest(
            "Rebalancing is irreversible; pass {\"confirm\": true}".to_string(),
        ));
    }

    let summary = rebalance::commit(&state.pool).await?;
    Ok(Json(summary))
}
