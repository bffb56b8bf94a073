use axum::extract::State;
use axum::Json;

use crate::engine::processor::{self, CycleReport};
use crate::error::AppError;
use crate::state::SharedState;

/// Run one processing cycle inline and return its report. Overlap with the
/// scheduled cycle is resolved by the processor's locks: the second caller
/// gets a report flagged `skipped`.
pub async fn process_now(State(state): State<SharedState>) -> Result<Json<CycleReport>, AppError> {
    let report = processor::run_cycle(&state).await?;
    Ok(Json(report))
}
