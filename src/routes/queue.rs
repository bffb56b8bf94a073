use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::db;
use crate::engine::distribute::{self, Policy};
use crate::engine::quota;
use crate::error::AppError;
use crate::models::QueueItem;
use crate::state::SharedState;

const MAX_BATCH_URLS: usize = 10_000;

#[derive(Deserialize)]
pub struct EnqueueRequest {
    pub urls: Vec<String>,
    pub policy: Option<Policy>,
    pub name: Option<String>,
}

#[derive(Deserialize)]
pub struct EnqueueSingle {
    pub url: String,
    pub page_path: Option<String>,
}

#[derive(Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

fn validate_url(url: &str) -> Result<(), AppError> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(AppError::BadRequest(format!("Not an absolute URL: {url}")));
    }
    Ok(())
}

/// Enqueue a batch of URLs, planning the account split up front with the
/// requested policy. URLs no account currently has capacity for are stored
/// unassigned and picked up by later cycles.
pub async fn enqueue(
    State(state): State<SharedState>,
    Json(req): Json<EnqueueRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if req.urls.is_empty() {
        return Err(AppError::BadRequest("urls must not be empty".to_string()));
    }
    if req.urls.len() > MAX_BATCH_URLS {
        return Err(AppError::BadRequest(format!(
            "Too many URLs in one batch (max {MAX_BATCH_URLS})"
        )));
    }
    for url in &req.urls {
        validate_url(url)?;
    }

    let policy = req.policy.unwrap_or_default();
    let now = Utc::now();
    let today = quota::utc_today(now);

    let accounts: Vec<_> = db::accounts::list_active(&state.pool)
        .await?
        .into_iter()
        .filter(|a| a.is_eligible())
        .collect();
    let usages = quota::load_usage(&state.pool, accounts, now).await?;

    let name = req
        .name
        .unwrap_or_else(|| format!("batch-{}", now.format("%Y%m%d-%H%M%S")));
    let batch = db::batches::create(&state.pool, &name, req.urls.len() as i32, policy.as_str())
        .await?;

    let plan = distribute::distribute(&usages, &req.urls, policy);
    for assignment in &plan.assignments {
        for url in &assignment.urls {
            db::queue::enqueue(
                &state.pool,
                url,
                None,
                Some(assignment.account_id),
                Some(batch.id),
                today,
            )
            .await?;
        }
    }
    for url in &plan.unassigned {
        db::queue::enqueue(&state.pool, url, None, None, Some(batch.id), today).await?;
    }

    let projection = distribute::project(req.urls.len() as i64, &usages, today, policy);

    tracing::info!(
        batch_id = %batch.id,
        urls = req.urls.len(),
        assigned = plan.assigned_count(),
        policy = policy.as_str(),
        "Batch enqueued"
    );

    Ok(Json(json!({
        "batch": batch,
        "assigned": plan.assigned_count(),
        "unassigned": plan.unassigned.len(),
        "projection": projection,
    })))
}

/// Enqueue one URL outside any batch. The processor assigns an account at
/// dispatch time.
pub async fn enqueue_single(
    State(state): State<SharedState>,
    Json(req): Json<EnqueueSingle>,
) -> Result<Json<QueueItem>, AppError> {
    validate_url(&req.url)?;

    let today = quota::utc_today(Utc::now());
    let item = db::queue::enqueue(
        &state.pool,
        &req.url,
        req.page_path.as_deref(),
        None,
        None,
        today,
    )
    .await?;

    Ok(Json(item))
}

pub async fn list(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<QueueItem>>, AppError> {
    if let Some(status) = params.status.as_deref() {
        if !matches!(
            status,
            "pending" | "processing" | "completed" | "failed" | "cancelled"
        ) {
            return Err(AppError::BadRequest(format!("Unknown status: {status}")));
        }
    }
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);

    let items = db::queue::list(&state.pool, params.status.as_deref(), limit).await?;
    Ok(Json(items))
}

/// Delete every pending item. Batches left with nothing outstanding are
/// closed with their totals shrunk to what actually settled.
pub async fn clear_pending(
    State(state): State<SharedState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let cleared = db::queue::clear_pending(&state.pool).await?;
    let closed = db::batches::close_orphaned(&state.pool).await?;

    tracing::info!(cleared, closed, "Pending queue cleared");

    Ok(Json(json!({ "cleared": cleared, "closed_batches": closed })))
}
