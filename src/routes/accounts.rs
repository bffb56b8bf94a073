use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::db;
use crate::engine::{health, quota};
use crate::error::AppError;
use crate::indexing::token::ServiceAccountKey;
use crate::models::Account;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct RegisterAccount {
    pub name: String,
    /// Service-account key JSON, stored verbatim.
    pub credentials: serde_json::Value,
    pub daily_quota: Option<i32>,
}

pub async fn create(
    State(state): State<SharedState>,
    Json(req): Json<RegisterAccount>,
) -> Result<Json<Account>, AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::BadRequest("name is required".to_string()));
    }

    let daily_quota = req.daily_quota.unwrap_or(200);
    if daily_quota <= 0 {
        return Err(AppError::BadRequest(
            "daily_quota must be positive".to_string(),
        ));
    }

    let credentials_json = serde_json::to_string(&req.credentials)
        .map_err(|e| AppError::Internal(format!("Failed to serialize credentials: {e}")))?;

    // Parse up front so broken key files are rejected at registration, not
    // at the first token exchange.
    let key = ServiceAccountKey::parse(&credentials_json).map_err(AppError::BadRequest)?;

    let fingerprint = hex::encode(Sha256::digest(credentials_json.as_bytes()));
    if db::accounts::find_by_fingerprint(&state.pool, &fingerprint)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(
            "These credentials are already registered".to_string(),
        ));
    }

    let account = db::accounts::create(
        &state.pool,
        req.name.trim(),
        &key.client_email,
        &credentials_json,
        &fingerprint,
        daily_quota,
    )
    .await?;

    tracing::info!(account_id = %account.id, client_email = %account.client_email, "Account registered");

    Ok(Json(account))
}

pub async fn list(State(state): State<SharedState>) -> Result<Json<Vec<Account>>, AppError> {
    let accounts = db::accounts::list(&state.pool).await?;
    Ok(Json(accounts))
}

pub async fn delete(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let affected = db::accounts::deactivate(&state.pool, id).await?;
    if affected == 0 {
        return Err(AppError::NotFound("Account not found".to_string()));
    }
    Ok(Json(json!({ "message": "Account deactivated" })))
}

/// Manually probe an unhealthy (or any) account's credentials. Rejected
/// while the cooldown is running.
pub async fn probe(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let account = db::accounts::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Account not found".to_string()))?;

    health::probe(
        &state.pool,
        state.tokens.as_ref(),
        state.indexer.as_ref(),
        &account,
        Utc::now(),
    )
    .await?;

    Ok(Json(json!({ "health_status": "healthy" })))
}

pub async fn quota_status(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let account = db::accounts::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Account not found".to_string()))?;

    let usage = quota::load_usage(&state.pool, vec![account], Utc::now())
        .await?
        .pop()
        .ok_or_else(|| AppError::Internal("Usage lookup returned nothing".to_string()))?;

    Ok(Json(json!({
        "account_id": usage.account.id,
        "daily_quota": usage.account.daily_quota,
        "used_today": usage.used_today,
        "remaining": usage.remaining(),
        "recent_count": usage.recent_count,
        "health_status": usage.account.health_status,
    })))
}
