use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use crate::db;
use crate::error::AppError;
use crate::indexing::{IndexingApi, SubmitErrorKind, TokenProvider};
use crate::models::Account;

/// Consecutive failures before an account is quarantined.
pub const FAILURE_THRESHOLD: i32 = 5;

pub fn should_quarantine(consecutive_failures: i32) -> bool {
    consecutive_failures >= FAILURE_THRESHOLD
}

/// A successful submission makes the account healthy and resets its streak.
pub async fn record_success(pool: &PgPool, account_id: uuid::Uuid) -> Result<(), sqlx::Error> {
    db::accounts::record_success(pool, account_id).await
}

/// Record a submission failure. Quota exhaustion is a capacity signal, not
/// an account defect, so it never touches the streak. Crossing the
/// consecutive-failure threshold quarantines the account.
pub async fn record_failure(
    pool: &PgPool,
    account_id: uuid::Uuid,
    kind: SubmitErrorKind,
    reason: &str,
    now: DateTime<Utc>,
    cooldown_mins: i64,
) -> Result<(), sqlx::Error> {
    if kind == SubmitErrorKind::QuotaExceeded {
        return Ok(());
    }

    let failures = db::accounts::record_failure(pool, account_id, reason).await?;
    if should_quarantine(failures) {
        tracing::warn!(
            account_id = %account_id,
            failures,
            "Account crossed failure threshold, marking unhealthy"
        );
        db::accounts::mark_unhealthy(pool, account_id, reason, now + Duration::minutes(cooldown_mins))
            .await?;
    }
    Ok(())
}

/// Quarantine an account whose entire allocation failed in one processing
/// pass, regardless of where its streak stands.
pub async fn quarantine(
    pool: &PgPool,
    account_id: uuid::Uuid,
    reason: &str,
    now: DateTime<Utc>,
    cooldown_mins: i64,
) -> Result<(), sqlx::Error> {
    tracing::warn!(account_id = %account_id, reason, "Quarantining account");
    db::accounts::mark_unhealthy(pool, account_id, reason, now + Duration::minutes(cooldown_mins))
        .await
}

/// Probe an account's credentials with one lightweight authenticated call.
/// Rejected while the cooldown is still running; a successful probe returns
/// the account to healthy.
pub async fn probe(
    pool: &PgPool,
    tokens: &dyn TokenProvider,
    indexer: &dyn IndexingApi,
    account: &Account,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if account.health_status == "unhealthy" {
        if let Some(cooldown_until) = account.cooldown_until {
            if now < cooldown_until {
                return Err(AppError::Conflict(format!(
                    "Account is cooling down until {cooldown_until}"
                )));
            }
        }
    }

    let result = async {
        let token = tokens.token(account).await?;
        indexer.probe(&token.token).await
    }
    .await;

    match result {
        Ok(()) => {
            db::accounts::record_success(pool, account.id).await?;
            Ok(())
        }
        Err(err) => {
            let message = err.to_string();
            db::accounts::record_failure(pool, account.id, &message).await?;
            Err(AppError::BadRequest(format!("Health probe failed: {message}")))
        }
    }
}
