use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Account;

pub async fn create(
    pool: &PgPool,
    name: &str,
    client_email: &str,
    credentials_json: &str,
    credentials_sha256: &str,
    daily_quota: i32,
) -> Result<Account, sqlx::Error> {
    sqlx::query_as::<_, Account>(
        "INSERT INTO accounts (name, client_email, credentials_json, credentials_sha256, daily_quota)
         VALUES ($1, $2, $3, $4, $5) RETURNING *",
    )
    .bind(name)
    .bind(client_email)
    .bind(credentials_json)
    .bind(credentials_sha256)
    .bind(daily_quota)
    .fetch_one(pool)
    .await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_fingerprint(
    pool: &PgPool,
    credentials_sha256: &str,
) -> Result<Option<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE credentials_sha256 = $1")
        .bind(credentials_sha256)
        .fetch_optional(pool)
        .await
}

pub async fn list(pool: &PgPool) -> Result<Vec<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>("SELECT * FROM accounts ORDER BY created_at ASC")
        .fetch_all(pool)
        .await
}

pub async fn list_active(pool: &PgPool) -> Result<Vec<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>(
        "SELECT * FROM accounts WHERE active ORDER BY created_at ASC",
    )
    .fetch_all(pool)
    .await
}

pub async fn deactivate(pool: &PgPool, id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE accounts SET active = FALSE WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// A successful submission (or probe) resets the failure streak.
pub async fn record_success(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE accounts
         SET health_status = 'healthy',
             consecutive_failures = 0,
             last_failure_reason = NULL,
             cooldown_until = NULL,
             last_health_check_at = now()
         WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Increment the failure streak and return the new count.
pub async fn record_failure(
    pool: &PgPool,
    id: Uuid,
    reason: &str,
) -> Result<i32, sqlx::Error> {
    let row: (i32,) = sqlx::query_as(
        "UPDATE accounts
         SET consecutive_failures = consecutive_failures + 1,
             last_failure_reason = $2,
             last_health_check_at = now()
         WHERE id = $1
         RETURNING consecutive_failures",
    )
    .bind(id)
    .bind(reason)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

pub async fn mark_unhealthy(
    pool: &PgPool,
    id: Uuid,
    reason: &str,
    cooldown_until: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE accounts
         SET health_status = 'unhealthy',
             last_failure_reason = $2,
             cooldown_until = $3,
             last_health_check_at = now()
         WHERE id = $1",
    )
    .bind(id)
    .bind(reason)
    .bind(cooldown_until)
    .execute(pool)
    .await?;
    Ok(())
}
