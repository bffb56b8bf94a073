use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::SubmissionRecord;

pub async fn record(
    pool: &PgPool,
    account_id: Uuid,
    url: &str,
    outcome: &str,
    error: Option<&str>,
) -> Result<SubmissionRecord, sqlx::Error> {
    sqlx::query_as::<_, SubmissionRecord>(
        "INSERT INTO submission_records (account_id, url, outcome, error)
         VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(account_id)
    .bind(url)
    .bind(outcome)
    .bind(error)
    .fetch_one(pool)
    .await
}

/// Attempts made by an account since the given instant. Counts every record
/// regardless of outcome: a failed call still consumed provider capacity.
pub async fn count_since(
    pool: &PgPool,
    account_id: Uuid,
    since: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM submission_records
         WHERE account_id = $1 AND submitted_at >= $2",
    )
    .bind(account_id)
    .bind(since)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

pub async fn list_recent(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<SubmissionRecord>, sqlx::Error> {
    sqlx::query_as::<_, SubmissionRecord>(
        "SELECT * FROM submission_records ORDER BY submitted_at DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}
