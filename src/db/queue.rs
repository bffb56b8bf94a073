use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::QueueItem;

pub async fn enqueue(
    pool: &PgPool,
    url: &str,
    page_path: Option<&str>,
    account_id: Option<Uuid>,
    batch_id: Option<Uuid>,
    scheduled_for: NaiveDate,
) -> Result<QueueItem, sqlx::Error> {
    sqlx::query_as::<_, QueueItem>(
        "INSERT INTO queue_items (url, page_path, account_id, batch_id, scheduled_for)
         VALUES ($1, $2, $3, $4, $5) RETURNING *",
    )
    .bind(url)
    .bind(page_path)
    .bind(account_id)
    .bind(batch_id)
    .bind(scheduled_for)
    .fetch_one(pool)
    .await
}

/// Pending items scheduled for today or earlier whose retry backoff (if any)
/// has elapsed, oldest first.
pub async fn due(
    pool: &PgPool,
    today: NaiveDate,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<QueueItem>, sqlx::Error> {
    sqlx::query_as::<_, QueueItem>(
        "SELECT * FROM queue_items
         WHERE status = 'pending'
           AND scheduled_for <= $1
           AND (next_retry_at IS NULL OR next_retry_at <= $2)
         ORDER BY created_at ASC
         LIMIT $3",
    )
    .bind(today)
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Claim an item for dispatch. Guarded on status so an item cancelled or
/// picked up by a racing invocation is silently skipped.
pub async fn mark_processing(
    pool: &PgPool,
    id: Uuid,
    account_id: Uuid,
) -> Result<Option<QueueItem>, sqlx::Error> {
    sqlx::query_as::<_, QueueItem>(
        "UPDATE queue_items
         SET status = 'processing', account_id = $2, started_at = now()
         WHERE id = $1 AND status = 'pending'
         RETURNING *",
    )
    .bind(id)
    .bind(account_id)
    .fetch_optional(pool)
    .await
}

pub async fn mark_completed(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE queue_items
         SET status = 'completed', next_retry_at = NULL, last_error = NULL,
             completed_at = now()
         WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Terminal failure: no further retries, `next_retry_at` cleared.
pub async fn mark_failed(
    pool: &PgPool,
    id: Uuid,
    attempts: i32,
    error: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE queue_items
         SET status = 'failed', attempts = $2, last_error = $3,
             next_retry_at = NULL, completed_at = now()
         WHERE id = $1",
    )
    .bind(id)
    .bind(attempts)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(())
}

/// Send an item back to pending with a backoff deadline.
pub async fn schedule_retry(
    pool: &PgPool,
    id: Uuid,
    attempts: i32,
    error: &str,
    next_retry_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE queue_items
         SET status = 'pending', attempts = $2, last_error = $3, next_retry_at = $4
         WHERE id = $1",
    )
    .bind(id)
    .bind(attempts)
    .bind(error)
    .bind(next_retry_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Quota exhaustion is a capacity problem, not a URL failure: the item goes
/// back to pending with its assignment cleared and attempts untouched, so
/// the next cycle can pick a different account (or tomorrow's quota).
pub async fn defer_quota_exhausted(
    pool: &PgPool,
    id: Uuid,
    error: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE queue_items
         SET status = 'pending', account_id = NULL, last_error = $2
         WHERE id = $1",
    )
    .bind(id)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(())
}

/// Revert items stuck in `processing` (e.g. after a crash mid-cycle) back to
/// pending once they are older than the staleness cutoff.
pub async fn release_stale(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE queue_items
         SET status = 'pending', started_at = NULL
         WHERE status = 'processing' AND started_at < $1",
    )
    .bind(cutoff)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn list(
    pool: &PgPool,
    status: Option<&str>,
    limit: i64,
) -> Result<Vec<QueueItem>, sqlx::Error> {
    if let Some(status) = status {
        sqlx::query_as::<_, QueueItem>(
            "SELECT * FROM queue_items WHERE status = $1
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(status)
        .bind(limit)
        .fetch_all(pool)
        .await
    } else {
        sqlx::query_as::<_, QueueItem>(
            "SELECT * FROM queue_items ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}

/// The full pending backlog in age order, for rebalance planning.
pub async fn pending_backlog(pool: &PgPool) -> Result<Vec<QueueItem>, sqlx::Error> {
    sqlx::query_as::<_, QueueItem>(
        "SELECT * FROM queue_items WHERE status = 'pending' ORDER BY created_at ASC",
    )
    .fetch_all(pool)
    .await
}

/// Replace an item's assignment and schedule (rebalance commit). Detaches
/// the item from its batch; guarded on status so items that completed since
/// the plan was computed are left alone.
pub async fn reassign(
    pool: &PgPool,
    id: Uuid,
    account_id: Uuid,
    scheduled_for: NaiveDate,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE queue_items
         SET account_id = $2, batch_id = NULL, scheduled_for = $3, next_retry_at = NULL
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .bind(account_id)
    .bind(scheduled_for)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn clear_pending(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM queue_items WHERE status = 'pending'")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn cancel_for_batch(pool: &PgPool, batch_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE queue_items
         SET status = 'cancelled', next_retry_at = NULL, completed_at = now()
         WHERE batch_id = $1 AND status = 'pending'",
    )
    .bind(batch_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn status_counts_for_batch(
    pool: &PgPool,
    batch_id: Uuid,
) -> Result<Vec<(String, i64)>, sqlx::Error> {
    sqlx::query_as(
        "SELECT status, COUNT(*) FROM queue_items WHERE batch_id = $1 GROUP BY status",
    )
    .bind(batch_id)
    .fetch_all(pool)
    .await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<QueueItem>, sqlx::Error> {
    sqlx::query_as::<_, QueueItem>("SELECT * FROM queue_items WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}
