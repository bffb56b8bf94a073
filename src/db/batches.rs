use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Batch;

pub async fn create(
    pool: &PgPool,
    name: &str,
    total_urls: i32,
    policy: &str,
) -> Result<Batch, sqlx::Error> {
    sqlx::query_as::<_, Batch>(
        "INSERT INTO batches (name, total_urls, policy)
         VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(name)
    .bind(total_urls)
    .bind(policy)
    .fetch_one(pool)
    .await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Batch>, sqlx::Error> {
    sqlx::query_as::<_, Batch>("SELECT * FROM batches WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list(pool: &PgPool, limit: i64) -> Result<Vec<Batch>, sqlx::Error> {
    sqlx::query_as::<_, Batch>("SELECT * FROM batches ORDER BY created_at DESC LIMIT $1")
        .bind(limit)
        .fetch_all(pool)
        .await
}

pub async fn record_completed_url(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE batches SET completed_urls = completed_urls + 1 WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn record_failed_url(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE batches SET failed_urls = failed_urls + 1 WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Close batches where every URL has reached a terminal state.
pub async fn finalize_done(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE batches
         SET status = 'completed', completed_at = now()
         WHERE status = 'processing'
           AND completed_urls + failed_urls >= total_urls",
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Close batches whose outstanding items were detached or deleted (rebalance
/// commit, clear-pending). The total shrinks to what actually settled.
pub async fn close_orphaned(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE batches b
         SET total_urls = completed_urls + failed_urls,
             status = 'completed', completed_at = now()
         WHERE status = 'processing'
           AND NOT EXISTS (
               SELECT 1 FROM queue_items q
               WHERE q.batch_id = b.id AND q.status IN ('pending', 'processing')
           )",
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Cancel a batch. Only a processing batch can be cancelled; returns the
/// updated row or None if it was already terminal (or missing).
pub async fn cancel(pool: &PgPool, id: Uuid) -> Result<Option<Batch>, sqlx::Error> {
    sqlx::query_as::<_, Batch>(
        "UPDATE batches
         SET status = 'cancelled', completed_at = now()
         WHERE id = $1 AND status = 'processing'
         RETURNING *",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}
