use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One URL awaiting submission.
///
/// Status is one of pending, processing, completed, failed, cancelled.
/// `account_id` is the planned assignment and may be null until dispatch;
/// `next_retry_at` holds the backoff deadline between retry attempts.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct QueueItem {
    pub id: Uuid,
    pub url: String,
    pub page_path: Option<String>,
    pub account_id: Option<Uuid>,
    pub batch_id: Option<Uuid>,
    pub status: String,
    pub scheduled_for: NaiveDate,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}
