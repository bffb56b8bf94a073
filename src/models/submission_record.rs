use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Immutable log of one submission attempt via one account. Quota usage and
/// recent-usage signals are derived from these rows, never cached.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct SubmissionRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub url: String,
    pub outcome: String,
    pub error: Option<String>,
    pub submitted_at: DateTime<Utc>,
}
