use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A named group of queue items submitted together.
///
/// Becomes `completed` exactly when completed_urls + failed_urls reaches
/// total_urls.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Batch {
    pub id: Uuid,
    pub name: String,
    pub total_urls: i32,
    pub completed_urls: i32,
    pub failed_urls: i32,
    pub status: String,
    pub policy: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
