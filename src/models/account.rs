use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A credentialed indexing identity with its own daily submission quota.
///
/// Health fields are mutated only by the health tracker; accounts are
/// deactivated rather than deleted so submission history stays attributable.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub client_email: String,
    #[serde(skip_serializing)]
    pub credentials_json: String,
    #[serde(skip_serializing)]
    pub credentials_sha256: String,
    pub daily_quota: i32,
    pub health_status: String,
    pub consecutive_failures: i32,
    pub last_failure_reason: Option<String>,
    pub last_health_check_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Whether this account may participate in scoring and distribution.
    /// `unknown` health is eligible; only `unhealthy` accounts sit out.
    pub fn is_eligible(&self) -> bool {
        self.active && self.health_status != "unhealthy"
    }
}
