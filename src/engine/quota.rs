use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::PgPool;

use crate::db;
use crate::models::Account;

/// Window for the recent-usage signal fed into scoring.
const RECENT_WINDOW_MINS: i64 = 60;

/// An account with its usage counters for one planning pass. Loaded once
/// per pass; remaining quota is derived, never cached across passes.
#[derive(Debug, Clone)]
pub struct AccountUsage {
    pub account: Account,
    pub used_today: i64,
    pub recent_count: i64,
}

impl AccountUsage {
    pub fn remaining(&self) -> i64 {
        (i64::from(self.account.daily_quota) - self.used_today).max(0)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.account.daily_quota)
    }
}

/// UTC midnight of the day containing `now`. The quota day boundary is UTC
/// everywhere so counts and schedules agree regardless of server locale.
pub fn utc_day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc()
}

pub fn utc_today(now: DateTime<Utc>) -> NaiveDate {
    now.date_naive()
}

/// Load usage counters for a set of accounts from submission history.
pub async fn load_usage(
    pool: &PgPool,
    accounts: Vec<Account>,
    now: DateTime<Utc>,
) -> Result<Vec<AccountUsage>, sqlx::Error> {
    let day_start = utc_day_start(now);
    let recent_start = now - Duration::minutes(RECENT_WINDOW_MINS);

    let mut usages = Vec::with_capacity(accounts.len());
    for account in accounts {
        let used_today = db::submissions::count_since(pool, account.id, day_start).await?;
        let recent_count = db::submissions::count_since(pool, account.id, recent_start).await?;
        usages.push(AccountUsage {
            account,
            used_today,
            recent_count,
        });
    }
    Ok(usages)
}

#[cfg(test)]
pub(crate) fn usage_fixture(daily_quota: i32, used_today: i64, recent_count: i64) -> AccountUsage {
    use uuid::Uuid;

    AccountUsage {
        account: Account {
            id: Uuid::now_v7(),
            name: "test".to_string(),
            client_email: "test@example.iam.gserviceaccount.com".to_string(),
            credentials_json: String::new(),
            credentials_sha256: String::new(),
            daily_quota,
            health_status: "healthy".to_string(),
            consecutive_failures: 0,
            last_failure_reason: None,
            last_health_check_at: None,
            cooldown_until: None,
            active: true,
            created_at: Utc::now(),
        },
        used_today,
        recent_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_never_negative() {
        let usage = usage_fixture(200, 250, 0);
        assert_eq!(usage.remaining(), 0);
    }

    #[test]
    fn remaining_is_full_limit_with_no_history() {
        let usage = usage_fixture(200, 0, 0);
        assert_eq!(usage.remaining(), 200);
    }

    #[test]
    fn day_start_is_utc_midnight() {
        let now = "2026-08-08T17:45:12Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(
            utc_day_start(now),
            "2026-08-08T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }
}
