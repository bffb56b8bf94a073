use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::distribute::{self, Policy, Projection};
use super::quota::{self, AccountUsage};
use crate::db;
use crate::error::AppError;
use crate::models::QueueItem;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedItem {
    pub item_id: Uuid,
    pub url: String,
    pub account_id: Uuid,
    pub scheduled_for: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct RebalancePlan {
    pub total_pending: usize,
    pub projection: Projection,
    pub items: Vec<PlannedItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RebalanceSummary {
    pub reassigned: u64,
    pub closed_batches: u64,
}

/// Compute an even-policy redistribution of the pending backlog across the
/// given accounts, spilling into later days as capacity runs out. Day 0
/// works with remaining quota, later days with full limits. Pure: calling
/// it twice over unchanged inputs yields an identical plan.
pub fn plan(backlog: &[QueueItem], usages: &[AccountUsage], today: NaiveDate) -> RebalancePlan {
    let projection = distribute::project(backlog.len() as i64, usages, today, Policy::Even);

    let mut items = Vec::with_capacity(backlog.len());
    let sum_limits: i64 = usages.iter().map(|u| u.limit()).sum();

    if !usages.is_empty() && sum_limits > 0 {
        let mut day_offset: u64 = 0;
        let mut caps: Vec<i64> = usages.iter().map(|u| u.remaining()).collect();
        let mut cursor = 0usize;

        for item in backlog {
            // Find the next account with capacity today, rolling over to the
            // next day (full limits) when the current day is spent.
            loop {
                if caps.iter().all(|&c| c <= 0) {
                    day_offset += 1;
                    caps = usages.iter().map(|u| u.limit()).collect();
                    cursor = 0;
                    continue;
                }
                if caps[cursor] > 0 {
                    break;
                }
                cursor = (cursor + 1) % caps.len();
            }

            caps[cursor] -= 1;
            items.push(PlannedItem {
                item_id: item.id,
                url: item.url.clone(),
                account_id: usages[cursor].account.id,
                scheduled_for: today + chrono::Days::new(day_offset),
            });
            cursor = (cursor + 1) % caps.len();
        }
    }

    RebalancePlan {
        total_pending: backlog.len(),
        projection,
        items,
    }
}

async fn load_inputs(pool: &PgPool) -> Result<(Vec<QueueItem>, Vec<AccountUsage>), AppError> {
    let now = Utc::now();
    let backlog = db::queue::pending_backlog(pool).await?;
    let accounts: Vec<_> = db::accounts::list_active(pool)
        .await?
        .into_iter()
        .filter(|a| a.is_eligible())
        .collect();
    let usages = quota::load_usage(pool, accounts, now).await?;
    Ok((backlog, usages))
}

/// Read-only projection of a full redistribution. Re-running it with an
/// unchanged backlog and account state yields an identical plan.
pub async fn preview(pool: &PgPool) -> Result<RebalancePlan, AppError> {
    let (backlog, usages) = load_inputs(pool).await?;
    Ok(plan(&backlog, &usages, quota::utc_today(Utc::now())))
}

/// Recompute the plan fresh and apply it: every pending item loses its
/// current batch/account assignment and gets the even-policy one. This is
/// destructive and non-incremental; callers must treat it as irreversible.
pub async fn commit(pool: &PgPool) -> Result<RebalanceSummary, AppError> {
    let (backlog, usages) = load_inputs(pool).await?;
    let plan = plan(&backlog, &usages, quota::utc_today(Utc::now()));

    if plan.items.is_empty() && !backlog.is_empty() {
        return Err(AppError::BadRequest(
            "No eligible accounts with quota to rebalance onto".to_string(),
        ));
    }

    let mut reassigned = 0u64;
    for item in &plan.items {
        reassigned +=
            db::queue::reassign(pool, item.item_id, item.account_id, item.scheduled_for).await?;
    }

    // Batches whose pending items were detached have nothing left to wait
    // for; shrink their totals to what actually settled and close them.
    let closed_batches = db::batches::close_orphaned(pool).await?;

    tracing::info!(reassigned, closed_batches, "Rebalance committed");

    Ok(RebalanceSummary {
        reassigned,
        closed_batches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::quota::usage_fixture;
    use chrono::{DateTime, Utc};

    fn item(url: &str) -> QueueItem {
        let created: DateTime<Utc> = "2026-08-08T10:00:00Z".parse().unwrap();
        QueueItem {
            id: Uuid::now_v7(),
            url: url.to_string(),
            page_path: None,
            account_id: None,
            batch_id: None,
            status: "pending".to_string(),
            scheduled_for: created.date_naive(),
            attempts: 0,
            last_error: None,
            next_retry_at: None,
            created_at: created,
            started_at: None,
            completed_at: None,
        }
    }

    fn backlog(n: usize) -> Vec<QueueItem> {
        (0..n).map(|i| item(&format!("https://example.com/p{i}"))).collect()
    }

    fn today() -> NaiveDate {
        "2026-08-08".parse().unwrap()
    }

    #[test]
    fn plan_covers_every_item() {
        let usages = vec![usage_fixture(200, 0, 0), usage_fixture(100, 0, 0)];
        let backlog = backlog(250);
        let plan = plan(&backlog, &usages, today());
        assert_eq!(plan.items.len(), 250);
        assert_eq!(plan.total_pending, 250);
    }

    #[test]
    fn plan_round_robins_evenly() {
        let usages = vec![usage_fixture(200, 0, 0), usage_fixture(200, 0, 0)];
        let backlog = backlog(10);
        let plan = plan(&backlog, &usages, today());

        let first: Vec<_> = plan
            .items
            .iter()
            .filter(|i| i.account_id == usages[0].account.id)
            .collect();
        assert_eq!(first.len(), 5);
    }

    #[test]
    fn plan_spills_into_later_days() {
        // 5 remaining today on a 10/day account; 12 items span 3 calendar days.
        let usages = vec![usage_fixture(10, 5, 0)];
        let backlog = backlog(12);
        let plan = plan(&backlog, &usages, today());

        let day0 = plan.items.iter().filter(|i| i.scheduled_for == today()).count();
        let day1 = plan
            .items
            .iter()
            .filter(|i| i.scheduled_for == today() + chrono::Days::new(1))
            .count();
        let day2 = plan
            .items
            .iter()
            .filter(|i| i.scheduled_for == today() + chrono::Days::new(2))
            .count();
        assert_eq!((day0, day1, day2), (5usize, 10usize, 2usize));
    }

    #[test]
    fn plan_is_idempotent_for_unchanged_state() {
        let usages = vec![usage_fixture(200, 30, 2), usage_fixture(150, 0, 0)];
        let backlog = backlog(80);

        let a = plan(&backlog, &usages, today());
        let b = plan(&backlog, &usages, today());
        assert_eq!(a.items, b.items);
    }

    #[test]
    fn plan_without_accounts_is_empty() {
        let backlog = backlog(4);
        let plan = plan(&backlog, &[], today());
        assert!(plan.items.is_empty());
        assert_eq!(plan.total_pending, 4);
    }
}
