use std::collections::HashMap;

use chrono::{Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::db;
use crate::engine::{health, quota, retry, scoring};
use crate::error::AppError;
use crate::indexing::{SubmitError, SubmitErrorKind};
use crate::state::AppState;

/// Key for the cross-process advisory lock around a processing cycle.
const CYCLE_LOCK_KEY: i64 = 0x1df1_0c5e;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    /// True when another invocation held the processing lock.
    pub skipped: bool,
    /// Stuck `processing` items reverted to pending before the run.
    pub released_stale: u64,
    /// Due items loaded this cycle.
    pub due: usize,
    pub submitted: usize,
    pub retried: usize,
    pub failed: usize,
    /// Items pushed back on quota exhaustion reported by the provider.
    pub deferred: usize,
    /// Items left pending because no account had remaining quota.
    pub exhausted: usize,
    pub finalized_batches: u64,
}

impl CycleReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

/// Run one processing cycle: revert stale items, snapshot account usage,
/// dispatch due items through the scoring/distribution path, record
/// outcomes, and finalize batches. All side effects persist per item, so a
/// crash mid-run leaves a consistent partial state.
pub async fn run_cycle(state: &AppState) -> Result<CycleReport, AppError> {
    let Ok(_guard) = state.cycle_lock.try_lock() else {
        tracing::info!("Processing cycle already running in this process, skipping");
        return Ok(CycleReport::skipped());
    };

    // The advisory lock is connection-scoped, so the acquiring connection
    // must stay checked out until the unlock.
    let mut lock_conn = state.pool.acquire().await.map_err(AppError::Database)?;
    let (locked,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .bind(CYCLE_LOCK_KEY)
        .fetch_one(&mut *lock_conn)
        .await?;
    if !locked {
        tracing::info!("Another invocation holds the processing lock, skipping");
        return Ok(CycleReport::skipped());
    }

    let result = process(state).await;

    if let Err(e) = sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(CYCLE_LOCK_KEY)
        .execute(&mut *lock_conn)
        .await
    {
        tracing::error!("Failed to release processing lock: {e}");
    }

    result
}

async fn process(state: &AppState) -> Result<CycleReport, AppError> {
    let now = Utc::now();
    let today = quota::utc_today(now);
    let mut report = CycleReport::default();

    let cutoff = now - Duration::minutes(state.config.stale_processing_mins);
    report.released_stale = db::queue::release_stale(&state.pool, cutoff).await?;
    if report.released_stale > 0 {
        tracing::warn!(
            count = report.released_stale,
            "Released stale processing items back to pending"
        );
    }

    let accounts: Vec<_> = db::accounts::list_active(&state.pool)
        .await?
        .into_iter()
        .filter(|a| a.is_eligible())
        .collect();
    let mut usages = quota::load_usage(&state.pool, accounts, now).await?;

    let capacity: i64 = usages.iter().map(|u| u.remaining()).sum();
    let due = if capacity > 0 {
        db::queue::due(&state.pool, today, now, capacity).await?
    } else {
        Vec::new()
    };
    report.due = due.len();

    if report.due > 0 {
        tracing::info!(due = report.due, accounts = usages.len(), "Dispatching due items");
    }

    // Per-cycle token cache and per-account (successes, failures, last
    // error) for the whole-pass health rule.
    let mut tokens: HashMap<Uuid, Result<String, SubmitError>> = HashMap::new();
    let mut pass: HashMap<Uuid, (u32, u32, String)> = HashMap::new();

    for item in due {
        // Keep the planned assignment when that account is still eligible
        // with quota; otherwise pick the best-scoring alternative.
        let idx = item
            .account_id
            .and_then(|id| {
                usages
                    .iter()
                    .position(|u| u.account.id == id && u.remaining() > 0)
            })
            .or_else(|| scoring::select_best_idx(&usages));
        let Some(idx) = idx else {
            report.exhausted += 1;
            continue;
        };
        let account_id = usages[idx].account.id;

        let Some(claimed) = db::queue::mark_processing(&state.pool, item.id, account_id).await?
        else {
            // Cancelled, cleared, or claimed by a racing invocation.
            continue;
        };

        if !tokens.contains_key(&account_id) {
            let token = state
                .tokens
                .token(&usages[idx].account)
                .await
                .map(|t| t.token);
            if token.is_err() {
                // A dead credential takes the whole account out of this
                // cycle; other accounts keep processing.
                usages[idx].used_today = usages[idx].limit();
            }
            tokens.insert(account_id, token);
        }

        let outcome = match &tokens[&account_id] {
            Ok(token) => {
                state.submit_limiter.until_ready().await;
                state.indexer.submit(token, &claimed.url).await
            }
            Err(err) => Err(err.clone()),
        };

        match outcome {
            Ok(()) => {
                db::queue::mark_completed(&state.pool, claimed.id).await?;
                db::submissions::record(&state.pool, account_id, &claimed.url, "success", None)
                    .await?;
                if let Some(batch_id) = claimed.batch_id {
                    db::batches::record_completed_url(&state.pool, batch_id).await?;
                }
                health::record_success(&state.pool, account_id).await?;
                usages[idx].used_today += 1;
                pass.entry(account_id).or_default().0 += 1;
                report.submitted += 1;
                tracing::debug!(url = %claimed.url, account_id = %account_id, "URL submitted");
            }
            Err(err) => {
                let message = err.to_string();
                db::submissions::record(
                    &state.pool,
                    account_id,
                    &claimed.url,
                    "failed",
                    Some(&message),
                )
                .await?;
                health::record_failure(
                    &state.pool,
                    account_id,
                    err.kind,
                    &message,
                    now,
                    state.config.health_cooldown_mins,
                )
                .await?;

                if err.kind == SubmitErrorKind::QuotaExceeded {
                    // The provider says this account is spent; stop
                    // assigning to it for the rest of the cycle.
                    usages[idx].used_today = usages[idx].limit();
                } else {
                    usages[idx].used_today += 1;
                    let entry = pass.entry(account_id).or_default();
                    entry.1 += 1;
                    entry.2 = message;
                    // A streak of failures with no successes takes the
                    // account out of the rest of the cycle too.
                    if entry.0 == 0 && entry.1 >= health::FAILURE_THRESHOLD as u32 {
                        usages[idx].used_today = usages[idx].limit();
                    }
                }

                match retry::apply(&state.pool, &claimed, &err, now).await? {
                    retry::Disposition::Terminal { .. } => report.failed += 1,
                    retry::Disposition::Retry { .. } => report.retried += 1,
                    retry::Disposition::Defer => report.deferred += 1,
                }
            }
        }
    }

    // An account whose entire allocation failed this pass is quarantined.
    for (account_id, (successes, failures, last_error)) in &pass {
        if *successes == 0 && *failures > 0 {
            health::quarantine(
                &state.pool,
                *account_id,
                last_error,
                now,
                state.config.health_cooldown_mins,
            )
            .await?;
        }
    }

    report.finalized_batches = db::batches::finalize_done(&state.pool).await?;

    tracing::info!(
        submitted = report.submitted,
        failed = report.failed,
        retried = report.retried,
        deferred = report.deferred,
        exhausted = report.exhausted,
        "Processing cycle finished"
    );

    Ok(report)
}
