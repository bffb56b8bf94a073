use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use crate::db;
use crate::indexing::{SubmitError, SubmitErrorKind};
use crate::models::QueueItem;

/// Hard cap on attempts per URL; after the third failed attempt an item is
/// terminally failed and never dispatched again.
pub const MAX_ATTEMPTS: i32 = 3;

/// Backoff ladder between retryable failures.
pub fn backoff_for(attempt: i32) -> Duration {
    match attempt {
        1 => Duration::hours(1),
        2 => Duration::hours(6),
        _ => Duration::hours(24),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// No more retries; item is failed for good.
    Terminal { attempts: i32 },
    /// Retry after backoff.
    Retry {
        attempts: i32,
        next_retry_at: DateTime<Utc>,
    },
    /// Quota exhaustion: keep the item pending with attempts untouched and
    /// the account assignment cleared, so another account (or tomorrow's
    /// quota) can take it.
    Defer,
}

/// Decide what happens to an item after a failed submission. Pure; the
/// persistence happens in [`apply`].
pub fn decide(kind: SubmitErrorKind, current_attempts: i32, now: DateTime<Utc>) -> Disposition {
    match kind {
        SubmitErrorKind::AuthError => Disposition::Terminal {
            attempts: current_attempts + 1,
        },
        SubmitErrorKind::QuotaExceeded => Disposition::Defer,
        SubmitErrorKind::RateLimit | SubmitErrorKind::TemporaryError => {
            let attempts = current_attempts + 1;
            if attempts >= MAX_ATTEMPTS {
                Disposition::Terminal { attempts }
            } else {
                Disposition::Retry {
                    attempts,
                    next_retry_at: now + backoff_for(attempts),
                }
            }
        }
    }
}

/// Persist the disposition for a failed item, keeping the owning batch's
/// failure counter in step for terminal outcomes.
pub async fn apply(
    pool: &PgPool,
    item: &QueueItem,
    err: &SubmitError,
    now: DateTime<Utc>,
) -> Result<Disposition, sqlx::Error> {
    let message = err.to_string();
    let disposition = decide(err.kind, item.attempts, now);

    match &disposition {
        Disposition::Terminal { attempts } => {
            db::queue::mark_failed(pool, item.id, *attempts, &message).await?;
            if let Some(batch_id) = item.batch_id {
                db::batches::record_failed_url(pool, batch_id).await?;
            }
            tracing::warn!(item_id = %item.id, url = %item.url, attempts, "Item failed terminally: {message}");
        }
        Disposition::Retry {
            attempts,
            next_retry_at,
        } => {
            db::queue::schedule_retry(pool, item.id, *attempts, &message, *next_retry_at).await?;
            tracing::debug!(
                item_id = %item.id,
                attempts,
                next_retry_at = %next_retry_at,
                "Item scheduled for retry"
            );
        }
        Disposition::Defer => {
            db::queue::defer_quota_exhausted(pool, item.id, &message).await?;
            tracing::debug!(item_id = %item.id, "Item deferred on quota exhaustion");
        }
    }

    Ok(disposition)
}
