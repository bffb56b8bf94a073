use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use sqlx::PgPool;

use crate::config::Config;
use crate::indexing::{IndexingApi, TokenProvider};

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub tokens: Arc<dyn TokenProvider>,
    pub indexer: Arc<dyn IndexingApi>,
    /// In-process guard against overlapping processing cycles (the
    /// cross-process guard is a Postgres advisory lock).
    pub cycle_lock: tokio::sync::Mutex<()>,
    /// Throttle for outbound submissions; the indexing API expects roughly
    /// one request per second.
    pub submit_limiter: DefaultDirectRateLimiter,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: Config,
        tokens: Arc<dyn TokenProvider>,
        indexer: Arc<dyn IndexingApi>,
    ) -> Self {
        let period = Duration::from_millis(config.submit_delay_ms.max(1));
        let submit_limiter = RateLimiter::direct(
            Quota::with_period(period).expect("submit delay must be non-zero"),
        );
        Self {
            pool,
            config,
            tokens,
            indexer,
            cycle_lock: tokio::sync::Mutex::new(()),
            submit_limiter,
        }
    }
}
