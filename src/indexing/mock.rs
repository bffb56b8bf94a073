//! Scripted test doubles for the token and submission capabilities. Used by
//! the integration tests; kept in the library so external test crates can
//! wire them into `build_app`.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::{AccessToken, IndexingApi, SubmitError, TokenProvider};
use crate::models::Account;

/// Hands out a fixed token for every account. Set `fail` to script
/// token-acquisition failures (always classified auth_error).
pub struct StaticTokenProvider {
    pub fail: bool,
}

impl StaticTokenProvider {
    pub fn new() -> Self {
        Self { fail: false }
    }

    pub fn failing() -> Self {
        Self { fail: true }
    }
}

impl Default for StaticTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self, account: &Account) -> Result<AccessToken, SubmitError> {
        if self.fail {
            return Err(SubmitError::auth(format!(
                "no credentials for {}",
                account.client_email
            )));
        }
        Ok(AccessToken {
            token: "test-token".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        })
    }
}

/// Replays a scripted queue of submit outcomes in order, then defaults to
/// success. Records every submitted URL for assertions.
pub struct MockIndexingApi {
    responses: Mutex<VecDeque<Result<(), SubmitError>>>,
    calls: Mutex<Vec<String>>,
    probe_result: Mutex<Option<SubmitError>>,
}

impl MockIndexingApi {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            probe_result: Mutex::new(None),
        }
    }

    pub fn push_response(&self, response: Result<(), SubmitError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn push_responses(&self, n: usize, make: impl Fn() -> Result<(), SubmitError>) {
        for _ in 0..n {
            self.push_response(make());
        }
    }

    pub fn set_probe_failure(&self, error: Option<SubmitError>) {
        *self.probe_result.lock().unwrap() = error;
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn submitted_urls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockIndexingApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IndexingApi for MockIndexingApi {
    async fn submit(&self, _token: &str, url: &str) -> Result<(), SubmitError> {
        self.calls.lock().unwrap().push(url.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn probe(&self, _token: &str) -> Result<(), SubmitError> {
        match self.probe_result.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
