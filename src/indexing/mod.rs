pub mod google;
pub mod mock;
pub mod token;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Account;

/// Failure taxonomy for the submission capability. Classification happens in
/// one place (`classify`) so the retry scheduler can branch on a tag instead
/// of inspecting strings or status codes itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitErrorKind {
    /// Credential or permission problem. Fatal for the attempt; escalates
    /// account health.
    AuthError,
    /// The account is out of daily capacity. Not a failure of the URL.
    QuotaExceeded,
    /// The provider asked us to slow down.
    RateLimit,
    /// Anything else transient (5xx, network, timeouts).
    TemporaryError,
}

#[derive(Debug, Clone)]
pub struct SubmitError {
    pub kind: SubmitErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl SubmitError {
    pub fn new(kind: SubmitErrorKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(SubmitErrorKind::AuthError, None, message)
    }

    pub fn temporary(message: impl Into<String>) -> Self {
        Self::new(SubmitErrorKind::TemporaryError, None, message)
    }
}

impl std::fmt::Display for SubmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{:?} (HTTP {status}): {}", self.kind, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

/// Classify a provider response. 401/403 are credential problems. A
/// resource-exhaustion signal in the body means the daily quota is spent —
/// checked before the 429 branch because the provider reports both daily
/// quota exhaustion and short-term throttling as 429. Everything else
/// non-2xx is transient.
pub fn classify(status: u16, body: &str) -> SubmitErrorKind {
    if status == 401 || status == 403 {
        return SubmitErrorKind::AuthError;
    }
    let lower = body.to_lowercase();
    if lower.contains("resource_exhausted") || lower.contains("quota exceeded") {
        return SubmitErrorKind::QuotaExceeded;
    }
    if status == 429 {
        return SubmitErrorKind::RateLimit;
    }
    SubmitErrorKind::TemporaryError
}

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Usable with a safety margin so a token never expires mid-call.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now + chrono::Duration::seconds(60)
    }
}

/// Exchanges stored account credentials for a short-lived bearer token.
/// Every failure on this path classifies as `auth_error`.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self, account: &Account) -> Result<AccessToken, SubmitError>;
}

/// The indexing HTTP API: publish a URL notification, and a lightweight
/// authenticated call used by health probes.
#[async_trait]
pub trait IndexingApi: Send + Sync {
    async fn submit(&self, token: &str, url: &str) -> Result<(), SubmitError>;
    async fn probe(&self, token: &str) -> Result<(), SubmitError>;
}
