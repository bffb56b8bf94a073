use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{AccessToken, SubmitError, TokenProvider};
use crate::models::Account;

const SCOPE: &str = "https://www.googleapis.com/auth/indexing";

/// The fields of a service-account key file the token exchange needs.
#[derive(Debug, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: String,
}

impl ServiceAccountKey {
    pub fn parse(credentials_json: &str) -> Result<Self, String> {
        serde_json::from_str(credentials_json)
            .map_err(|e| format!("Invalid service account JSON: {e}"))
    }
}

#[derive(Serialize)]
struct GrantClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Exchanges service-account credentials for bearer tokens via the RS256
/// JWT grant, caching per account until shortly before expiry.
pub struct ServiceAccountTokenProvider {
    client: reqwest::Client,
    cache: Mutex<HashMap<Uuid, AccessToken>>,
}

impl ServiceAccountTokenProvider {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build reqwest client"),
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for ServiceAccountTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenProvider for ServiceAccountTokenProvider {
    async fn token(&self, account: &Account) -> Result<AccessToken, SubmitError> {
        let now = Utc::now();

        {
            let cache = self.cache.lock().await;
            if let Some(cached) = cache.get(&account.id) {
                if cached.is_valid(now) {
                    return Ok(cached.clone());
                }
            }
        }

        let key = ServiceAccountKey::parse(&account.credentials_json)
            .map_err(SubmitError::auth)?;

        let claims = GrantClaims {
            iss: &key.client_email,
            scope: SCOPE,
            aud: &key.token_uri,
            iat: now.timestamp(),
            exp: (now + chrono::Duration::minutes(60)).timestamp(),
        };

        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| SubmitError::auth(format!("Invalid private key: {e}")))?;
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
            .map_err(|e| SubmitError::auth(format!("JWT signing failed: {e}")))?;

        let resp = self
            .client
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SubmitError::auth(format!("Token request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(512)
                .collect::<String>();
            return Err(SubmitError::auth(format!(
                "Token exchange rejected (HTTP {status}): {body}"
            )));
        }

        let token_resp: TokenResponse = resp
            .json()
            .await
            .map_err(|e| SubmitError::auth(format!("Invalid token response: {e}")))?;

        let token = AccessToken {
            token: token_resp.access_token,
            expires_at: now + chrono::Duration::seconds(token_resp.expires_in),
        };

        self.cache.lock().await.insert(account.id, token.clone());
        Ok(token)
    }
}
