use async_trait::async_trait;
use serde_json::json;

use super::{classify, IndexingApi, SubmitError};

const PUBLISH_URL: &str = "https://indexing.googleapis.com/v3/urlNotifications:publish";
const METADATA_URL: &str = "https://indexing.googleapis.com/v3/urlNotifications/metadata";

/// Google Indexing API client. Submits URL_UPDATED notifications; the probe
/// is a metadata lookup that only needs working credentials.
pub struct GoogleIndexingApi {
    client: reqwest::Client,
}

impl GoogleIndexingApi {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build reqwest client"),
        }
    }
}

impl Default for GoogleIndexingApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IndexingApi for GoogleIndexingApi {
    async fn submit(&self, token: &str, url: &str) -> Result<(), SubmitError> {
        let resp = self
            .client
            .post(PUBLISH_URL)
            .bearer_auth(token)
            .json(&json!({ "url": url, "type": "URL_UPDATED" }))
            .send()
            .await
            .map_err(|e| SubmitError::temporary(format!("Publish request failed: {e}")))?;

        let status = resp.status().as_u16();
        if resp.status().is_success() {
            return Ok(());
        }

        let body = resp
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(1024)
            .collect::<String>();

        Err(SubmitError::new(classify(status, &body), Some(status), body))
    }

    async fn probe(&self, token: &str) -> Result<(), SubmitError> {
        let resp = self
            .client
            .get(METADATA_URL)
            .bearer_auth(token)
            .query(&[("url", "https://example.com/")])
            .send()
            .await
            .map_err(|e| SubmitError::temporary(format!("Probe request failed: {e}")))?;

        let status = resp.status().as_u16();
        // 404 means "never notified about this URL" — the credentials work,
        // which is all the probe cares about.
        if resp.status().is_success() || status == 404 {
            return Ok(());
        }

        let body = resp
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(1024)
            .collect::<String>();

        Err(SubmitError::new(classify(status, &body), Some(status), body))
    }
}
