//! HTTP client for the remote multi-device sync backend.
//!
//! The backend is an opaque change-feed API: `GET /changes?cursor=...`
//! returns records changed since the cursor, `POST /changes` accepts a
//! batch and answers with a per-entry outcome.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use std::time::Duration;

use crate::sync::target::{AuthState, SyncTarget};
use crate::sync::types::{
    Origin, PendingChange, PulledBatch, PushOutcome, SyncError, SyncableRecord,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote sync backend target.
pub struct BackendTarget {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl BackendTarget {
    /// Create a client for the given base URL.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client,
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl SyncTarget for BackendTarget {
    fn origin(&self) -> Origin {
        Origin::Backend
    }

    fn auth_state(&self) -> AuthState {
        AuthState::ReadWrite
    }

    async fn pull(&self, cursor: Option<&str>) -> Result<PulledBatch, SyncError> {
        let mut url = format!("{}/changes", self.base_url);
        if let Some(cursor) = cursor {
            url.push_str("?cursor=");
            url.push_str(cursor);
        }

        let response = self.request(self.client.get(&url)).send().await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(SyncError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(SyncError::Api(format!(
                "pull returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response.json().await?;
        let next_cursor = body["cursor"]
            .as_str()
            .ok_or_else(|| SyncError::Api("pull response missing cursor".into()))?
            .to_string();

        let mut records: Vec<SyncableRecord> = Vec::new();
        if let Some(items) = body["changes"].as_array() {
            for item in items {
                let mut record: SyncableRecord = serde_json::from_value(item.clone())?;
                // Provenance is ours to assign, not the wire's.
                record.origin = Origin::Backend;
                records.push(record);
            }
        }

        Ok(PulledBatch {
            records,
            next_cursor,
        })
    }

    async fn push(&self, batch: &[PendingChange]) -> Result<Vec<PushOutcome>, SyncError> {
        let url = format!("{}/changes", self.base_url);
        let changes: Vec<serde_json::Value> = batch
            .iter()
            .map(|change| {
                json!({
                    "op": change.op,
                    "record": change.record,
                })
            })
            .collect();

        let response = self
            .request(self.client.post(&url))
            .json(&json!({ "changes": changes }))
            .send()
            .await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(SyncError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(SyncError::Api(format!(
                "push returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response.json().await?;
        let results = body["results"]
            .as_array()
            .ok_or_else(|| SyncError::Api("push response missing results".into()))?;

        let mut outcomes = Vec::with_capacity(results.len());
        for result in results {
            let record_id = result["record_id"]
                .as_str()
                .ok_or_else(|| SyncError::Api("push result missing record_id".into()))?
                .to_string();
            let outcome = match result["status"].as_str() {
                Some("acked") => PushOutcome::Acked { record_id },
                Some("conflict") => {
                    let mut current: SyncableRecord =
                        serde_json::from_value(result["current"].clone())?;
                    current.origin = Origin::Backend;
                    PushOutcome::Conflict { record_id, current }
                }
                other => PushOutcome::Failed {
                    record_id,
                    message: result["message"]
                        .as_str()
                        .unwrap_or(other.unwrap_or("unknown status"))
                        .to_string(),
                },
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}
