//! External calendar service target.
//!
//! Daybook records ride inside calendar events: the JSON payload goes in
//! the event description and the sync metadata in private extended
//! properties. External edits come back through the same resolver path
//! as backend changes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde_json::json;
use std::sync::RwLock;
use std::time::Duration;

use crate::sync::target::{AuthState, SyncTarget};
use crate::sync::types::{
    Origin, PendingChange, PulledBatch, PushOutcome, RecordKind, SyncError, SyncableRecord,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Summary prefix for calendar event titles.
fn kind_prefix(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Item => "[ITEM]",
        RecordKind::Exception => "[EXCEPTION]",
    }
}

/// Convert a record to the calendar event wire format.
pub fn to_calendar_event(record: &SyncableRecord) -> serde_json::Value {
    let date_str = record.updated_at.format("%Y-%m-%d").to_string();
    let mut event = json!({
        "summary": format!("{} {}", kind_prefix(record.kind), record.id),
        "start": {"date": date_str},
        "end": {"date": date_str},
        "description": record.data.to_string(),
        "extendedProperties": {
            "private": {
                "daybook_kind": record.kind,
                "daybook_id": record.id,
                "daybook_version": record.version.to_string(),
                "daybook_updated": record.updated_at.to_rfc3339(),
            }
        }
    });

    if record.deleted {
        event["status"] = json!("cancelled");
    }

    event
}

/// Parse a calendar event back into a record.
///
/// # Errors
/// Returns an error for events missing daybook metadata (foreign events
/// on the same calendar are the caller's problem to filter).
pub fn parse_calendar_event(event: &serde_json::Value) -> Result<SyncableRecord, SyncError> {
    let props = &event["extendedProperties"]["private"];

    let id = props["daybook_id"]
        .as_str()
        .ok_or(SyncError::Api("Missing daybook_id".into()))?;

    let kind: RecordKind = serde_json::from_value(props["daybook_kind"].clone())
        .map_err(|_| SyncError::Api("Missing or unknown daybook_kind".into()))?;

    let version: i64 = props["daybook_version"]
        .as_str()
        .and_then(|v| v.parse().ok())
        .ok_or(SyncError::Api("Missing daybook_version".into()))?;

    let updated_str = props["daybook_updated"]
        .as_str()
        .ok_or(SyncError::Api("Missing daybook_updated".into()))?;
    let updated_at: DateTime<Utc> = DateTime::parse_from_rfc3339(updated_str)
        .map_err(|e| SyncError::Api(format!("Invalid timestamp: {e}")))?
        .with_timezone(&Utc);

    let data: serde_json::Value =
        serde_json::from_str(event["description"].as_str().unwrap_or("{}"))?;

    let deleted = event["status"].as_str() == Some("cancelled");

    Ok(SyncableRecord {
        id: id.to_string(),
        kind,
        origin: Origin::Calendar,
        version,
        updated_at,
        deleted,
        data,
    })
}

/// External calendar service target.
pub struct CalendarTarget {
    base_url: String,
    token: Option<String>,
    auth: RwLock<AuthState>,
    client: reqwest::Client,
}

impl CalendarTarget {
    pub fn new(base_url: impl Into<String>, token: Option<String>, auth: AuthState) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            auth: RwLock::new(auth),
            client,
        }
    }

    /// Update the authorization state (e.g. after the user re-authorizes).
    pub fn set_auth_state(&self, auth: AuthState) {
        *self.auth.write().unwrap() = auth;
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Events changed since `since`, straight off the wire.
    async fn list_changed_events(
        &self,
        since: Option<&str>,
    ) -> Result<(Vec<serde_json::Value>, String), SyncError> {
        let mut url = format!("{}/events", self.base_url);
        if let Some(since) = since {
            url.push_str("?updatedSince=");
            url.push_str(since);
        }

        let response = self.request(self.client.get(&url)).send().await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(SyncError::RateLimited);
        }
        if response.status() == StatusCode::FORBIDDEN {
            return Err(SyncError::AuthorizationDenied);
        }
        if !response.status().is_success() {
            return Err(SyncError::Api(format!(
                "list returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response.json().await?;
        let items = body["items"].as_array().cloned().unwrap_or_default();
        let synced_at = body["syncedAt"]
            .as_str()
            .map(|s| s.to_string())
            .unwrap_or_else(|| Utc::now().to_rfc3339());
        Ok((items, synced_at))
    }

    /// Upsert one event: PUT to update, falling back to POST on 404.
    async fn upsert_event(&self, event: &serde_json::Value) -> Result<PushResult, SyncError> {
        let event_id = event["extendedProperties"]["private"]["daybook_id"]
            .as_str()
            .ok_or(SyncError::Api("Missing event ID".into()))?;

        let url = format!("{}/events/{}", self.base_url, event_id);
        let response = self.request(self.client.put(&url)).json(event).send().await?;

        match response.status() {
            status if status.is_success() => Ok(PushResult::Acked),
            StatusCode::NOT_FOUND => {
                let url = format!("{}/events", self.base_url);
                let response = self.request(self.client.post(&url)).json(event).send().await?;
                if response.status().is_success() {
                    Ok(PushResult::Acked)
                } else {
                    Ok(PushResult::Failed(format!(
                        "create returned {}",
                        response.status()
                    )))
                }
            }
            StatusCode::CONFLICT => {
                let body: serde_json::Value = response.json().await?;
                match parse_calendar_event(&body) {
                    Ok(current) => Ok(PushResult::Conflict(Box::new(current))),
                    Err(e) => Ok(PushResult::Failed(format!("unparseable conflict: {e}"))),
                }
            }
            StatusCode::FORBIDDEN => Err(SyncError::AuthorizationDenied),
            status => Ok(PushResult::Failed(format!("update returned {status}"))),
        }
    }

    /// Delete one event. A 404 means it is already gone, which is an ack.
    async fn delete_event(&self, record_id: &str) -> Result<PushResult, SyncError> {
        let url = format!("{}/events/{}", self.base_url, record_id);
        let response = self.request(self.client.delete(&url)).send().await?;
        match response.status() {
            status if status.is_success() => Ok(PushResult::Acked),
            StatusCode::NOT_FOUND => Ok(PushResult::Acked),
            StatusCode::FORBIDDEN => Err(SyncError::AuthorizationDenied),
            status => Ok(PushResult::Failed(format!("delete returned {status}"))),
        }
    }
}

enum PushResult {
    Acked,
    Conflict(Box<SyncableRecord>),
    Failed(String),
}

#[async_trait]
impl SyncTarget for CalendarTarget {
    fn origin(&self) -> Origin {
        Origin::Calendar
    }

    fn auth_state(&self) -> AuthState {
        *self.auth.read().unwrap()
    }

    async fn pull(&self, cursor: Option<&str>) -> Result<PulledBatch, SyncError> {
        match self.auth_state() {
            AuthState::Denied => return Err(SyncError::AuthorizationDenied),
            AuthState::NotRequested => return Err(SyncError::AuthorizationNotRequested),
            AuthState::WriteOnly => {
                // Write-only grants cannot read the calendar; pulls are a
                // no-op that leaves the cursor alone.
                return Ok(PulledBatch {
                    records: Vec::new(),
                    next_cursor: cursor.unwrap_or_default().to_string(),
                });
            }
            AuthState::ReadWrite => {}
        }

        let (events, synced_at) = self.list_changed_events(cursor).await?;
        let mut records = Vec::new();
        for event in &events {
            match parse_calendar_event(event) {
                Ok(record) => records.push(record),
                Err(e) => {
                    // Foreign events on the shared calendar are skipped.
                    tracing::debug!(error = %e, "skipping non-daybook calendar event");
                }
            }
        }
        Ok(PulledBatch {
            records,
            next_cursor: synced_at,
        })
    }

    async fn push(&self, batch: &[PendingChange]) -> Result<Vec<PushOutcome>, SyncError> {
        if !self.auth_state().can_push() {
            return Err(SyncError::AuthorizationDenied);
        }

        let mut outcomes = Vec::with_capacity(batch.len());
        for change in batch {
            let result = if change.record.deleted {
                self.delete_event(&change.record_id).await?
            } else {
                self.upsert_event(&to_calendar_event(&change.record)).await?
            };
            outcomes.push(match result {
                PushResult::Acked => PushOutcome::Acked {
                    record_id: change.record_id.clone(),
                },
                PushResult::Conflict(current) => PushOutcome::Conflict {
                    record_id: change.record_id.clone(),
                    current: *current,
                },
                PushResult::Failed(message) => PushOutcome::Failed {
                    record_id: change.record_id.clone(),
                    message,
                },
            });
        }
        Ok(outcomes)
    }
}
