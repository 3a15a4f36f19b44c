use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sync::types::{Origin, SyncPhase};

/// Every observable state change in the core produces an Event.
/// The UI subscribes to the feed; the CLI prints them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SyncPhaseChanged {
        target: Origin,
        phase: SyncPhase,
        at: DateTime<Utc>,
    },
    SyncCompleted {
        target: Origin,
        pulled: usize,
        applied: usize,
        pushed: usize,
        at: DateTime<Utc>,
    },
    /// A cycle failed; sync retries after backoff, local edits continue.
    SyncFailed {
        target: Origin,
        reason: String,
        at: DateTime<Utc>,
    },
    /// Entries that exhausted their push retries; never silently dropped.
    PushExhausted {
        target: Origin,
        record_ids: Vec<String>,
        at: DateTime<Utc>,
    },
    NotificationsReconciled {
        scheduled: usize,
        cancelled: usize,
        at: DateTime<Utc>,
    },
    /// The platform refused some notification commands; reminders are
    /// degraded but data edits and sync proceed.
    RemindersDegraded {
        reason: String,
        at: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serde_tagging() {
        let event = Event::SyncFailed {
            target: Origin::Backend,
            reason: "timeout".to_string(),
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "SyncFailed");
        assert_eq!(json["target"], "backend");
    }
}
