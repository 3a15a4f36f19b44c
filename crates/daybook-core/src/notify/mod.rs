//! Reminder notification scheduling.
//!
//! The desired notification set is derived from current occurrences and
//! reminder offsets, then diffed against what is already scheduled so the
//! platform only ever sees minimal schedule/cancel command lists. The
//! dedup invariant: never two entries for the same (occurrence, offset).

pub mod scheduler;

pub use scheduler::{
    daily_summary_occurrence, desired_notifications, diff, reconcile, NotificationScheduler,
    ReconcileReport, SCHEDULE_HORIZON_DAYS,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NotifyError;

/// A reminder scheduled with the platform notification service.
///
/// Unique per (occurrence_id, offset_min) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledNotification {
    pub occurrence_id: String,
    /// Minutes before the occurrence start; 0 fires at start.
    pub offset_min: i64,
    pub trigger_at: DateTime<Utc>,
    /// Delivery channel identifier.
    pub channel: String,
}

impl ScheduledNotification {
    /// Identity key for dedup and diffing.
    pub fn key(&self) -> (&str, i64) {
        (&self.occurrence_id, self.offset_min)
    }

    /// Id handed to the platform service: `<occurrence>~<offset>`.
    pub fn delivery_id(&self) -> String {
        format!("{}~{}", self.occurrence_id, self.offset_min)
    }
}

/// Payload handed to the platform service alongside a schedule command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub channel: String,
}

/// Minimal command lists produced by a reconcile pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationDiff {
    pub to_schedule: Vec<ScheduledNotification>,
    pub to_cancel: Vec<ScheduledNotification>,
}

impl NotificationDiff {
    pub fn is_empty(&self) -> bool {
        self.to_schedule.is_empty() && self.to_cancel.is_empty()
    }
}

/// Platform notification service seam.
///
/// `list_pending` backs the startup heal pass that recovers from missed
/// cancellations.
pub trait NotificationService: Send + Sync {
    /// Schedule a notification to fire at `trigger_at`.
    fn schedule(
        &self,
        id: &str,
        trigger_at: DateTime<Utc>,
        payload: &NotificationPayload,
    ) -> Result<(), NotifyError>;

    /// Cancel a previously scheduled notification.
    fn cancel(&self, id: &str) -> Result<(), NotifyError>;

    /// Ids of all notifications currently pending with the platform.
    fn list_pending(&self) -> Result<Vec<String>, NotifyError>;
}
