//! Logical records: events and tasks.
//!
//! An item carrying a recurrence rule is a series; its id doubles as the
//! series id shared by every occurrence expanded from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::recurrence::RecurrenceRule;

/// Kind of logical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// Calendar event with a start and duration.
    Event,
    /// Completable task; completion cancels its reminders.
    Task,
}

/// An event or task as the user sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub kind: ItemKind,
    pub title: String,
    #[serde(default)]
    pub notes: Option<String>,
    /// Start instant; the series anchor when `rule` is set.
    pub start_at: DateTime<Utc>,
    pub duration_min: i64,
    /// Recurrence rule. Immutable once attached; replacing it starts a
    /// new expansion.
    #[serde(default)]
    pub rule: Option<RecurrenceRule>,
    /// Reminder offsets in minutes before each occurrence start.
    #[serde(default)]
    pub reminder_offsets_min: Vec<i64>,
    /// Completion instant, tasks only.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// New one-off event.
    pub fn new_event(title: impl Into<String>, start_at: DateTime<Utc>, duration_min: i64) -> Self {
        Self::new(ItemKind::Event, title, start_at, duration_min)
    }

    /// New task.
    pub fn new_task(title: impl Into<String>, start_at: DateTime<Utc>, duration_min: i64) -> Self {
        Self::new(ItemKind::Task, title, start_at, duration_min)
    }

    fn new(
        kind: ItemKind,
        title: impl Into<String>,
        start_at: DateTime<Utc>,
        duration_min: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            title: title.into(),
            notes: None,
            start_at,
            duration_min,
            rule: None,
            reminder_offsets_min: Vec::new(),
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this item generates occurrences beyond its own start.
    pub fn is_series(&self) -> bool {
        self.rule.is_some()
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Toggle task completion, returning the new completed state.
    ///
    /// # Errors
    /// Events are not completable.
    pub fn toggle_completion(&mut self, now: DateTime<Utc>) -> Result<bool, ValidationError> {
        if self.kind != ItemKind::Task {
            return Err(ValidationError::InvalidValue {
                field: "kind".to_string(),
                message: "only tasks can be completed".to_string(),
            });
        }
        self.completed_at = match self.completed_at {
            Some(_) => None,
            None => Some(now),
        };
        self.updated_at = now;
        Ok(self.completed_at.is_some())
    }

    /// Validate the item before it is saved.
    ///
    /// # Errors
    /// Rejects non-positive durations and malformed recurrence rules, so
    /// bad rules never reach the expander.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.duration_min <= 0 {
            return Err(ValidationError::InvalidValue {
                field: "duration_min".to_string(),
                message: format!("must be positive (got {})", self.duration_min),
            });
        }
        if let Some(rule) = &self.rule {
            rule.validate(self.start_at.date_naive())?;
        }
        Ok(())
    }
}
