//! Derived occurrences and per-occurrence exceptions.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::item::ItemKind;

/// Status of a derived occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceStatus {
    /// Straight from the generator.
    Generated,
    /// A replacement exception substituted its payload.
    Modified,
    /// Cancelled by an exception or by series deletion.
    Cancelled,
}

/// A concrete dated occurrence of a series.
///
/// Occurrences are derived, never created directly by users except via
/// exceptions. `index` is the global sequence index counted from the
/// series anchor, so count-based termination stays correct across
/// arbitrary query windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    pub series_id: String,
    pub index: u32,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub status: OccurrenceStatus,
    /// Back-reference to the owning logical record kind.
    pub kind: ItemKind,
}

impl Occurrence {
    /// Stable identity for notification keying: `<series>#<index>`.
    pub fn occurrence_id(&self) -> String {
        format!("{}#{}", self.series_id, self.index)
    }
}

/// Payload override stored by a replacement exception.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceOverride {
    pub start_at: Option<DateTime<Utc>>,
    pub duration_min: Option<i64>,
    pub title: Option<String>,
    pub notes: Option<String>,
}

/// An override keyed by (series, original occurrence date).
///
/// Always wins over the generator for its date. A cancelled exception
/// suppresses that date permanently for its series; it is destroyed only
/// when the user explicitly resets the occurrence to the series default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exception {
    pub series_id: String,
    pub original_date: NaiveDate,
    pub cancelled: bool,
    #[serde(default)]
    pub replacement: Option<OccurrenceOverride>,
}

impl Exception {
    /// Cancellation exception for one date.
    pub fn cancel(series_id: impl Into<String>, original_date: NaiveDate) -> Self {
        Self {
            series_id: series_id.into(),
            original_date,
            cancelled: true,
            replacement: None,
        }
    }

    /// Replacement exception carrying an override payload.
    pub fn replace(
        series_id: impl Into<String>,
        original_date: NaiveDate,
        replacement: OccurrenceOverride,
    ) -> Self {
        Self {
            series_id: series_id.into(),
            original_date,
            cancelled: false,
            replacement: Some(replacement),
        }
    }

    /// Record id used when an exception travels through sync:
    /// `<series>@<YYYY-MM-DD>`.
    pub fn record_id(&self) -> String {
        format!("{}@{}", self.series_id, self.original_date)
    }
}
