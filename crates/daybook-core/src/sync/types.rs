//! Core types for multi-store synchronization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;
use crate::item::Item;
use crate::recurrence::Exception;

/// Where a record version came from. Priority for deterministic
/// tie-breaks is `Local > Backend > Calendar`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Local,
    Backend,
    Calendar,
}

impl Origin {
    /// Short name used in cursor keys and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Local => "local",
            Origin::Backend => "backend",
            Origin::Calendar => "calendar",
        }
    }
}

/// Syncable payload kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// An event or task, including its recurrence rule if any.
    Item,
    /// A per-occurrence exception (id `<series>@<date>`).
    Exception,
}

/// A record as it travels between stores.
///
/// The payload is carried as JSON; conflict resolution is record-level,
/// never field-level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncableRecord {
    /// Globally unique id (matches the local entity id).
    pub id: String,
    pub kind: RecordKind,
    /// Origin that produced this version.
    pub origin: Origin,
    /// Monotonically increasing logical clock. A version equal to or
    /// lower than the locally-known one is never applied as an update.
    pub version: i64,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete flag; purge happens only after all origins confirm.
    pub deleted: bool,
    /// JSON-serialized payload.
    pub data: serde_json::Value,
}

impl SyncableRecord {
    /// Wrap an item as a local record version.
    pub fn from_item(item: &Item, version: i64) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: item.id.clone(),
            kind: RecordKind::Item,
            origin: Origin::Local,
            version,
            updated_at: item.updated_at,
            deleted: false,
            data: serde_json::to_value(item)?,
        })
    }

    /// Wrap an exception as a local record version.
    pub fn from_exception(exc: &Exception, version: i64) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: exc.record_id(),
            kind: RecordKind::Exception,
            origin: Origin::Local,
            version,
            updated_at: Utc::now(),
            deleted: false,
            data: serde_json::to_value(exc)?,
        })
    }

    /// Decode the payload as an item.
    pub fn to_item(&self) -> Result<Item, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }

    /// Decode the payload as an exception.
    pub fn to_exception(&self) -> Result<Exception, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}

/// Operation recorded in the change journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Create,
    Update,
    Delete,
}

/// A local mutation not yet confirmed by a remote origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingChange {
    /// Journal row id; assigned on append, creation-ordered.
    pub id: i64,
    pub op: ChangeOp,
    pub record_id: String,
    pub kind: RecordKind,
    /// Snapshot of the record at mutation time.
    pub record: SyncableRecord,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
}

/// Conflict resolution policy, uniform per sync session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    #[default]
    NewerWins,
    LocalWins,
    RemoteWins,
}

impl std::str::FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newer-wins" | "newer_wins" | "newer" => Ok(ConflictPolicy::NewerWins),
            "local-wins" | "local_wins" | "local" => Ok(ConflictPolicy::LocalWins),
            "remote-wins" | "remote_wins" | "remote" => Ok(ConflictPolicy::RemoteWins),
            other => Err(format!("unknown conflict policy: {other}")),
        }
    }
}

/// Sync cycle phase for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "phase")]
pub enum SyncPhase {
    Idle,
    Pulling,
    Reconciling,
    Pushing,
    Failed { reason: String },
}

/// Current sync status for one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatus {
    pub target: Origin,
    pub phase: SyncPhase,
    /// Last successful cycle completion.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Journal entries not yet acked by this target.
    pub pending_count: usize,
}

/// Per-entry result of a push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum PushOutcome {
    /// Durably received by the origin.
    Acked { record_id: String },
    /// The origin holds a conflicting version; reconcile and retry.
    Conflict {
        record_id: String,
        current: SyncableRecord,
    },
    /// Transient failure; the entry stays in the journal for retry.
    Failed { record_id: String, message: String },
}

/// A pulled batch of changes plus the cursor to persist after the whole
/// batch is reconciled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulledBatch {
    pub records: Vec<SyncableRecord>,
    pub next_cursor: String,
}

/// Sync error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Sync API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authorization denied")]
    AuthorizationDenied,

    #[error("Authorization not requested")]
    AuthorizationNotRequested,

    #[error("Rate limited")]
    RateLimited,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
