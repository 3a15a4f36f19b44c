//! Multi-store synchronization layer.
//!
//! Keeps the local store, the remote sync backend, and the external
//! calendar service convergent. Both remote integrations implement the
//! same [`SyncTarget`] trait and share one coordinator/resolver path.

pub mod backend;
pub mod calendar;
pub mod conflict;
pub mod coordinator;
pub mod journal;
pub mod target;
pub mod types;

#[cfg(test)]
mod coordinator_tests;

pub use backend::BackendTarget;
pub use calendar::CalendarTarget;
pub use conflict::{resolve, Resolution};
pub use coordinator::{backoff_delay, CycleReport, SyncCoordinator};
pub use journal::ChangeJournal;
pub use target::{AuthState, SyncTarget};
pub use types::{
    ChangeOp, ConflictPolicy, Origin, PendingChange, PulledBatch, PushOutcome, RecordKind,
    SyncError, SyncPhase, SyncStatus, SyncableRecord,
};
