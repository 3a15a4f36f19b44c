//! # Daybook Core Library
//!
//! This library provides the core business logic for the Daybook
//! calendar/tasks manager. It implements a CLI-first philosophy where all
//! operations are available via a standalone CLI binary, with any GUI
//! being a thin layer over the same core library.
//!
//! ## Architecture
//!
//! - **Recurrence**: Pure expansion of recurrence rules into dated
//!   occurrences, with per-occurrence exceptions applied on top
//! - **Sync**: A change journal, record-level conflict resolution, and a
//!   serialized per-target coordinator that keeps the local store, the
//!   remote sync backend, and the external calendar service convergent
//! - **Notify**: Reminder reconciliation against the platform
//!   notification service
//! - **Storage**: SQLite-based record storage and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`recurrence::expand`]: Deterministic occurrence expansion
//! - [`sync::SyncCoordinator`]: Per-target pull/reconcile/push cycles
//! - [`sync::ChangeJournal`]: Durable local outbox
//! - [`notify::NotificationScheduler`]: Reminder diffing and healing
//! - [`storage::Database`]: Record, journal, and cursor persistence

pub mod error;
pub mod events;
pub mod item;
pub mod notify;
pub mod recurrence;
pub mod storage;
pub mod sync;

pub use error::{ConfigError, CoreError, DatabaseError, NotifyError, ValidationError};
pub use events::Event;
pub use item::{Item, ItemKind};
pub use notify::{NotificationScheduler, NotificationService, ScheduledNotification};
pub use recurrence::{Exception, Occurrence, RecurrenceRule};
pub use storage::{Config, Database};
pub use sync::{
    ChangeJournal, ConflictPolicy, Origin, SyncCoordinator, SyncError, SyncPhase, SyncStatus,
};
