//! Durable change journal (local outbox).
//!
//! Every local mutation lands here, in the same transaction as the
//! record write, before the edit is considered saved. Entries leave the
//! journal only when every configured sync target has confirmed durable
//! receipt.

use std::sync::{Arc, Mutex};

use crate::error::DatabaseError;
use crate::storage::Database;
use crate::sync::types::{ChangeOp, Origin, PendingChange, SyncableRecord};

/// Write-ahead journal over the shared store.
#[derive(Clone)]
pub struct ChangeJournal {
    db: Arc<Mutex<Database>>,
}

impl ChangeJournal {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    /// Append a change, committing the record write and the journal row
    /// together. A failed append fails the whole mutation.
    ///
    /// # Errors
    /// `DatabaseError::JournalAppendFailed` if the journal row cannot be
    /// written durably.
    pub fn append(
        &self,
        record: &SyncableRecord,
        op: ChangeOp,
    ) -> Result<PendingChange, DatabaseError> {
        self.db.lock().unwrap().commit_local_change(record, op)
    }

    /// Up to `max` changes not yet acked by `target`, in creation order.
    pub fn pending_batch(
        &self,
        target: Origin,
        max: usize,
    ) -> Result<Vec<PendingChange>, DatabaseError> {
        self.db.lock().unwrap().journal_pending(target, max)
    }

    /// Mark entries durably received by `target`.
    pub fn ack(&self, target: Origin, ids: &[i64]) -> Result<(), DatabaseError> {
        self.db.lock().unwrap().journal_ack(target, ids)
    }

    /// Bump retry counts for entries that failed to push.
    pub fn requeue(&self, ids: &[i64]) -> Result<(), DatabaseError> {
        self.db.lock().unwrap().journal_requeue(ids)
    }

    /// Drop entries acked by every origin in `required`.
    pub fn gc(&self, required: &[Origin]) -> Result<usize, DatabaseError> {
        self.db.lock().unwrap().journal_gc(required)
    }

    pub fn pending_count(&self, target: Origin) -> Result<usize, DatabaseError> {
        self.db.lock().unwrap().journal_pending_count(target)
    }
}
