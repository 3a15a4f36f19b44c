//! SQLite-based storage for records, the change journal, scheduled
//! notifications, and per-target sync cursors.
//!
//! All multi-record writes go through transactions: a reconciliation
//! batch either fully commits (records + cursor + corrective changes) or
//! fully rolls back, so partial application is never observable.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use super::data_dir;
use super::migrations;
use crate::error::DatabaseError;
use crate::item::Item;
use crate::notify::ScheduledNotification;
use crate::recurrence::Exception;
use crate::sync::types::{ChangeOp, Origin, PendingChange, RecordKind, SyncableRecord};

// === Helper Functions ===

/// Parse record kind from database string
fn parse_record_kind(kind_str: &str) -> RecordKind {
    match kind_str {
        "exception" => RecordKind::Exception,
        _ => RecordKind::Item,
    }
}

/// Format record kind for database storage
fn format_record_kind(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Item => "item",
        RecordKind::Exception => "exception",
    }
}

/// Parse origin from database string
fn parse_origin(origin_str: &str) -> Origin {
    match origin_str {
        "backend" => Origin::Backend,
        "calendar" => Origin::Calendar,
        _ => Origin::Local,
    }
}

/// Parse change op from database string
fn parse_change_op(op_str: &str) -> ChangeOp {
    match op_str {
        "create" => ChangeOp::Create,
        "delete" => ChangeOp::Delete,
        _ => ChangeOp::Update,
    }
}

/// Format change op for database storage
fn format_change_op(op: ChangeOp) -> &'static str {
    match op {
        ChangeOp::Create => "create",
        ChangeOp::Update => "update",
        ChangeOp::Delete => "delete",
    }
}

/// Parse datetime from RFC3339 string with fallback to current time
fn parse_datetime_fallback(dt_str: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Journal/record ack column for a sync target.
fn ack_column(target: Origin) -> Result<&'static str, DatabaseError> {
    match target {
        Origin::Backend => Ok("acked_backend"),
        Origin::Calendar => Ok("acked_calendar"),
        Origin::Local => Err(DatabaseError::QueryFailed(
            "local is not a sync target".to_string(),
        )),
    }
}

fn del_ack_column(target: Origin) -> Result<&'static str, DatabaseError> {
    match target {
        Origin::Backend => Ok("del_acked_backend"),
        Origin::Calendar => Ok("del_acked_calendar"),
        Origin::Local => Err(DatabaseError::QueryFailed(
            "local is not a sync target".to_string(),
        )),
    }
}

fn row_to_record(row: &rusqlite::Row) -> Result<SyncableRecord, rusqlite::Error> {
    let kind_str: String = row.get(1)?;
    let origin_str: String = row.get(2)?;
    let updated_str: String = row.get(4)?;
    let data_str: String = row.get(6)?;
    Ok(SyncableRecord {
        id: row.get(0)?,
        kind: parse_record_kind(&kind_str),
        origin: parse_origin(&origin_str),
        version: row.get(3)?,
        updated_at: parse_datetime_fallback(&updated_str),
        deleted: row.get::<_, i64>(5)? != 0,
        data: serde_json::from_str(&data_str).unwrap_or(serde_json::Value::Null),
    })
}

fn row_to_pending(row: &rusqlite::Row) -> Result<PendingChange, rusqlite::Error> {
    let op_str: String = row.get(1)?;
    let kind_str: String = row.get(3)?;
    let record_str: String = row.get(4)?;
    let created_str: String = row.get(5)?;
    let record: SyncableRecord =
        serde_json::from_str(&record_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;
    Ok(PendingChange {
        id: row.get(0)?,
        op: parse_change_op(&op_str),
        record_id: row.get(2)?,
        kind: parse_record_kind(&kind_str),
        record,
        created_at: parse_datetime_fallback(&created_str),
        retry_count: row.get(6)?,
    })
}

/// A change enqueued during reconciliation to propagate a resolution
/// winner to the origins that lost.
#[derive(Debug, Clone)]
pub struct CorrectiveChange {
    pub op: ChangeOp,
    pub record: SyncableRecord,
    /// Origins that must receive the winner; the rest are pre-acked.
    pub repush: Vec<Origin>,
}

/// SQLite database for daybook state.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `~/.config/daybook/daybook.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let path = data_dir()?.join("daybook.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open a database at a specific path (tests, alternate data dirs).
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|e| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::from)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS records (
                    id                 TEXT PRIMARY KEY,
                    kind               TEXT NOT NULL,
                    origin             TEXT NOT NULL,
                    version            INTEGER NOT NULL,
                    updated_at         TEXT NOT NULL,
                    deleted            INTEGER NOT NULL DEFAULT 0,
                    data               TEXT NOT NULL,
                    del_acked_backend  INTEGER NOT NULL DEFAULT 0,
                    del_acked_calendar INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS pending_changes (
                    id             INTEGER PRIMARY KEY AUTOINCREMENT,
                    op             TEXT NOT NULL,
                    record_id      TEXT NOT NULL,
                    kind           TEXT NOT NULL,
                    record         TEXT NOT NULL,
                    created_at     TEXT NOT NULL,
                    retry_count    INTEGER NOT NULL DEFAULT 0,
                    acked_backend  INTEGER NOT NULL DEFAULT 0,
                    acked_calendar INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS scheduled_notifications (
                    occurrence_id TEXT NOT NULL,
                    offset_min    INTEGER NOT NULL,
                    trigger_at    TEXT NOT NULL,
                    channel       TEXT NOT NULL,
                    PRIMARY KEY (occurrence_id, offset_min)
                );

                CREATE TABLE IF NOT EXISTS cursors (
                    target TEXT PRIMARY KEY,
                    cursor TEXT NOT NULL
                );",
            )
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        migrations::migrate(&self.conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(())
    }

    // === Records ===

    /// Upsert a record without journaling (reconciliation path).
    pub fn upsert_record(&self, record: &SyncableRecord) -> Result<(), DatabaseError> {
        upsert_record_inner(&self.conn, record)
    }

    pub fn get_record(&self, id: &str) -> Result<Option<SyncableRecord>, DatabaseError> {
        let record = self
            .conn
            .query_row(
                "SELECT id, kind, origin, version, updated_at, deleted, data
                 FROM records WHERE id = ?1",
                params![id],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Current version of a record, or 0 if unknown.
    pub fn record_version(&self, id: &str) -> Result<i64, DatabaseError> {
        let version = self
            .conn
            .query_row(
                "SELECT version FROM records WHERE id = ?1",
                params![id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(version.unwrap_or(0))
    }

    /// All live (not soft-deleted) items.
    pub fn list_items(&self) -> Result<Vec<Item>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, origin, version, updated_at, deleted, data
             FROM records WHERE kind = 'item' AND deleted = 0 ORDER BY id",
        )?;
        let rows = stmt.query_map([], row_to_record)?;
        let mut items = Vec::new();
        for row in rows {
            let record = row?;
            match record.to_item() {
                Ok(item) => items.push(item),
                Err(e) => {
                    tracing::warn!(record_id = %record.id, error = %e, "skipping undecodable item");
                }
            }
        }
        Ok(items)
    }

    pub fn get_item(&self, id: &str) -> Result<Option<Item>, DatabaseError> {
        match self.get_record(id)? {
            Some(record) if record.kind == RecordKind::Item && !record.deleted => Ok(record
                .to_item()
                .map(Some)
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?),
            _ => Ok(None),
        }
    }

    /// Live exceptions for one series.
    pub fn list_exceptions(&self, series_id: &str) -> Result<Vec<Exception>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, origin, version, updated_at, deleted, data
             FROM records WHERE kind = 'exception' AND deleted = 0 AND id LIKE ?1",
        )?;
        let pattern = format!("{series_id}@%");
        let rows = stmt.query_map(params![pattern], row_to_record)?;
        let mut exceptions = Vec::new();
        for row in rows {
            let record = row?;
            match record.to_exception() {
                Ok(exc) if exc.series_id == series_id => exceptions.push(exc),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(record_id = %record.id, error = %e, "skipping undecodable exception");
                }
            }
        }
        Ok(exceptions)
    }

    // === Local mutations (write-ahead journal discipline) ===

    /// Commit a local mutation: the record upsert and its journal entry
    /// land in one transaction. If the journal append fails, the whole
    /// edit fails and rolls back.
    ///
    /// # Errors
    /// `JournalAppendFailed` when the journal row cannot be written.
    pub fn commit_local_change(
        &self,
        record: &SyncableRecord,
        op: ChangeOp,
    ) -> Result<PendingChange, DatabaseError> {
        let tx = self.conn.unchecked_transaction()?;
        upsert_record_inner(&tx, record)?;
        let created_at = Utc::now();
        let record_json =
            serde_json::to_string(record).map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        tx.execute(
            "INSERT INTO pending_changes (op, record_id, kind, record, created_at, retry_count)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            params![
                format_change_op(op),
                record.id,
                format_record_kind(record.kind),
                record_json,
                created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| DatabaseError::JournalAppendFailed(e.to_string()))?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(PendingChange {
            id,
            op,
            record_id: record.id.clone(),
            kind: record.kind,
            record: record.clone(),
            created_at,
            retry_count: 0,
        })
    }

    // === Change journal ===

    /// Unacked changes for one target in creation order.
    pub fn journal_pending(
        &self,
        target: Origin,
        max: usize,
    ) -> Result<Vec<PendingChange>, DatabaseError> {
        let col = ack_column(target)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, op, record_id, kind, record, created_at, retry_count
             FROM pending_changes WHERE {col} = 0 ORDER BY id ASC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![max as i64], row_to_pending)?;
        let mut changes = Vec::new();
        for row in rows {
            changes.push(row?);
        }
        Ok(changes)
    }

    pub fn journal_pending_count(&self, target: Origin) -> Result<usize, DatabaseError> {
        let col = ack_column(target)?;
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM pending_changes WHERE {col} = 0"),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Mark entries acked by one target. Delete-op acks also mark the
    /// record's deletion as confirmed by that target (for purging).
    pub fn journal_ack(&self, target: Origin, ids: &[i64]) -> Result<(), DatabaseError> {
        if ids.is_empty() {
            return Ok(());
        }
        let col = ack_column(target)?;
        let del_col = del_ack_column(target)?;
        let placeholders = vec!["?"; ids.len()].join(",");
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            &format!("UPDATE pending_changes SET {col} = 1 WHERE id IN ({placeholders})"),
            rusqlite::params_from_iter(ids.iter()),
        )?;
        tx.execute(
            &format!(
                "UPDATE records SET {del_col} = 1 WHERE id IN (
                     SELECT record_id FROM pending_changes
                     WHERE id IN ({placeholders}) AND op = 'delete')"
            ),
            rusqlite::params_from_iter(ids.iter()),
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Remove journal entries acked by every origin in `required`.
    ///
    /// An entry lives until all configured targets have confirmed durable
    /// receipt, never optimistically.
    pub fn journal_gc(&self, required: &[Origin]) -> Result<usize, DatabaseError> {
        let mut conditions = Vec::new();
        for target in required {
            conditions.push(format!("{} = 1", ack_column(*target)?));
        }
        let where_clause = if conditions.is_empty() {
            "1 = 1".to_string()
        } else {
            conditions.join(" AND ")
        };
        let removed = self.conn.execute(
            &format!("DELETE FROM pending_changes WHERE {where_clause}"),
            [],
        )?;
        Ok(removed)
    }

    /// Bump retry counts for failed entries. Ordering is untouched:
    /// batches are always read in creation order, so a requeued entry can
    /// never overtake an older unacked entry for the same record.
    pub fn journal_requeue(&self, ids: &[i64]) -> Result<(), DatabaseError> {
        if ids.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; ids.len()].join(",");
        self.conn.execute(
            &format!(
                "UPDATE pending_changes SET retry_count = retry_count + 1
                 WHERE id IN ({placeholders})"
            ),
            rusqlite::params_from_iter(ids.iter()),
        )?;
        Ok(())
    }

    // === Reconciliation commit point ===

    /// Apply a fully reconciled pull batch atomically: winning records,
    /// corrective journal entries, and the cursor advance commit together
    /// or not at all. The cursor never advances on partial success.
    pub fn apply_reconciled_batch(
        &self,
        winners: &[SyncableRecord],
        corrective: &[CorrectiveChange],
        target: Origin,
        next_cursor: &str,
    ) -> Result<(), DatabaseError> {
        let tx = self.conn.unchecked_transaction()?;
        for record in winners {
            upsert_record_inner(&tx, record)?;
        }
        for change in corrective {
            insert_corrective_inner(&tx, change)?;
        }
        tx.execute(
            "INSERT INTO cursors (target, cursor) VALUES (?1, ?2)
             ON CONFLICT(target) DO UPDATE SET cursor = excluded.cursor",
            params![target.as_str(), next_cursor],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Apply one resolution outside a pull batch (the push-conflict
    /// path). No cursor is touched.
    pub fn apply_resolution(
        &self,
        winner: &SyncableRecord,
        corrective: &[CorrectiveChange],
    ) -> Result<(), DatabaseError> {
        let tx = self.conn.unchecked_transaction()?;
        upsert_record_inner(&tx, winner)?;
        for change in corrective {
            insert_corrective_inner(&tx, change)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn cursor(&self, target: Origin) -> Result<Option<String>, DatabaseError> {
        let cursor = self
            .conn
            .query_row(
                "SELECT cursor FROM cursors WHERE target = ?1",
                params![target.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(cursor)
    }

    // === Scheduled notifications ===

    pub fn scheduled_notifications(&self) -> Result<Vec<ScheduledNotification>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT occurrence_id, offset_min, trigger_at, channel
             FROM scheduled_notifications ORDER BY occurrence_id, offset_min",
        )?;
        let rows = stmt.query_map([], |row| {
            let trigger_str: String = row.get(2)?;
            Ok(ScheduledNotification {
                occurrence_id: row.get(0)?,
                offset_min: row.get(1)?,
                trigger_at: parse_datetime_fallback(&trigger_str),
                channel: row.get(3)?,
            })
        })?;
        let mut notifications = Vec::new();
        for row in rows {
            notifications.push(row?);
        }
        Ok(notifications)
    }

    /// Persist the applied part of a reconcile diff in one transaction.
    ///
    /// The primary key on (occurrence_id, offset_min) enforces the dedup
    /// invariant at the storage layer too.
    pub fn apply_notification_diff(
        &self,
        scheduled: &[ScheduledNotification],
        cancelled: &[ScheduledNotification],
    ) -> Result<(), DatabaseError> {
        let tx = self.conn.unchecked_transaction()?;
        for notif in cancelled {
            tx.execute(
                "DELETE FROM scheduled_notifications
                 WHERE occurrence_id = ?1 AND offset_min = ?2",
                params![notif.occurrence_id, notif.offset_min],
            )?;
        }
        for notif in scheduled {
            tx.execute(
                "INSERT INTO scheduled_notifications (occurrence_id, offset_min, trigger_at, channel)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(occurrence_id, offset_min)
                 DO UPDATE SET trigger_at = excluded.trigger_at, channel = excluded.channel",
                params![
                    notif.occurrence_id,
                    notif.offset_min,
                    notif.trigger_at.to_rfc3339(),
                    notif.channel,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // === Purge ===

    /// Drop soft-deleted records whose deletion every origin in
    /// `required` has confirmed.
    pub fn purge_confirmed_deletions(&self, required: &[Origin]) -> Result<usize, DatabaseError> {
        let mut conditions = vec!["deleted = 1".to_string()];
        for target in required {
            conditions.push(format!("{} = 1", del_ack_column(*target)?));
        }
        let removed = self.conn.execute(
            &format!("DELETE FROM records WHERE {}", conditions.join(" AND ")),
            [],
        )?;
        Ok(removed)
    }
}

fn insert_corrective_inner(conn: &Connection, change: &CorrectiveChange) -> Result<(), DatabaseError> {
    let record_json = serde_json::to_string(&change.record)
        .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
    conn.execute(
        "INSERT INTO pending_changes
             (op, record_id, kind, record, created_at, retry_count,
              acked_backend, acked_calendar)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
        params![
            format_change_op(change.op),
            change.record.id,
            format_record_kind(change.record.kind),
            record_json,
            Utc::now().to_rfc3339(),
            !change.repush.contains(&Origin::Backend) as i64,
            !change.repush.contains(&Origin::Calendar) as i64,
        ],
    )
    .map_err(|e| DatabaseError::JournalAppendFailed(e.to_string()))?;
    Ok(())
}

fn upsert_record_inner(conn: &Connection, record: &SyncableRecord) -> Result<(), DatabaseError> {
    let data_json = serde_json::to_string(&record.data)
        .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
    conn.execute(
        "INSERT INTO records (id, kind, origin, version, updated_at, deleted, data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
             kind = excluded.kind,
             origin = excluded.origin,
             version = excluded.version,
             updated_at = excluded.updated_at,
             deleted = excluded.deleted,
             data = excluded.data",
        params![
            record.id,
            format_record_kind(record.kind),
            record.origin.as_str(),
            record.version,
            record.updated_at.to_rfc3339(),
            record.deleted as i64,
            data_json,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_record(title: &str, version: i64) -> SyncableRecord {
        let item = Item::new_event(title, Utc::now(), 30);
        SyncableRecord::from_item(&item, version).unwrap()
    }

    #[test]
    fn test_upsert_and_get_record() {
        let db = Database::open_memory().unwrap();
        let record = item_record("Dinner", 1);
        db.upsert_record(&record).unwrap();

        let loaded = db.get_record(&record.id).unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.data, record.data);
        assert_eq!(db.record_version(&record.id).unwrap(), 1);
        assert_eq!(db.record_version("missing").unwrap(), 0);
    }

    #[test]
    fn test_commit_local_change_appends_journal() {
        let db = Database::open_memory().unwrap();
        let record = item_record("Dinner", 1);
        let change = db.commit_local_change(&record, ChangeOp::Create).unwrap();

        assert_eq!(change.record_id, record.id);
        assert_eq!(db.journal_pending_count(Origin::Backend).unwrap(), 1);
        assert_eq!(db.journal_pending_count(Origin::Calendar).unwrap(), 1);
        assert!(db.get_record(&record.id).unwrap().is_some());
    }

    #[test]
    fn test_journal_batches_in_creation_order() {
        let db = Database::open_memory().unwrap();
        for i in 0..5 {
            let record = item_record(&format!("Item {i}"), 1);
            db.commit_local_change(&record, ChangeOp::Create).unwrap();
        }
        let batch = db.journal_pending(Origin::Backend, 3).unwrap();
        assert_eq!(batch.len(), 3);
        assert!(batch.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn test_ack_is_per_target_and_gc_requires_all() {
        let db = Database::open_memory().unwrap();
        let record = item_record("Dinner", 1);
        let change = db.commit_local_change(&record, ChangeOp::Create).unwrap();

        db.journal_ack(Origin::Backend, &[change.id]).unwrap();
        assert_eq!(db.journal_pending_count(Origin::Backend).unwrap(), 0);
        assert_eq!(db.journal_pending_count(Origin::Calendar).unwrap(), 1);

        // Calendar has not acked; entry must survive gc.
        let removed = db
            .journal_gc(&[Origin::Backend, Origin::Calendar])
            .unwrap();
        assert_eq!(removed, 0);

        db.journal_ack(Origin::Calendar, &[change.id]).unwrap();
        let removed = db
            .journal_gc(&[Origin::Backend, Origin::Calendar])
            .unwrap();
        assert_eq!(removed, 1);
    }

    #[test]
    fn test_requeue_bumps_retry_and_keeps_order() {
        let db = Database::open_memory().unwrap();
        let first = db
            .commit_local_change(&item_record("A", 1), ChangeOp::Create)
            .unwrap();
        let second = db
            .commit_local_change(&item_record("B", 1), ChangeOp::Create)
            .unwrap();

        db.journal_requeue(&[first.id]).unwrap();
        let batch = db.journal_pending(Origin::Backend, 10).unwrap();
        assert_eq!(batch[0].id, first.id);
        assert_eq!(batch[0].retry_count, 1);
        assert_eq!(batch[1].id, second.id);
        assert_eq!(batch[1].retry_count, 0);
    }

    #[test]
    fn test_apply_reconciled_batch_advances_cursor_atomically() {
        let db = Database::open_memory().unwrap();
        let winner = item_record("Won", 4);
        let corrective = CorrectiveChange {
            op: ChangeOp::Update,
            record: winner.clone(),
            repush: vec![Origin::Backend],
        };
        db.apply_reconciled_batch(
            std::slice::from_ref(&winner),
            std::slice::from_ref(&corrective),
            Origin::Backend,
            "cursor-42",
        )
        .unwrap();

        assert_eq!(db.cursor(Origin::Backend).unwrap().unwrap(), "cursor-42");
        assert_eq!(db.get_record(&winner.id).unwrap().unwrap().version, 4);
        // Pre-acked for calendar, pending only for backend.
        assert_eq!(db.journal_pending_count(Origin::Backend).unwrap(), 1);
        assert_eq!(db.journal_pending_count(Origin::Calendar).unwrap(), 0);
    }

    #[test]
    fn test_notification_dedup_primary_key() {
        let db = Database::open_memory().unwrap();
        let notif = ScheduledNotification {
            occurrence_id: "s#1".to_string(),
            offset_min: 10,
            trigger_at: Utc::now(),
            channel: "reminders".to_string(),
        };
        db.apply_notification_diff(&[notif.clone()], &[]).unwrap();
        // Upsert of the same (occurrence, offset) replaces, never duplicates.
        db.apply_notification_diff(&[notif.clone()], &[]).unwrap();
        assert_eq!(db.scheduled_notifications().unwrap().len(), 1);

        db.apply_notification_diff(&[], &[notif]).unwrap();
        assert!(db.scheduled_notifications().unwrap().is_empty());
    }

    #[test]
    fn test_purge_waits_for_all_origins() {
        let db = Database::open_memory().unwrap();
        let mut record = item_record("Doomed", 2);
        record.deleted = true;
        let change = db.commit_local_change(&record, ChangeOp::Delete).unwrap();

        assert_eq!(
            db.purge_confirmed_deletions(&[Origin::Backend, Origin::Calendar])
                .unwrap(),
            0
        );
        db.journal_ack(Origin::Backend, &[change.id]).unwrap();
        db.journal_ack(Origin::Calendar, &[change.id]).unwrap();
        assert_eq!(
            db.purge_confirmed_deletions(&[Origin::Backend, Origin::Calendar])
                .unwrap(),
            1
        );
        assert!(db.get_record(&record.id).unwrap().is_none());
    }

    #[test]
    fn test_list_items_excludes_deleted() {
        let db = Database::open_memory().unwrap();
        let live = item_record("Live", 1);
        let mut dead = item_record("Dead", 1);
        dead.deleted = true;
        db.upsert_record(&live).unwrap();
        db.upsert_record(&dead).unwrap();

        let items = db.list_items().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Live");
    }

    #[test]
    fn test_list_exceptions_scoped_to_series() {
        use chrono::NaiveDate;

        let db = Database::open_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        let mine = Exception::cancel("series-a", date);
        let other = Exception::cancel("series-b", date);
        db.upsert_record(&SyncableRecord::from_exception(&mine, 1).unwrap())
            .unwrap();
        db.upsert_record(&SyncableRecord::from_exception(&other, 1).unwrap())
            .unwrap();

        let exceptions = db.list_exceptions("series-a").unwrap();
        assert_eq!(exceptions.len(), 1);
        assert_eq!(exceptions[0], mine);
    }
}
