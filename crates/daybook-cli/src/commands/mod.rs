//! CLI subcommand implementations.

pub mod agenda;
pub mod config;
pub mod event;
pub mod occurrence;
pub mod sync;
pub mod task;

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex as StdMutex};

use daybook_core::error::NotifyError;
use daybook_core::item::Item;
use daybook_core::notify::{NotificationPayload, NotificationScheduler, NotificationService};
use daybook_core::recurrence::Exception;
use daybook_core::storage::{Config, Database};
use daybook_core::sync::{ChangeOp, SyncableRecord};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

pub fn open_db() -> Result<Arc<StdMutex<Database>>, Box<dyn std::error::Error>> {
    Ok(Arc::new(StdMutex::new(Database::open()?)))
}

/// Stand-in for the platform notification service: prints the commands
/// it would issue. The real service is wired in by the host app.
pub struct ConsoleNotificationService;

impl NotificationService for ConsoleNotificationService {
    fn schedule(
        &self,
        id: &str,
        trigger_at: DateTime<Utc>,
        payload: &NotificationPayload,
    ) -> Result<(), NotifyError> {
        println!("schedule {id} at {trigger_at}: {}", payload.title);
        Ok(())
    }

    fn cancel(&self, id: &str) -> Result<(), NotifyError> {
        println!("cancel {id}");
        Ok(())
    }

    fn list_pending(&self) -> Result<Vec<String>, NotifyError> {
        Ok(Vec::new())
    }
}

/// Save an item with write-ahead journaling and a bumped version.
pub fn commit_item(
    db: &Arc<StdMutex<Database>>,
    item: &Item,
    deleted: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    item.validate()?;
    let guard = db.lock().unwrap();
    let version = guard.record_version(&item.id)? + 1;
    let mut record = SyncableRecord::from_item(item, version)?;
    record.deleted = deleted;
    let op = if deleted {
        ChangeOp::Delete
    } else if version == 1 {
        ChangeOp::Create
    } else {
        ChangeOp::Update
    };
    guard.commit_local_change(&record, op)?;
    Ok(())
}

/// Save an exception with write-ahead journaling.
pub fn commit_exception(
    db: &Arc<StdMutex<Database>>,
    exception: &Exception,
    deleted: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let guard = db.lock().unwrap();
    let id = exception.record_id();
    let version = guard.record_version(&id)? + 1;
    let mut record = SyncableRecord::from_exception(exception, version)?;
    record.deleted = deleted;
    let op = if deleted {
        ChangeOp::Delete
    } else if version == 1 {
        ChangeOp::Create
    } else {
        ChangeOp::Update
    };
    guard.commit_local_change(&record, op)?;
    Ok(())
}

/// Reconcile reminders after a local-store-affecting command.
///
/// Heals against the platform's pending list first, so missed
/// cancellations from a previous run are recovered.
pub fn reconcile_notifications(db: &Arc<StdMutex<Database>>, config: &Config) -> CliResult {
    let scheduler = NotificationScheduler::new(db.clone(), Arc::new(ConsoleNotificationService));
    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(async {
        scheduler.heal().await?;
        scheduler.reconcile_and_apply(config, Utc::now()).await
    })?;
    if !report.degraded.is_empty() {
        eprintln!("warning: reminders degraded: {}", report.degraded.join("; "));
    }
    Ok(())
}

/// Parse a `YYYY-MM-DDTHH:MM` or RFC3339 instant.
pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")?;
    Ok(DateTime::from_naive_utc_and_offset(naive, Utc))
}
