//! Per-target sync coordination.
//!
//! One coordinator instance runs per sync target. Phases:
//!
//! ```text
//! Idle -> Pulling -> Reconciling -> Pushing -> Idle
//!   \________________ Failed(reason) _________/
//! ```
//!
//! The cursor advance is the commit point: winning records, corrective
//! journal entries, and the new cursor land in one transaction after the
//! whole batch reconciles. A trigger arriving while a cycle runs is
//! coalesced into a single pending permit, never queued twice. Failures
//! on one target never touch the other target's cycle.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Notify};

use crate::events::Event;
use crate::storage::config::SyncConfig;
use crate::storage::database::CorrectiveChange;
use crate::storage::Database;
use crate::sync::conflict::resolve;
use crate::sync::journal::ChangeJournal;
use crate::sync::target::SyncTarget;
use crate::sync::types::{
    ChangeOp, ConflictPolicy, Origin, PendingChange, PushOutcome, SyncError, SyncPhase, SyncStatus,
    SyncableRecord,
};

/// Exponential backoff, capped at five minutes.
pub fn backoff_delay(attempt: u32) -> Duration {
    let secs = 1u64 << attempt.min(8);
    Duration::from_secs(secs.min(300))
}

/// What one sync cycle did.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Another cycle was already running; this trigger was coalesced.
    pub skipped: bool,
    pub pulled: usize,
    pub applied: usize,
    pub pushed: usize,
    pub conflicts: usize,
    /// Entries that failed this cycle and were requeued for backoff.
    pub failed_pushes: usize,
    /// Record ids whose push retries are exhausted; surfaced, not dropped.
    pub exhausted: Vec<String>,
}

/// Serialized sync coordinator for one target.
pub struct SyncCoordinator {
    target: Arc<dyn SyncTarget>,
    db: Arc<StdMutex<Database>>,
    journal: ChangeJournal,
    policy: ConflictPolicy,
    /// Every enabled sync target; journal gc and tombstone purging wait
    /// for all of them.
    required_origins: Vec<Origin>,
    push_batch_size: usize,
    max_push_attempts: u32,
    interval: Duration,
    cycle_lock: tokio::sync::Mutex<()>,
    trigger: Notify,
    phase_tx: watch::Sender<SyncPhase>,
    events_tx: broadcast::Sender<Event>,
    last_sync_at: StdMutex<Option<DateTime<Utc>>>,
    failures: AtomicU32,
}

impl SyncCoordinator {
    pub fn new(
        target: Arc<dyn SyncTarget>,
        db: Arc<StdMutex<Database>>,
        required_origins: Vec<Origin>,
        config: &SyncConfig,
    ) -> Self {
        let (phase_tx, _) = watch::channel(SyncPhase::Idle);
        let (events_tx, _) = broadcast::channel(64);
        Self {
            journal: ChangeJournal::new(db.clone()),
            target,
            db,
            policy: config.conflict_policy,
            required_origins,
            push_batch_size: config.push_batch_size,
            max_push_attempts: config.max_push_attempts,
            interval: Duration::from_secs(config.interval_secs.max(1)),
            cycle_lock: tokio::sync::Mutex::new(()),
            trigger: Notify::new(),
            phase_tx,
            events_tx,
            last_sync_at: StdMutex::new(None),
            failures: AtomicU32::new(0),
        }
    }

    pub fn origin(&self) -> Origin {
        self.target.origin()
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase_tx.borrow().clone()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<SyncPhase> {
        self.phase_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events_tx.subscribe()
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            target: self.origin(),
            phase: self.phase(),
            last_sync_at: *self.last_sync_at.lock().unwrap(),
            pending_count: self.journal.pending_count(self.origin()).unwrap_or(0),
        }
    }

    /// Request an immediate cycle. Notify carries at most one permit, so
    /// triggers during a running cycle coalesce into a single follow-up.
    pub fn request_sync(&self) {
        self.trigger.notify_one();
    }

    fn set_phase(&self, phase: SyncPhase) {
        let _ = self.phase_tx.send(phase.clone());
        let _ = self.events_tx.send(Event::SyncPhaseChanged {
            target: self.origin(),
            phase,
            at: Utc::now(),
        });
    }

    /// Drive periodic and on-demand cycles until `shutdown` flips true.
    ///
    /// Dropping an in-flight cycle on shutdown is clean: the cursor only
    /// moves inside the reconciliation transaction.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = timer.tick() => {}
                _ = self.trigger.notified() => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                    continue;
                }
            }

            let cycle = tokio::select! {
                result = self.sync_cycle() => result,
                _ = shutdown.changed() => return,
            };

            match cycle {
                Ok(report) => {
                    self.failures.store(0, Ordering::Relaxed);
                    tracing::debug!(
                        origin = self.origin().as_str(),
                        pulled = report.pulled,
                        pushed = report.pushed,
                        "sync cycle complete"
                    );
                }
                Err(e) => {
                    let attempt = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                    let delay = backoff_delay(attempt);
                    tracing::warn!(
                        origin = self.origin().as_str(),
                        error = %e,
                        ?delay,
                        "sync cycle failed, backing off"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => return,
                    }
                    self.set_phase(SyncPhase::Idle);
                }
            }
        }
    }

    /// Run one pull/reconcile/push cycle.
    ///
    /// # Errors
    /// Transport and store errors leave the phase at `Failed`; the run
    /// loop (or the next manual cycle) returns it to `Idle`.
    pub async fn sync_cycle(&self) -> Result<CycleReport, SyncError> {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            // Already running; leave one pending permit behind.
            self.request_sync();
            return Ok(CycleReport {
                skipped: true,
                ..CycleReport::default()
            });
        };

        match self.run_phases().await {
            Ok(report) => {
                if !report.exhausted.is_empty() {
                    let _ = self.events_tx.send(Event::PushExhausted {
                        target: self.origin(),
                        record_ids: report.exhausted.clone(),
                        at: Utc::now(),
                    });
                }
                if report.failed_pushes > 0 {
                    // Requeued entries retry with exponential backoff via
                    // the run loop; the status surfaces as a failure.
                    let reason = format!("{} changes failed to push", report.failed_pushes);
                    self.set_phase(SyncPhase::Failed {
                        reason: reason.clone(),
                    });
                    let _ = self.events_tx.send(Event::SyncFailed {
                        target: self.origin(),
                        reason: reason.clone(),
                        at: Utc::now(),
                    });
                    return Err(SyncError::Api(reason));
                }
                *self.last_sync_at.lock().unwrap() = Some(Utc::now());
                self.set_phase(SyncPhase::Idle);
                let _ = self.events_tx.send(Event::SyncCompleted {
                    target: self.origin(),
                    pulled: report.pulled,
                    applied: report.applied,
                    pushed: report.pushed,
                    at: Utc::now(),
                });
                Ok(report)
            }
            Err(e) => {
                self.set_phase(SyncPhase::Failed {
                    reason: e.to_string(),
                });
                let _ = self.events_tx.send(Event::SyncFailed {
                    target: self.origin(),
                    reason: e.to_string(),
                    at: Utc::now(),
                });
                Err(e)
            }
        }
    }

    async fn run_phases(&self) -> Result<CycleReport, SyncError> {
        let origin = self.origin();
        let auth = self.target.auth_state();
        if !auth.can_push() && !auth.can_pull() {
            // Suspended target: local-only operation continues.
            return Err(SyncError::AuthorizationDenied);
        }

        let mut report = CycleReport::default();

        if auth.can_pull() {
            self.set_phase(SyncPhase::Pulling);
            let cursor = { self.db.lock().unwrap().cursor(origin)? };
            let batch = self.target.pull(cursor.as_deref()).await?;
            report.pulled = batch.records.len();

            self.set_phase(SyncPhase::Reconciling);
            {
                let db = self.db.lock().unwrap();
                let (winners, corrective) =
                    reconcile_batch(&db, &batch.records, self.policy, &self.required_origins)?;
                report.applied = winners.len();
                db.apply_reconciled_batch(&winners, &corrective, origin, &batch.next_cursor)?;
            }
        }

        self.set_phase(SyncPhase::Pushing);
        self.push_pending(&mut report).await?;

        self.journal.gc(&self.required_origins)?;
        self.db
            .lock()
            .unwrap()
            .purge_confirmed_deletions(&self.required_origins)?;

        Ok(report)
    }

    /// Drain the journal in creation order, acking per entry.
    async fn push_pending(&self, report: &mut CycleReport) -> Result<(), SyncError> {
        let origin = self.origin();
        loop {
            let batch = self.journal.pending_batch(origin, self.push_batch_size)?;
            if batch.is_empty() {
                return Ok(());
            }

            let (sendable, dead): (Vec<PendingChange>, Vec<PendingChange>) = batch
                .into_iter()
                .partition(|c| c.retry_count < self.max_push_attempts);
            for change in &dead {
                if !report.exhausted.contains(&change.record_id) {
                    report.exhausted.push(change.record_id.clone());
                }
            }
            if sendable.is_empty() {
                return Ok(());
            }

            let outcomes = self.target.push(&sendable).await?;

            let mut acked_ids = Vec::new();
            let mut failed_ids = Vec::new();
            for outcome in outcomes {
                match outcome {
                    PushOutcome::Acked { record_id } => {
                        acked_ids.extend(entry_ids_for(&sendable, &record_id));
                    }
                    PushOutcome::Conflict { record_id, current } => {
                        report.conflicts += 1;
                        self.resolve_push_conflict(&record_id, &current)?;
                        // The entry is superseded by the corrective change.
                        acked_ids.extend(entry_ids_for(&sendable, &record_id));
                    }
                    PushOutcome::Failed { record_id, message } => {
                        tracing::warn!(
                            origin = origin.as_str(),
                            record_id = %record_id,
                            message = %message,
                            "push entry failed"
                        );
                        failed_ids.extend(entry_ids_for(&sendable, &record_id));
                    }
                }
            }

            report.pushed += acked_ids.len();
            self.journal.ack(origin, &acked_ids)?;
            if !failed_ids.is_empty() {
                // Retry after backoff rather than spinning here.
                report.failed_pushes += failed_ids.len();
                self.journal.requeue(&failed_ids)?;
                return Ok(());
            }
        }
    }

    /// A push hit a newer version at the target; reconcile it the same
    /// way a pulled conflict would be.
    fn resolve_push_conflict(
        &self,
        record_id: &str,
        current: &SyncableRecord,
    ) -> Result<(), SyncError> {
        let db = self.db.lock().unwrap();
        let Some(local) = db.get_record(record_id)? else {
            // Deleted locally since the push was queued; adopt theirs.
            db.upsert_record(current)?;
            return Ok(());
        };
        let (remote, external) = split_by_origin(current);
        let resolution = resolve(&local, remote, external, self.policy);
        let corrective = corrective_for(&resolution.winner, &self.required_origins);
        db.apply_resolution(&resolution.winner, &corrective)?;
        Ok(())
    }
}

fn entry_ids_for(batch: &[PendingChange], record_id: &str) -> Vec<i64> {
    batch
        .iter()
        .filter(|c| c.record_id == record_id)
        .map(|c| c.id)
        .collect()
}

fn split_by_origin(
    record: &SyncableRecord,
) -> (Option<&SyncableRecord>, Option<&SyncableRecord>) {
    match record.origin {
        Origin::Calendar => (None, Some(record)),
        _ => (Some(record), None),
    }
}

/// Corrective change propagating `winner` to every enabled origin that
/// does not already hold it.
fn corrective_for(winner: &SyncableRecord, required: &[Origin]) -> Vec<CorrectiveChange> {
    let repush: Vec<Origin> = required
        .iter()
        .copied()
        .filter(|o| *o != winner.origin)
        .collect();
    if repush.is_empty() {
        return Vec::new();
    }
    let op = if winner.deleted {
        ChangeOp::Delete
    } else {
        ChangeOp::Update
    };
    vec![CorrectiveChange {
        op,
        record: winner.clone(),
        repush,
    }]
}

/// Reconcile one pulled batch against the local store.
///
/// Unknown records are adopted as-is; known records go through the
/// resolver unless the incoming version is equal or lower, which is
/// never applied.
pub fn reconcile_batch(
    db: &Database,
    incoming: &[SyncableRecord],
    policy: ConflictPolicy,
    required: &[Origin],
) -> Result<(Vec<SyncableRecord>, Vec<CorrectiveChange>), SyncError> {
    let mut winners = Vec::new();
    let mut corrective = Vec::new();

    for record in incoming {
        match db.get_record(&record.id)? {
            None => {
                corrective.extend(corrective_for(record, required));
                winners.push(record.clone());
            }
            Some(local) => {
                if record.version <= local.version {
                    continue;
                }
                let (remote, external) = split_by_origin(record);
                let resolution = resolve(&local, remote, external, policy);
                corrective.extend(corrective_for(&resolution.winner, required));
                winners.push(resolution.winner);
            }
        }
    }

    Ok((winners, corrective))
}
