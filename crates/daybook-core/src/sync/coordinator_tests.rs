//! Tests for the sync coordinator.

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex as StdMutex};

    use crate::item::Item;
    use crate::storage::config::SyncConfig;
    use crate::storage::Database;
    use crate::sync::coordinator::{backoff_delay, SyncCoordinator};
    use crate::sync::target::{AuthState, SyncTarget};
    use crate::sync::types::{
        ChangeOp, Origin, PendingChange, PulledBatch, PushOutcome, SyncError, SyncPhase,
        SyncableRecord,
    };

    /// In-memory sync target with a scripted pull feed and a dedup store
    /// standing in for the remote side.
    struct MockTarget {
        origin: Origin,
        auth: StdMutex<AuthState>,
        pulls: StdMutex<VecDeque<PulledBatch>>,
        remote: StdMutex<HashMap<String, SyncableRecord>>,
        fail_record: StdMutex<Option<String>>,
    }

    impl MockTarget {
        fn new(origin: Origin) -> Arc<Self> {
            Arc::new(Self {
                origin,
                auth: StdMutex::new(AuthState::ReadWrite),
                pulls: StdMutex::new(VecDeque::new()),
                remote: StdMutex::new(HashMap::new()),
                fail_record: StdMutex::new(None),
            })
        }

        fn queue_pull(&self, records: Vec<SyncableRecord>, next_cursor: &str) {
            self.pulls.lock().unwrap().push_back(PulledBatch {
                records,
                next_cursor: next_cursor.to_string(),
            });
        }

        fn remote_len(&self) -> usize {
            self.remote.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SyncTarget for MockTarget {
        fn origin(&self) -> Origin {
            self.origin
        }

        fn auth_state(&self) -> AuthState {
            *self.auth.lock().unwrap()
        }

        async fn pull(&self, cursor: Option<&str>) -> Result<PulledBatch, SyncError> {
            Ok(self.pulls.lock().unwrap().pop_front().unwrap_or(PulledBatch {
                records: Vec::new(),
                next_cursor: cursor.unwrap_or("c0").to_string(),
            }))
        }

        async fn push(&self, batch: &[PendingChange]) -> Result<Vec<PushOutcome>, SyncError> {
            let fail = self.fail_record.lock().unwrap().clone();
            let mut remote = self.remote.lock().unwrap();
            let mut outcomes = Vec::new();
            for change in batch {
                if fail.as_deref() == Some(change.record_id.as_str()) {
                    outcomes.push(PushOutcome::Failed {
                        record_id: change.record_id.clone(),
                        message: "scripted failure".to_string(),
                    });
                    continue;
                }
                // Keyed by id: re-delivery can never duplicate a record.
                remote.insert(change.record_id.clone(), change.record.clone());
                outcomes.push(PushOutcome::Acked {
                    record_id: change.record_id.clone(),
                });
            }
            Ok(outcomes)
        }
    }

    fn setup(origin: Origin) -> (Arc<MockTarget>, Arc<StdMutex<Database>>, SyncCoordinator) {
        let target = MockTarget::new(origin);
        let db = Arc::new(StdMutex::new(Database::open_memory().unwrap()));
        let coordinator = SyncCoordinator::new(
            target.clone() as Arc<dyn SyncTarget>,
            db.clone(),
            vec![origin],
            &SyncConfig::default(),
        );
        (target, db, coordinator)
    }

    fn local_record(title: &str, version: i64) -> SyncableRecord {
        let item = Item::new_event(title, Utc::now(), 30);
        SyncableRecord::from_item(&item, version).unwrap()
    }

    #[tokio::test]
    async fn test_local_edit_is_pushed_and_acked() {
        let (target, db, coordinator) = setup(Origin::Backend);
        let record = local_record("Groceries", 1);
        db.lock()
            .unwrap()
            .commit_local_change(&record, ChangeOp::Create)
            .unwrap();

        let report = coordinator.sync_cycle().await.unwrap();
        assert_eq!(report.pushed, 1);
        assert_eq!(target.remote_len(), 1);
        // Acked and collected: nothing pending for the target.
        assert_eq!(
            db.lock()
                .unwrap()
                .journal_pending_count(Origin::Backend)
                .unwrap(),
            0
        );
        assert_eq!(coordinator.phase(), SyncPhase::Idle);
    }

    #[tokio::test]
    async fn test_redelivered_batch_creates_no_duplicates() {
        let (target, db, coordinator) = setup(Origin::Backend);
        let record = local_record("Groceries", 1);
        db.lock()
            .unwrap()
            .commit_local_change(&record, ChangeOp::Create)
            .unwrap();

        coordinator.sync_cycle().await.unwrap();
        let report = coordinator.sync_cycle().await.unwrap();
        assert_eq!(report.pushed, 0);
        assert_eq!(target.remote_len(), 1);
    }

    #[tokio::test]
    async fn test_pull_adopts_unknown_records_and_advances_cursor() {
        let (target, db, coordinator) = setup(Origin::Backend);
        let mut incoming = local_record("From remote", 3);
        incoming.origin = Origin::Backend;
        target.queue_pull(vec![incoming.clone()], "c1");

        let report = coordinator.sync_cycle().await.unwrap();
        assert_eq!(report.pulled, 1);
        assert_eq!(report.applied, 1);

        let db = db.lock().unwrap();
        let stored = db.get_record(&incoming.id).unwrap().unwrap();
        assert_eq!(stored.version, 3);
        assert_eq!(db.cursor(Origin::Backend).unwrap().unwrap(), "c1");
    }

    #[tokio::test]
    async fn test_equal_or_lower_version_is_never_applied() {
        let (target, db, coordinator) = setup(Origin::Backend);
        let record = local_record("Stable", 5);
        db.lock().unwrap().upsert_record(&record).unwrap();

        let mut stale = record.clone();
        stale.origin = Origin::Backend;
        stale.version = 5;
        stale.data = serde_json::json!({"title": "stale overwrite"});
        target.queue_pull(vec![stale], "c2");

        let report = coordinator.sync_cycle().await.unwrap();
        assert_eq!(report.pulled, 1);
        assert_eq!(report.applied, 0);
        let stored = db.lock().unwrap().get_record(&record.id).unwrap().unwrap();
        assert_eq!(stored.data, record.data);
        // The cursor still advances: the batch reconciled fine.
        assert_eq!(
            db.lock().unwrap().cursor(Origin::Backend).unwrap().unwrap(),
            "c2"
        );
    }

    #[tokio::test]
    async fn test_losing_local_version_gets_corrective_push() {
        let (target, db, coordinator) = setup(Origin::Backend);
        let base = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();

        let mut local = local_record("Local title", 1);
        local.updated_at = base + Duration::minutes(30);
        db.lock().unwrap().upsert_record(&local).unwrap();

        // Incoming is a higher version but older timestamp; under
        // newer-wins the local payload wins and must be re-pushed.
        let mut incoming = local.clone();
        incoming.origin = Origin::Backend;
        incoming.version = 2;
        incoming.updated_at = base;
        incoming.data = serde_json::json!({"title": "remote title"});
        target.queue_pull(vec![incoming], "c3");

        coordinator.sync_cycle().await.unwrap();

        let stored = db.lock().unwrap().get_record(&local.id).unwrap().unwrap();
        assert_eq!(stored.data, local.data);
        assert_eq!(stored.version, 3);
        // The corrective change was pushed in the same cycle.
        assert_eq!(target.remote.lock().unwrap()[&local.id].version, 3);
    }

    #[tokio::test]
    async fn test_failed_entry_is_requeued_not_dropped() {
        let (target, db, coordinator) = setup(Origin::Backend);
        let record = local_record("Flaky", 1);
        db.lock()
            .unwrap()
            .commit_local_change(&record, ChangeOp::Create)
            .unwrap();
        *target.fail_record.lock().unwrap() = Some(record.id.clone());

        // A failed entry fails the cycle so the run loop backs off.
        assert!(coordinator.sync_cycle().await.is_err());
        assert!(matches!(coordinator.phase(), SyncPhase::Failed { .. }));
        let pending = db
            .lock()
            .unwrap()
            .journal_pending(Origin::Backend, 10)
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].retry_count, 1);
    }

    #[tokio::test]
    async fn test_exhausted_entries_are_surfaced() {
        let (target, db, coordinator) = setup(Origin::Backend);
        let record = local_record("Doomed push", 1);
        let change = db
            .lock()
            .unwrap()
            .commit_local_change(&record, ChangeOp::Create)
            .unwrap();
        *target.fail_record.lock().unwrap() = Some(record.id.clone());

        let max = SyncConfig::default().max_push_attempts;
        for _ in 0..max {
            db.lock().unwrap().journal_requeue(&[change.id]).unwrap();
        }

        let report = coordinator.sync_cycle().await.unwrap();
        assert_eq!(report.exhausted, vec![record.id.clone()]);
        // Still in the journal: surfaced, never silently dropped.
        assert_eq!(
            db.lock()
                .unwrap()
                .journal_pending_count(Origin::Backend)
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_denied_target_suspends_cycle() {
        let (target, _db, coordinator) = setup(Origin::Calendar);
        *target.auth.lock().unwrap() = AuthState::Denied;

        let err = coordinator.sync_cycle().await.unwrap_err();
        assert!(matches!(err, SyncError::AuthorizationDenied));
        assert!(matches!(coordinator.phase(), SyncPhase::Failed { .. }));
    }

    #[tokio::test]
    async fn test_deletion_push_confirms_purge() {
        let (_target, db, coordinator) = setup(Origin::Backend);
        let mut record = local_record("To delete", 2);
        record.deleted = true;
        db.lock()
            .unwrap()
            .commit_local_change(&record, ChangeOp::Delete)
            .unwrap();

        coordinator.sync_cycle().await.unwrap();
        // Backend acked the delete and it is the only required origin,
        // so the tombstone is purged.
        assert!(db.lock().unwrap().get_record(&record.id).unwrap().is_none());
    }

    #[test]
    fn test_backoff_delay_is_bounded() {
        assert_eq!(backoff_delay(1).as_secs(), 2);
        assert_eq!(backoff_delay(3).as_secs(), 8);
        assert!(backoff_delay(20).as_secs() <= 300);
    }
}
