//! Notification reconciliation.
//!
//! The desired set is recomputed after every local-store-affecting event
//! (sync apply, user edit, completion toggle) and diffed against what is
//! already scheduled. Diffing is by identity key (occurrence, offset), so
//! an unchanged pair is never re-scheduled; a pair whose trigger moved is
//! cancelled and re-issued.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};

use crate::error::{CoreError, NotifyError};
use crate::events::Event;
use crate::item::ItemKind;
use crate::notify::{
    NotificationDiff, NotificationPayload, NotificationService, ScheduledNotification,
};
use crate::recurrence::{expand_item, Occurrence, OccurrenceStatus};
use crate::storage::{Config, Database};

/// How far ahead reminders are materialized.
pub const SCHEDULE_HORIZON_DAYS: i64 = 30;

/// Days of daily-summary notifications kept scheduled ahead.
const SUMMARY_LOOKAHEAD_DAYS: i64 = 7;

/// Desired (occurrence, offset) pairs for one occurrence list.
///
/// Pure: cancelled occurrences and pairs whose trigger has already
/// passed are excluded, and duplicate (occurrence, offset) pairs are
/// dropped.
pub fn desired_notifications(
    occurrences: &[Occurrence],
    offsets_min: &[i64],
    now: DateTime<Utc>,
    channel: &str,
) -> Vec<ScheduledNotification> {
    let mut seen: HashSet<(String, i64)> = HashSet::new();
    let mut out = Vec::new();
    for occ in occurrences {
        if occ.status == OccurrenceStatus::Cancelled {
            continue;
        }
        let occurrence_id = occ.occurrence_id();
        for &offset in offsets_min {
            let trigger_at = occ.start_at - Duration::minutes(offset);
            if trigger_at <= now {
                continue;
            }
            if !seen.insert((occurrence_id.clone(), offset)) {
                continue;
            }
            out.push(ScheduledNotification {
                occurrence_id: occurrence_id.clone(),
                offset_min: offset,
                trigger_at,
                channel: channel.to_string(),
            });
        }
    }
    out
}

/// Diff the desired set against the currently-scheduled set.
///
/// Pure and idempotent: applying the diff and diffing again yields an
/// empty diff.
pub fn diff(
    desired: &[ScheduledNotification],
    scheduled: &[ScheduledNotification],
) -> NotificationDiff {
    let scheduled_by_key: HashMap<(&str, i64), &ScheduledNotification> =
        scheduled.iter().map(|n| (n.key(), n)).collect();
    let desired_keys: HashSet<(&str, i64)> = desired.iter().map(|n| n.key()).collect();

    let mut out = NotificationDiff::default();
    for want in desired {
        match scheduled_by_key.get(&want.key()) {
            Some(have) if have.trigger_at == want.trigger_at && have.channel == want.channel => {}
            Some(have) => {
                // Same pair, moved trigger: cancel and re-issue.
                out.to_cancel.push((*have).clone());
                out.to_schedule.push(want.clone());
            }
            None => out.to_schedule.push(want.clone()),
        }
    }
    for have in scheduled {
        if !desired_keys.contains(&have.key()) {
            out.to_cancel.push(have.clone());
        }
    }
    out
}

/// Compute the minimal command lists for one occurrence set.
pub fn reconcile(
    occurrences: &[Occurrence],
    offsets_min: &[i64],
    scheduled: &[ScheduledNotification],
    now: DateTime<Utc>,
    channel: &str,
) -> NotificationDiff {
    diff(
        &desired_notifications(occurrences, offsets_min, now, channel),
        scheduled,
    )
}

/// The daily summary is a degenerate occurrence (offset zero) so it
/// reuses the same dedup and cancel machinery as real reminders.
pub fn daily_summary_occurrence(date: NaiveDate, hour: u32, minute: u32) -> Occurrence {
    let start_at = Utc.from_utc_datetime(
        &date
            .and_hms_opt(hour, minute, 0)
            .unwrap_or_else(|| date.and_hms_opt(0, 0, 0).unwrap()),
    );
    Occurrence {
        series_id: format!("summary:{date}"),
        index: 0,
        start_at,
        end_at: start_at,
        status: OccurrenceStatus::Generated,
        kind: ItemKind::Event,
    }
}

/// What one reconcile pass did.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub scheduled: usize,
    pub cancelled: usize,
    /// Commands the platform refused; reminders are degraded but nothing
    /// else stops.
    pub degraded: Vec<String>,
    pub events: Vec<Event>,
}

/// Serialized scheduler over the shared store and the platform service.
pub struct NotificationScheduler {
    db: Arc<StdMutex<Database>>,
    service: Arc<dyn NotificationService>,
    lock: tokio::sync::Mutex<()>,
}

impl NotificationScheduler {
    pub fn new(db: Arc<StdMutex<Database>>, service: Arc<dyn NotificationService>) -> Self {
        Self {
            db,
            service,
            lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Recompute the desired set and apply the minimal diff.
    ///
    /// Serialized per account: two concurrent calls can never compute
    /// conflicting diffs.
    ///
    /// # Errors
    /// Store failures only; platform refusals degrade into the report.
    pub async fn reconcile_and_apply(
        &self,
        config: &Config,
        now: DateTime<Utc>,
    ) -> Result<ReconcileReport, CoreError> {
        let _guard = self.lock.lock().await;

        let (items, scheduled, exceptions_by_item) = {
            let db = self.db.lock().unwrap();
            let items = db.list_items()?;
            let scheduled = db.scheduled_notifications()?;
            let mut exceptions_by_item = HashMap::new();
            for item in &items {
                if item.is_series() {
                    exceptions_by_item.insert(item.id.clone(), db.list_exceptions(&item.id)?);
                }
            }
            (items, scheduled, exceptions_by_item)
        };

        let channel = config.notifications.channel.as_str();
        let horizon_end = now + Duration::days(SCHEDULE_HORIZON_DAYS);
        let mut desired = Vec::new();
        let mut payloads: HashMap<(String, i64), NotificationPayload> = HashMap::new();

        if config.notifications.enabled {
            for item in &items {
                // Completing a task drops every pair for all of its
                // occurrences into the cancel set.
                if item.kind == ItemKind::Task && item.is_completed() {
                    continue;
                }
                let empty = Vec::new();
                let exceptions = exceptions_by_item.get(&item.id).unwrap_or(&empty);
                let occurrences = expand_item(item, now, horizon_end, exceptions);
                let offsets = if item.reminder_offsets_min.is_empty() {
                    &config.notifications.default_offsets_min
                } else {
                    &item.reminder_offsets_min
                };
                let wanted = desired_notifications(&occurrences, offsets, now, channel);
                for notif in &wanted {
                    payloads.insert(
                        (notif.occurrence_id.clone(), notif.offset_min),
                        NotificationPayload {
                            title: item.title.clone(),
                            body: format!("Starts at {}", notif.trigger_at + Duration::minutes(notif.offset_min)),
                            channel: channel.to_string(),
                        },
                    );
                }
                desired.extend(wanted);
            }

            if let Some((hour, minute)) = config.daily_summary_time() {
                let summaries: Vec<Occurrence> = (0..SUMMARY_LOOKAHEAD_DAYS)
                    .map(|d| daily_summary_occurrence(now.date_naive() + Duration::days(d), hour, minute))
                    .collect();
                let wanted = desired_notifications(&summaries, &[0], now, channel);
                for notif in &wanted {
                    payloads.insert(
                        (notif.occurrence_id.clone(), notif.offset_min),
                        NotificationPayload {
                            title: "Daily summary".to_string(),
                            body: "Your agenda for today".to_string(),
                            channel: channel.to_string(),
                        },
                    );
                }
                desired.extend(wanted);
            }
        }

        let diff = diff(&desired, &scheduled);
        let mut report = ReconcileReport::default();
        let mut applied_schedule = Vec::new();
        let mut applied_cancel = Vec::new();

        for notif in &diff.to_cancel {
            match self.service.cancel(&notif.delivery_id()) {
                Ok(()) => applied_cancel.push(notif.clone()),
                Err(e) => {
                    tracing::warn!(id = %notif.delivery_id(), error = %e, "cancel refused");
                    report.degraded.push(e.to_string());
                }
            }
        }
        for notif in &diff.to_schedule {
            let payload = payloads
                .remove(&(notif.occurrence_id.clone(), notif.offset_min))
                .unwrap_or_default();
            match self.service.schedule(&notif.delivery_id(), notif.trigger_at, &payload) {
                Ok(()) => applied_schedule.push(notif.clone()),
                Err(NotifyError::QuotaExceeded { limit }) => {
                    tracing::warn!(limit, "notification quota exceeded");
                    report
                        .degraded
                        .push(NotifyError::QuotaExceeded { limit }.to_string());
                    break;
                }
                Err(e) => {
                    tracing::warn!(id = %notif.delivery_id(), error = %e, "schedule refused");
                    report.degraded.push(e.to_string());
                }
            }
        }

        self.db
            .lock()
            .unwrap()
            .apply_notification_diff(&applied_schedule, &applied_cancel)?;

        report.scheduled = applied_schedule.len();
        report.cancelled = applied_cancel.len();
        report.events.push(Event::NotificationsReconciled {
            scheduled: report.scheduled,
            cancelled: report.cancelled,
            at: Utc::now(),
        });
        if !report.degraded.is_empty() {
            report.events.push(Event::RemindersDegraded {
                reason: report.degraded.join("; "),
                at: Utc::now(),
            });
        }
        Ok(report)
    }

    /// Startup pass reconciling the store against what the platform
    /// actually holds, healing missed cancellations and lost schedules.
    pub async fn heal(&self) -> Result<(), CoreError> {
        let _guard = self.lock.lock().await;

        let platform_ids: HashSet<String> = self.service.list_pending()?.into_iter().collect();
        let rows = { self.db.lock().unwrap().scheduled_notifications()? };
        let row_ids: HashSet<String> = rows.iter().map(|n| n.delivery_id()).collect();

        // Pending with the platform but unknown to us: a missed cancel.
        for id in platform_ids.difference(&row_ids) {
            if let Err(e) = self.service.cancel(id) {
                tracing::warn!(id = %id, error = %e, "stale notification cancel refused");
            }
        }

        // Known to us but lost by the platform: drop the row so the next
        // reconcile pass re-schedules it.
        let lost: Vec<ScheduledNotification> = rows
            .iter()
            .filter(|n| !platform_ids.contains(&n.delivery_id()))
            .cloned()
            .collect();
        if !lost.is_empty() {
            self.db.lock().unwrap().apply_notification_diff(&[], &lost)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn occ(series: &str, index: u32, start_at: DateTime<Utc>) -> Occurrence {
        Occurrence {
            series_id: series.to_string(),
            index,
            start_at,
            end_at: start_at + Duration::minutes(30),
            status: OccurrenceStatus::Generated,
            kind: ItemKind::Task,
        }
    }

    #[test]
    fn test_desired_excludes_past_triggers() {
        let now = utc(2026, 6, 1, 12);
        let occurrences = vec![
            occ("s", 0, utc(2026, 6, 1, 11)),  // already started
            occ("s", 1, utc(2026, 6, 1, 12)),  // trigger 10 min ago
            occ("s", 2, utc(2026, 6, 2, 12)),  // future
        ];
        let desired = desired_notifications(&occurrences, &[10], now, "reminders");
        assert_eq!(desired.len(), 1);
        assert_eq!(desired[0].occurrence_id, "s#2");
    }

    #[test]
    fn test_desired_dedups_pairs() {
        let now = utc(2026, 6, 1, 0);
        let start = utc(2026, 6, 2, 12);
        let occurrences = vec![occ("s", 0, start), occ("s", 0, start)];
        let desired = desired_notifications(&occurrences, &[10, 10], now, "reminders");
        assert_eq!(desired.len(), 1);
    }

    #[test]
    fn test_diff_never_reschedules_unchanged_pairs() {
        let now = utc(2026, 6, 1, 0);
        let occurrences = vec![occ("s", 0, utc(2026, 6, 2, 12))];
        let desired = desired_notifications(&occurrences, &[10], now, "reminders");

        let d1 = diff(&desired, &[]);
        assert_eq!(d1.to_schedule.len(), 1);
        assert!(d1.to_cancel.is_empty());

        // Apply, then diff again: idempotent.
        let d2 = diff(&desired, &d1.to_schedule);
        assert!(d2.is_empty());
    }

    #[test]
    fn test_diff_moves_trigger_by_cancel_and_reissue() {
        let now = utc(2026, 6, 1, 0);
        let before = desired_notifications(&[occ("s", 0, utc(2026, 6, 2, 12))], &[10], now, "r");
        let after = desired_notifications(&[occ("s", 0, utc(2026, 6, 2, 15))], &[10], now, "r");

        let d = diff(&after, &before);
        assert_eq!(d.to_cancel.len(), 1);
        assert_eq!(d.to_schedule.len(), 1);
        assert_eq!(d.to_schedule[0].trigger_at, utc(2026, 6, 2, 15) - Duration::minutes(10));
    }

    #[test]
    fn test_cancelled_occurrence_moves_to_cancel() {
        let now = utc(2026, 6, 1, 0);
        let scheduled = desired_notifications(&[occ("s", 0, utc(2026, 6, 2, 12))], &[10], now, "r");
        let d = reconcile(&[], &[10], &scheduled, now, "r");
        assert_eq!(d.to_cancel.len(), 1);
        assert!(d.to_schedule.is_empty());
    }

    #[test]
    fn test_daily_summary_is_degenerate_occurrence() {
        let date = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        let summary = daily_summary_occurrence(date, 8, 30);
        assert_eq!(summary.series_id, "summary:2026-06-01");
        assert_eq!(summary.occurrence_id(), "summary:2026-06-01#0");
        assert_eq!(summary.start_at, utc(2026, 6, 1, 8) + Duration::minutes(30));
        assert_eq!(summary.start_at, summary.end_at);
    }
}
