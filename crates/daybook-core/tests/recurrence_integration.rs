//! Integration tests for recurrence expansion through the public API.
//!
//! These exercise the full item -> occurrence path, including the
//! day-of-month clamp policy and exception overlays.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use daybook_core::item::Item;
use daybook_core::recurrence::{
    expand_item, Exception, Frequency, OccurrenceOverride, OccurrenceStatus, RecurrenceRule,
    Termination,
};

fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

fn monthly_on_31st() -> Item {
    let mut item = Item::new_event("Pay rent", utc(2026, 1, 31, 9), 15);
    item.rule = Some(RecurrenceRule::new(
        Frequency::Monthly,
        1,
        Termination::Never,
    ));
    item
}

#[test]
fn test_monthly_series_anchored_on_31st_clamps_through_april() {
    let item = monthly_on_31st();
    let occurrences = expand_item(&item, utc(2026, 1, 1, 0), utc(2026, 5, 1, 0), &[]);

    let dates: Vec<NaiveDate> = occurrences
        .iter()
        .map(|o| o.start_at.date_naive())
        .collect();
    assert_eq!(
        dates,
        vec![
            NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
            NaiveDate::from_ymd_opt(2026, 2, 28).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
            NaiveDate::from_ymd_opt(2026, 4, 30).unwrap(),
        ]
    );
    // The clamp never leaks into later months: March is back on the 31st.
    assert_eq!(occurrences[2].index, 2);
}

#[test]
fn test_expansion_is_deterministic() {
    let item = monthly_on_31st();
    let a = expand_item(&item, utc(2026, 1, 1, 0), utc(2027, 1, 1, 0), &[]);
    let b = expand_item(&item, utc(2026, 1, 1, 0), utc(2027, 1, 1, 0), &[]);
    assert_eq!(a, b);
}

#[test]
fn test_exception_overrides_then_reset_restores_generator() {
    let mut item = Item::new_task("Water plants", utc(2026, 3, 2, 8), 10);
    item.rule = Some(RecurrenceRule::new(
        Frequency::Weekly,
        1,
        Termination::Count(6),
    ));

    let moved = Exception::replace(
        &item.id,
        NaiveDate::from_ymd_opt(2026, 3, 16).unwrap(),
        OccurrenceOverride {
            start_at: Some(utc(2026, 3, 17, 8)),
            ..Default::default()
        },
    );

    let with_exception = expand_item(&item, utc(2026, 3, 1, 0), utc(2026, 5, 1, 0), &[moved]);
    assert_eq!(with_exception.len(), 6);
    assert_eq!(with_exception[2].status, OccurrenceStatus::Modified);
    assert_eq!(with_exception[2].start_at, utc(2026, 3, 17, 8));

    // "Reset to series default" = the exception is destroyed.
    let reset = expand_item(&item, utc(2026, 3, 1, 0), utc(2026, 5, 1, 0), &[]);
    assert_eq!(reset[2].status, OccurrenceStatus::Generated);
    assert_eq!(reset[2].start_at, utc(2026, 3, 16, 8));
}

#[test]
fn test_past_occurrences_survive_window_queries() {
    // A count-limited series queried over a late window keeps its global
    // indices, so re-expansion after the fact is stable.
    let mut item = Item::new_event("Standup", utc(2026, 1, 5, 9), 15);
    item.rule = Some(RecurrenceRule::new(
        Frequency::Daily,
        1,
        Termination::Count(10),
    ));

    let tail = expand_item(&item, utc(2026, 1, 12, 0), utc(2026, 2, 1, 0), &[]);
    let indices: Vec<u32> = tail.iter().map(|o| o.index).collect();
    assert_eq!(indices, vec![7, 8, 9]);
    assert!(tail
        .iter()
        .all(|o| o.end_at - o.start_at == Duration::minutes(15)));
}
