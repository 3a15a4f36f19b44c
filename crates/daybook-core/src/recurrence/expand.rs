//! Pure occurrence expansion.
//!
//! `expand` walks the global occurrence sequence from the series anchor,
//! so count-based termination is honored no matter which window the caller
//! asks for. Monthly/yearly steps that land on a non-existent calendar day
//! clamp to the last valid day of that month; the clamp is computed from
//! the anchor's day each step, so Jan 31 -> Feb 28 -> Mar 31.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};

use crate::item::{Item, ItemKind};
use crate::recurrence::occurrence::{Exception, Occurrence, OccurrenceStatus};
use crate::recurrence::rule::{Frequency, RecurrenceRule, Termination};

/// Clamp a (year, month, day) triple to the last valid day of the month.
pub fn clamp_day_of_month(year: i32, month: u32, day: u32) -> NaiveDate {
    let last = last_day_of_month(year, month);
    // Both bounds are valid by construction.
    NaiveDate::from_ymd_opt(year, month, day.min(last))
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(year, month, 1).unwrap())
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_y, next_m) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_y, next_m, 1)
        .unwrap()
        .pred_opt()
        .unwrap()
        .day()
}

/// Anchor date shifted by `months` whole months, day-of-month clamped.
fn add_months_clamped(anchor: NaiveDate, months: u32) -> NaiveDate {
    let months0 = anchor.year() * 12 + anchor.month() as i32 - 1 + months as i32;
    let year = months0.div_euclid(12);
    let month = months0.rem_euclid(12) as u32 + 1;
    clamp_day_of_month(year, month, anchor.day())
}

/// The k-th generated date for simple (non-IntervalSet) frequencies.
fn nth_date(rule: &RecurrenceRule, anchor: NaiveDate, k: u32) -> NaiveDate {
    let step = k * rule.interval;
    match rule.frequency {
        Frequency::Daily => anchor + Duration::days(step as i64),
        Frequency::Weekly => anchor + Duration::days(step as i64 * 7),
        Frequency::Monthly => add_months_clamped(anchor, step),
        Frequency::Yearly => add_months_clamped(anchor, step * 12),
        Frequency::IntervalSet => unreachable!("IntervalSet expands by scan"),
    }
}

fn matches_interval_set(rule: &RecurrenceRule, date: NaiveDate) -> bool {
    rule.by_weekday.contains(&date.weekday()) || rule.by_month_day.contains(&(date.day() as u8))
}

/// Expand a recurrence rule into ordered occurrences inside a window.
///
/// Pure and side-effect-free. `exceptions` entries for other series are
/// ignored; a cancellation exception drops its date from the output and a
/// replacement exception substitutes its stored payload for that date.
#[allow(clippy::too_many_arguments)]
pub fn expand(
    series_id: &str,
    kind: ItemKind,
    rule: &RecurrenceRule,
    anchor: DateTime<Utc>,
    duration_min: i64,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    exceptions: &[Exception],
) -> Vec<Occurrence> {
    let anchor_date = anchor.date_naive();
    let anchor_time = anchor.time();
    let by_date: HashMap<NaiveDate, &Exception> = exceptions
        .iter()
        .filter(|e| e.series_id == series_id)
        .map(|e| (e.original_date, e))
        .collect();

    let mut out = Vec::new();
    let mut push_occurrence = |index: u32, date: NaiveDate| -> bool {
        // Returns false once the window end is passed (stop signal).
        let default_start = Utc.from_utc_datetime(&date.and_time(anchor_time));
        if default_start >= window_end {
            return false;
        }
        if let Termination::Until(until) = rule.termination {
            if date >= until {
                return false;
            }
        }
        if default_start < window_start {
            return true;
        }
        match by_date.get(&date) {
            Some(exc) if exc.cancelled => {}
            Some(exc) => {
                let repl = exc.replacement.clone().unwrap_or_default();
                let start = repl.start_at.unwrap_or(default_start);
                let minutes = repl.duration_min.unwrap_or(duration_min);
                out.push(Occurrence {
                    series_id: series_id.to_string(),
                    index,
                    start_at: start,
                    end_at: start + Duration::minutes(minutes),
                    status: OccurrenceStatus::Modified,
                    kind,
                });
            }
            None => {
                out.push(Occurrence {
                    series_id: series_id.to_string(),
                    index,
                    start_at: default_start,
                    end_at: default_start + Duration::minutes(duration_min),
                    status: OccurrenceStatus::Generated,
                    kind,
                });
            }
        }
        true
    };

    let count_limit = match rule.termination {
        Termination::Count(n) => Some(n),
        _ => None,
    };

    if rule.frequency == Frequency::IntervalSet {
        let mut index = 0u32;
        let mut matched = 0u64;
        let mut date = anchor_date;
        loop {
            if let Some(limit) = count_limit {
                if index >= limit {
                    break;
                }
            }
            if Utc.from_utc_datetime(&date.and_time(anchor_time)) >= window_end {
                break;
            }
            if let Termination::Until(until) = rule.termination {
                if date >= until {
                    break;
                }
            }
            if matches_interval_set(rule, date) {
                if matched % rule.interval as u64 == 0 {
                    push_occurrence(index, date);
                    index += 1;
                }
                matched += 1;
            }
            date = match date.succ_opt() {
                Some(d) => d,
                None => break,
            };
        }
    } else {
        let mut k = 0u32;
        loop {
            if let Some(limit) = count_limit {
                if k >= limit {
                    break;
                }
            }
            let date = nth_date(rule, anchor_date, k);
            if !push_occurrence(k, date) {
                break;
            }
            k += 1;
        }
    }

    out
}

/// Expand one item into occurrences.
///
/// Non-recurring items yield at most their single occurrence (index 0).
pub fn expand_item(
    item: &Item,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    exceptions: &[Exception],
) -> Vec<Occurrence> {
    match &item.rule {
        Some(rule) => expand(
            &item.id,
            item.kind,
            rule,
            item.start_at,
            item.duration_min,
            window_start,
            window_end,
            exceptions,
        ),
        None => {
            if item.start_at >= window_start && item.start_at < window_end {
                vec![Occurrence {
                    series_id: item.id.clone(),
                    index: 0,
                    start_at: item.start_at,
                    end_at: item.start_at + Duration::minutes(item.duration_min),
                    status: OccurrenceStatus::Generated,
                    kind: item.kind,
                }]
            } else {
                Vec::new()
            }
        }
    }
}
