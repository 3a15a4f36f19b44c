//! Expanded agenda view.

use chrono::{Duration, Utc};

use daybook_core::recurrence::{expand_item, Occurrence};

use super::{open_db, CliResult};

/// Print all occurrences over the coming days.
pub fn run(days: i64) -> CliResult {
    let db = open_db()?;
    let now = Utc::now();
    let window_end = now + Duration::days(days.max(1));

    let mut occurrences: Vec<(Occurrence, String)> = Vec::new();
    {
        let guard = db.lock().unwrap();
        for item in guard.list_items()? {
            let exceptions = if item.is_series() {
                guard.list_exceptions(&item.id)?
            } else {
                Vec::new()
            };
            for occ in expand_item(&item, now, window_end, &exceptions) {
                occurrences.push((occ, item.title.clone()));
            }
        }
    }
    occurrences.sort_by_key(|(occ, _)| occ.start_at);

    for (occ, title) in &occurrences {
        println!(
            "{}  {:?}  {}  ({})",
            occ.start_at.format("%Y-%m-%d %H:%M"),
            occ.kind,
            title,
            occ.occurrence_id(),
        );
    }
    Ok(())
}
