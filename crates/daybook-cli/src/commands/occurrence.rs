//! Single-occurrence edits: exceptions over a series.

use clap::Subcommand;

use daybook_core::recurrence::{Exception, OccurrenceOverride};
use daybook_core::storage::Config;

use super::{commit_exception, open_db, parse_instant, reconcile_notifications, CliResult};

/// Occurrence actions.
#[derive(Subcommand)]
pub enum OccurrenceAction {
    /// Move or edit one occurrence of a series
    Edit {
        series_id: String,
        /// Original occurrence date (YYYY-MM-DD)
        date: String,
        /// New start instant
        #[arg(long)]
        start: Option<String>,
        /// New duration in minutes
        #[arg(long)]
        duration: Option<i64>,
        /// Replacement title
        #[arg(long)]
        title: Option<String>,
    },
    /// Cancel one occurrence of a series
    Cancel {
        series_id: String,
        /// Original occurrence date (YYYY-MM-DD)
        date: String,
    },
    /// Reset one occurrence to the series default
    Reset {
        series_id: String,
        /// Original occurrence date (YYYY-MM-DD)
        date: String,
    },
}

/// Run the occurrence command.
pub fn run(action: OccurrenceAction) -> CliResult {
    match action {
        OccurrenceAction::Edit {
            series_id,
            date,
            start,
            duration,
            title,
        } => {
            let original_date = date.parse()?;
            let replacement = OccurrenceOverride {
                start_at: start.as_deref().map(parse_instant).transpose()?,
                duration_min: duration,
                title,
                notes: None,
            };
            let exception = Exception::replace(&series_id, original_date, replacement);

            let db = open_db()?;
            ensure_series_exists(&db, &series_id)?;
            commit_exception(&db, &exception, false)?;
            println!("edited {series_id} on {date}");
            reconcile_notifications(&db, &Config::load()?)?;
        }
        OccurrenceAction::Cancel { series_id, date } => {
            let exception = Exception::cancel(&series_id, date.parse()?);

            let db = open_db()?;
            ensure_series_exists(&db, &series_id)?;
            commit_exception(&db, &exception, false)?;
            println!("cancelled {series_id} on {date}");
            reconcile_notifications(&db, &Config::load()?)?;
        }
        OccurrenceAction::Reset { series_id, date } => {
            let exception = Exception::cancel(&series_id, date.parse()?);

            let db = open_db()?;
            // Tombstone the exception record so the reset syncs too.
            commit_exception(&db, &exception, true)?;
            println!("reset {series_id} on {date} to series default");
            reconcile_notifications(&db, &Config::load()?)?;
        }
    }
    Ok(())
}

fn ensure_series_exists(
    db: &std::sync::Arc<std::sync::Mutex<daybook_core::storage::Database>>,
    series_id: &str,
) -> CliResult {
    let Some(item) = db.lock().unwrap().get_item(series_id)? else {
        return Err(format!("no such series: {series_id}").into());
    };
    if !item.is_series() {
        return Err(format!("{series_id} is not recurring").into());
    }
    Ok(())
}
