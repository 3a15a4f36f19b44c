//! Event subcommand.

use clap::Subcommand;

use daybook_core::item::Item;
use daybook_core::recurrence::{Frequency, RecurrenceRule, Termination};
use daybook_core::storage::Config;

use super::{commit_item, open_db, parse_instant, reconcile_notifications, CliResult};

/// Event actions.
#[derive(Subcommand)]
pub enum EventAction {
    /// Create an event (optionally recurring)
    Add {
        title: String,
        /// Start instant, e.g. 2026-09-01T09:00
        #[arg(long)]
        start: String,
        /// Duration in minutes
        #[arg(long, default_value_t = 60)]
        duration: i64,
        /// Recurrence frequency: daily, weekly, monthly, yearly
        #[arg(long)]
        repeat: Option<String>,
        /// Recurrence interval (every n-th step)
        #[arg(long, default_value_t = 1)]
        interval: u32,
        /// Stop after this many occurrences
        #[arg(long)]
        count: Option<u32>,
        /// Stop on this date (YYYY-MM-DD, exclusive)
        #[arg(long)]
        until: Option<String>,
        /// Reminder offsets in minutes before start
        #[arg(long, value_delimiter = ',')]
        remind: Vec<i64>,
    },
    /// List events
    List,
    /// Soft-delete an event or series
    Remove { id: String },
}

/// Run the event command.
pub fn run(action: EventAction) -> CliResult {
    match action {
        EventAction::Add {
            title,
            start,
            duration,
            repeat,
            interval,
            count,
            until,
            remind,
        } => {
            let start_at = parse_instant(&start)?;
            let mut item = Item::new_event(title, start_at, duration);
            item.reminder_offsets_min = remind;
            if let Some(freq) = repeat {
                item.rule = Some(build_rule(&freq, interval, count, until.as_deref())?);
            }

            let db = open_db()?;
            commit_item(&db, &item, false)?;
            println!("created event {}", item.id);
            reconcile_notifications(&db, &Config::load()?)?;
        }
        EventAction::List => {
            let db = open_db()?;
            let items = db.lock().unwrap().list_items()?;
            for item in items
                .iter()
                .filter(|i| i.kind == daybook_core::item::ItemKind::Event)
            {
                let series = if item.is_series() { " (series)" } else { "" };
                println!("{}  {}  {}{}", item.id, item.start_at, item.title, series);
            }
        }
        EventAction::Remove { id } => {
            let db = open_db()?;
            let Some(item) = db.lock().unwrap().get_item(&id)? else {
                return Err(format!("no such event: {id}").into());
            };
            commit_item(&db, &item, true)?;
            println!("removed {id}");
            reconcile_notifications(&db, &Config::load()?)?;
        }
    }
    Ok(())
}

pub fn build_rule(
    freq: &str,
    interval: u32,
    count: Option<u32>,
    until: Option<&str>,
) -> Result<RecurrenceRule, Box<dyn std::error::Error>> {
    let frequency = match freq {
        "daily" => Frequency::Daily,
        "weekly" => Frequency::Weekly,
        "monthly" => Frequency::Monthly,
        "yearly" => Frequency::Yearly,
        other => return Err(format!("unknown frequency: {other}").into()),
    };
    let termination = match (count, until) {
        (Some(n), _) => Termination::Count(n),
        (None, Some(date)) => Termination::Until(date.parse()?),
        (None, None) => Termination::Never,
    };
    Ok(RecurrenceRule::new(frequency, interval, termination))
}
