//! Task subcommand.

use chrono::Utc;
use clap::Subcommand;

use daybook_core::item::{Item, ItemKind};
use daybook_core::storage::Config;

use super::{commit_item, open_db, parse_instant, reconcile_notifications, CliResult};

/// Task actions.
#[derive(Subcommand)]
pub enum TaskAction {
    /// Create a task (optionally recurring)
    Add {
        title: String,
        /// Due instant, e.g. 2026-09-01T17:00
        #[arg(long)]
        due: String,
        /// Expected duration in minutes
        #[arg(long, default_value_t = 30)]
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
        /// Reminder offsets in minutes before the due time
        #[arg(long, value_delimiter = ',')]
        remind: Vec<i64>,
    },
    /// Toggle completion
    Done { id: String },
    /// List tasks
    List,
    /// Soft-delete a task
    Remove { id: String },
}

/// Run the task command.
pub fn run(action: TaskAction) -> CliResult {
    match action {
        TaskAction::Add {
            title,
            due,
            duration,
            repeat,
            interval,
            count,
            remind,
        } => {
            let start_at = parse_instant(&due)?;
            let mut item = Item::new_task(title, start_at, duration);
            item.reminder_offsets_min = remind;
            if let Some(freq) = repeat {
                item.rule = Some(super::event::build_rule(&freq, interval, count, None)?);
            }

            let db = open_db()?;
            commit_item(&db, &item, false)?;
            println!("created task {}", item.id);
            reconcile_notifications(&db, &Config::load()?)?;
        }
        TaskAction::Done { id } => {
            let db = open_db()?;
            let Some(mut item) = db.lock().unwrap().get_item(&id)? else {
                return Err(format!("no such task: {id}").into());
            };
            let completed = item.toggle_completion(Utc::now())?;
            commit_item(&db, &item, false)?;
            println!("{} {}", if completed { "completed" } else { "reopened" }, id);
            reconcile_notifications(&db, &Config::load()?)?;
        }
        TaskAction::List => {
            let db = open_db()?;
            let items = db.lock().unwrap().list_items()?;
            for item in items.iter().filter(|i| i.kind == ItemKind::Task) {
                let mark = if item.is_completed() { "x" } else { " " };
                println!("[{mark}] {}  {}  {}", item.id, item.start_at, item.title);
            }
        }
        TaskAction::Remove { id } => {
            let db = open_db()?;
            let Some(item) = db.lock().unwrap().get_item(&id)? else {
                return Err(format!("no such task: {id}").into());
            };
            commit_item(&db, &item, true)?;
            println!("removed {id}");
            reconcile_notifications(&db, &Config::load()?)?;
        }
    }
    Ok(())
}
