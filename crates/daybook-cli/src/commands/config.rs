//! Configuration subcommand.

use clap::Subcommand;

use daybook_core::storage::Config;
use daybook_core::sync::ConflictPolicy;

use super::CliResult;

/// Config actions.
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the current configuration
    Show,
    /// Set the conflict resolution policy (newer-wins, local-wins, remote-wins)
    SetPolicy { policy: String },
    /// Set the daily summary time (HH:mm), or clear it
    SetSummary {
        /// Time of day, e.g. 08:30; omit to disable
        time: Option<String>,
    },
    /// Set default reminder offsets in minutes (comma separated)
    SetReminders {
        #[arg(value_delimiter = ',')]
        offsets: Vec<i64>,
    },
    /// Set the remote backend URL (empty disables)
    SetBackend { url: String },
    /// Set the external calendar URL (empty disables)
    SetCalendar { url: String },
}

/// Run the config command.
pub fn run(action: ConfigAction) -> CliResult {
    let mut config = Config::load()?;
    match action {
        ConfigAction::Show => {
            print!("{}", toml::to_string_pretty(&config)?);
            return Ok(());
        }
        ConfigAction::SetPolicy { policy } => {
            config.sync.conflict_policy = policy.parse::<ConflictPolicy>()?;
        }
        ConfigAction::SetSummary { time } => {
            config.notifications.daily_summary = time;
            if config.notifications.daily_summary.is_some() && config.daily_summary_time().is_none()
            {
                return Err("summary time must be HH:mm".into());
            }
        }
        ConfigAction::SetReminders { offsets } => {
            config.notifications.default_offsets_min = offsets;
        }
        ConfigAction::SetBackend { url } => {
            config.sync.backend_url = url;
        }
        ConfigAction::SetCalendar { url } => {
            config.sync.calendar_url = url;
        }
    }
    config.save()?;
    println!("saved");
    Ok(())
}
