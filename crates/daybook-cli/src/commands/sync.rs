//! Sync subcommand.

use clap::Subcommand;
use std::sync::Arc;

use daybook_core::storage::Config;
use daybook_core::sync::{
    AuthState, BackendTarget, CalendarTarget, Origin, SyncCoordinator, SyncTarget,
};

use super::{open_db, reconcile_notifications, CliResult};

/// Sync actions.
#[derive(Subcommand)]
pub enum SyncAction {
    /// Run one sync cycle against the configured targets
    Now {
        /// Only this target (backend, calendar)
        #[arg(long)]
        target: Option<String>,
    },
    /// Keep syncing on the configured interval until interrupted
    Watch,
    /// Show sync status per target
    Status,
}

/// Run the sync command.
pub fn run(action: SyncAction) -> CliResult {
    let config = Config::load()?;
    let db = open_db()?;

    let targets = build_targets(&config)?;
    if targets.is_empty() {
        return Err("no sync targets configured; set sync.backend_url or sync.calendar_url".into());
    }
    let required: Vec<Origin> = targets.iter().map(|t| t.origin()).collect();

    match action {
        SyncAction::Now { target } => {
            let runtime = tokio::runtime::Runtime::new()?;
            for sync_target in targets {
                let origin = sync_target.origin();
                if let Some(only) = &target {
                    if origin.as_str() != only {
                        continue;
                    }
                }
                let coordinator = SyncCoordinator::new(
                    sync_target,
                    db.clone(),
                    required.clone(),
                    &config.sync,
                );
                match runtime.block_on(coordinator.sync_cycle()) {
                    Ok(report) => {
                        println!(
                            "{}: pulled {}, applied {}, pushed {}",
                            origin.as_str(),
                            report.pulled,
                            report.applied,
                            report.pushed
                        );
                        for record_id in &report.exhausted {
                            eprintln!(
                                "warning: {} gave up pushing {record_id} after repeated failures",
                                origin.as_str()
                            );
                        }
                    }
                    // One target failing never aborts the other.
                    Err(e) => eprintln!("{} sync failed: {e}", origin.as_str()),
                }
            }
            reconcile_notifications(&db, &config)?;
        }
        SyncAction::Watch => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(async {
                // Held for the whole watch session; dropping it would
                // wake every run loop.
                let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
                let mut set = tokio::task::JoinSet::new();
                for sync_target in targets {
                    let coordinator = Arc::new(SyncCoordinator::new(
                        sync_target,
                        db.clone(),
                        required.clone(),
                        &config.sync,
                    ));
                    println!("watching {}", coordinator.origin().as_str());
                    let shutdown = shutdown_rx.clone();
                    set.spawn(async move { coordinator.run(shutdown).await });
                }
                while set.join_next().await.is_some() {}
            });
        }
        SyncAction::Status => {
            for sync_target in targets {
                let coordinator =
                    SyncCoordinator::new(sync_target, db.clone(), required.clone(), &config.sync);
                let status = coordinator.status();
                println!(
                    "{}: {:?}, {} pending, last sync {}",
                    status.target.as_str(),
                    status.phase,
                    status.pending_count,
                    status
                        .last_sync_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".to_string()),
                );
            }
            let reminders = db.lock().unwrap().scheduled_notifications()?.len();
            println!("{reminders} reminders scheduled");
        }
    }
    Ok(())
}

fn build_targets(config: &Config) -> Result<Vec<Arc<dyn SyncTarget>>, Box<dyn std::error::Error>> {
    let mut targets: Vec<Arc<dyn SyncTarget>> = Vec::new();
    if !config.sync.backend_url.is_empty() {
        targets.push(Arc::new(BackendTarget::new(
            config.sync.backend_url.clone(),
            std::env::var("DAYBOOK_BACKEND_TOKEN").ok(),
        )));
    }
    if !config.sync.calendar_url.is_empty() {
        targets.push(Arc::new(CalendarTarget::new(
            config.sync.calendar_url.clone(),
            std::env::var("DAYBOOK_CALENDAR_TOKEN").ok(),
            AuthState::ReadWrite,
        )));
    }
    Ok(targets)
}
