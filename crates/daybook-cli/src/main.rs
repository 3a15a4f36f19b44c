use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "daybook-cli", version, about = "Daybook CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Event management
    Event {
        #[command(subcommand)]
        action: commands::event::EventAction,
    },
    /// Task management
    Task {
        #[command(subcommand)]
        action: commands::task::TaskAction,
    },
    /// Single-occurrence edits (exceptions)
    Occurrence {
        #[command(subcommand)]
        action: commands::occurrence::OccurrenceAction,
    },
    /// Expanded agenda view
    Agenda {
        /// Days ahead to expand
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
    /// Synchronization against remote targets
    Sync {
        #[command(subcommand)]
        action: commands::sync::SyncAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Event { action } => commands::event::run(action),
        Commands::Task { action } => commands::task::run(action),
        Commands::Occurrence { action } => commands::occurrence::run(action),
        Commands::Agenda { days } => commands::agenda::run(days),
        Commands::Sync { action } => commands::sync::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
