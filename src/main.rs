mod commands;
mod config;
mod lock;
mod workbook;

use anyhow::Result;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tabsync")]
#[command(about = "Sync workbook day sheets to calendars and rebuild the two-week overview")]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Day the two-week window is computed from (defaults to today)
    #[arg(long, global = true)]
    today: Option<NaiveDate>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append the events of the two-week window to the overview sheet
    AppendOverview,
    /// Delete every row of the overview sheet below its header
    ClearOverview,
    /// Clear the overview sheet, then append the two-week window
    SyncOverview,
    /// Create or update calendar events for every day sheet of the window
    SyncCalendar,
    /// Show the calendar event ids persisted in a day sheet
    SyncState {
        /// Day of the sheet (e.g., "2025-03-10")
        day: NaiveDate,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let today = cli.today.unwrap_or_else(|| Local::now().date_naive());

    match cli.command {
        Commands::AppendOverview => commands::overview::append(today),
        Commands::ClearOverview => commands::overview::clear(today),
        Commands::SyncOverview => commands::overview::sync(today),
        Commands::SyncCalendar => commands::calendar::sync(today),
        Commands::SyncState { day } => commands::state::show(day),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
