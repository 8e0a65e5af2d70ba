//! hangar: CLI for work-order man-hour tracking.
//!
//! Drives the session engine against the shared SQLite log. Conflict
//! confirmation, candidate selection, and final-status/evidence supply all
//! happen here; the engine only hands back the variants to act on.
//!
//! ## Subcommands
//!
//! - `start`: begin a work session on a finding
//! - `stop`: stop a session (pass-through or last-worker finalization)
//! - `status`: catalog snapshot with live session timers
//! - `log`: dump the performing log
//! - `seed`: load a work-order snapshot (info, findings, materials)

mod commands;

use clap::{Parser, Subcommand};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hangar")]
#[command(about = "Work-order man-hour tracker")]
#[command(version)]
struct Cli {
    /// Path to the work log database (defaults to the platform data dir)
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Begin a work session on a finding
    Start {
        /// Finding identifier
        #[arg(long)]
        finding: String,

        /// Employee identifier
        #[arg(long)]
        employee: String,

        /// Task code (e.g. MNT, INSP)
        #[arg(long)]
        task: String,

        /// Confirm joining a finding other mechanics are already working
        #[arg(long)]
        join: bool,
    },

    /// Stop a work session
    Stop {
        /// Finding identifier
        #[arg(long)]
        finding: String,

        /// Employee to stop (required when several are active)
        #[arg(long)]
        employee: Option<String>,

        /// Final status when stopping as the last worker
        /// (IN_PROGRESS, ON_HOLD or CLOSED)
        #[arg(long)]
        status: Option<String>,

        /// Evidence file, mandatory when closing
        #[arg(long, value_name = "FILE")]
        evidence: Option<PathBuf>,
    },

    /// Show the work order with active sessions and timers
    Status {
        /// Limit the view to one finding
        #[arg(long)]
        finding: Option<String>,
    },

    /// Print the performing log
    Log {
        /// Limit the log to one finding
        #[arg(long)]
        finding: Option<String>,
    },

    /// Load a work-order snapshot from a JSON file
    Seed {
        /// Snapshot file with info, findings and materials
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let db_path = match cli.db.or_else(default_db_path) {
        Some(path) => path,
        None => {
            tracing::error!("Cannot determine a data directory; pass --db");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Start {
            finding,
            employee,
            task,
            join,
        } => commands::run_start(&db_path, &finding, &employee, &task, join),
        Commands::Stop {
            finding,
            employee,
            status,
            evidence,
        } => commands::run_stop(
            &db_path,
            &finding,
            employee.as_deref(),
            status.as_deref(),
            evidence.as_deref(),
        ),
        Commands::Status { finding } => commands::run_status(&db_path, finding.as_deref()),
        Commands::Log { finding } => commands::run_log(&db_path, finding.as_deref()),
        Commands::Seed { file } => commands::run_seed(&db_path, &file),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "hangar command failed");
        std::process::exit(1);
    }
}

fn init_logging() {
    let debug_enabled = env::var("HANGAR_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn default_db_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("hangar").join("worklog.db"))
}
