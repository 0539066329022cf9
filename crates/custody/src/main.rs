//! Custody command-line launcher
//!
//! - **sync**: initial scan of every project, then watch until Ctrl-C
//! - **scan**: initial scan only
//! - **status**: per-file or summary view of the state database
//! - **project**: manage project roots and their author descriptors

use anyhow::Result;
use clap::{Parser, Subcommand};
use custody_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

#[derive(Parser, Debug)]
#[command(
    name = "custody",
    version,
    about = "Durable file ingestion for digital evidence"
)]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Config file (default: ~/.custody/config.toml when it exists)
    #[arg(long, global = true, env = "CUSTODY_CONFIG")]
    config: Option<PathBuf>,

    /// State database path, overriding the config file
    #[arg(long, global = true, env = "CUSTODY_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan every project, then watch for new files until Ctrl-C
    Sync,

    /// Scan every project once and exit
    Scan {
        /// Output the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show ingestion status
    ///
    /// Examples:
    ///   custody status                      # Counts per status
    ///   custody status /data/note.txt       # One file
    ///   custody status --status error       # Failed files
    Status {
        /// File to look up
        path: Option<PathBuf>,

        /// List files in this status (found, uploading, success, error)
        #[arg(long)]
        status: Option<String>,

        /// Maximum files to list
        #[arg(long, default_value = "50")]
        limit: u32,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage projects
    Project {
        #[command(subcommand)]
        action: cli::project::ProjectAction,
    },
}

fn run_command(cli: Cli) -> Result<()> {
    let config = cli::load_config(cli.config.as_deref(), cli.database)?;

    match cli.command {
        Commands::Sync => cli::sync::run(cli::sync::SyncArgs {
            config,
            watch: true,
            json: false,
        }),

        Commands::Scan { json } => cli::sync::run(cli::sync::SyncArgs {
            config,
            watch: false,
            json,
        }),

        Commands::Status {
            path,
            status,
            limit,
            json,
        } => cli::status::run(
            cli::status::StatusArgs {
                path,
                status,
                limit,
                json,
            },
            &config,
        ),

        Commands::Project { action } => cli::project::run(action, &config),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match init_logging(LogConfig {
        app_name: "custody",
        verbose: cli.verbose,
    }) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: failed to initialize logging: {}", err);
            None
        }
    };

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:?}", err);
            ExitCode::from(1)
        }
    }
}
