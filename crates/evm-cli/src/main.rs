use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod lock;

#[derive(Parser)]
#[command(name = "evm")]
#[command(about = "Access-controller event mirror", long_about = None)]
struct Cli {
    /// Debug-level logging (overrides RUST_LOG)
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch missing controller events into the store (one run)
    GetEvents {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Store DSN (postgresql://... | sqlite3://<path>); falls back to EVM_DATABASE_URL
        #[arg(long)]
        dsn: Option<String>,

        /// Events table (overrides store.events_table)
        #[arg(long = "table-events")]
        table_events: Option<String>,

        /// Operations log table (overrides store.log_table)
        #[arg(long = "table-log")]
        table_log: Option<String>,

        /// Fetch budget per controller (overrides reconcile.batch_size)
        #[arg(long = "batch-size", value_parser = clap::value_parser!(u32).range(1..))]
        batch_size: Option<u32>,

        /// Single-instance lock file
        #[arg(long)]
        lockfile: Option<PathBuf>,
    },

    /// Store commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    /// Create the events (and log) tables; creates a SQLite file if missing
    Init {
        #[arg(long)]
        dsn: Option<String>,

        #[arg(long = "table-events", default_value = "events")]
        table_events: String,

        #[arg(long = "table-log")]
        table_log: Option<String>,
    },

    /// Connectivity and table presence
    Status {
        #[arg(long)]
        dsn: Option<String>,

        #[arg(long = "table-events", default_value = "events")]
        table_events: String,

        #[arg(long = "table-log")]
        table_log: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env.local if present (dev convenience); production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();
    init_tracing(cli.debug);

    match cli.cmd {
        Commands::GetEvents {
            config_paths,
            dsn,
            table_events,
            table_log,
            batch_size,
            lockfile,
        } => {
            commands::get_events::run(commands::get_events::GetEventsArgs {
                config_paths,
                dsn,
                table_events,
                table_log,
                batch_size,
                lockfile,
            })
            .await
        }

        Commands::Db { cmd } => {
            match cmd {
                DbCmd::Init {
                    dsn,
                    table_events,
                    table_log,
                } => commands::db::init(dsn, &table_events, table_log.as_deref()).await?,
                DbCmd::Status {
                    dsn,
                    table_events,
                    table_log,
                } => commands::db::status(dsn, &table_events, table_log.as_deref()).await?,
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::ConfigHash { paths } => {
            let loaded = evm_config::load_layered_yaml(paths.as_slice())?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Logs go to stderr; stdout carries the `key=value` report.
fn init_tracing(debug: bool) {
    let filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
