// ABOUTME: CLI entry point for ledger-export
// ABOUTME: Parses commands and routes to the run and categories handlers

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use ledger_export::commands::{self, Credentials, RunOptions};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ledger-export")]
#[command(about = "Incremental transaction export from the Pluggy aggregation API", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    /// Path to ledger-export.toml (defaults to ./ledger-export.toml, then ~/.ledger-export/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(flatten)]
    credentials: CredentialArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Default)]
struct CredentialArgs {
    /// Pluggy client id
    #[arg(long = "client-id", env = "PLUGGY_CLIENT_ID", global = true, hide_env_values = true)]
    client_id: Option<String>,
    /// Pluggy client secret
    #[arg(
        long = "client-secret",
        env = "PLUGGY_CLIENT_SECRET",
        global = true,
        hide_env_values = true
    )]
    client_secret: Option<String>,
}

impl From<CredentialArgs> for Credentials {
    fn from(args: CredentialArgs) -> Self {
        Credentials {
            client_id: args.client_id,
            client_secret: args.client_secret,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, reconcile and write a new incremental snapshot
    Run {
        /// Fetch from this date (YYYY-MM-DD) instead of the computed watermark
        #[arg(long)]
        start_date: Option<NaiveDate>,
        /// Export only these configured bank ids (comma-separated)
        #[arg(long, value_delimiter = ',')]
        banks: Option<Vec<String>>,
        /// Keep only these provider categories (comma-separated)
        #[arg(long, value_delimiter = ',')]
        include_categories: Option<Vec<String>>,
        /// Drop these provider categories (comma-separated)
        #[arg(long, value_delimiter = ',')]
        exclude_categories: Option<Vec<String>>,
        /// Directory for snapshot files (overrides the config)
        #[arg(long)]
        snapshot_dir: Option<PathBuf>,
        /// Compute the diff without writing snapshot files
        #[arg(long)]
        no_csv: bool,
    },
    /// List the distinct provider categories of the configured banks
    Categories {
        /// Only these configured bank ids (comma-separated)
        #[arg(long, value_delimiter = ',')]
        banks: Option<Vec<String>>,
        /// Read transactions from this date (YYYY-MM-DD); defaults to the
        /// configured start date, else one year back
        #[arg(long)]
        start_date: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // 1. RUST_LOG environment variable has highest precedence
    // 2. --log flag is used if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let credentials = Credentials::from(cli.credentials);

    match cli.command {
        Commands::Run {
            start_date,
            banks,
            include_categories,
            exclude_categories,
            snapshot_dir,
            no_csv,
        } => {
            commands::run(RunOptions {
                config_path: cli.config,
                credentials,
                start_date,
                banks,
                include_categories,
                exclude_categories,
                snapshot_dir,
                csv_enabled: !no_csv,
            })
            .await?;
        }
        Commands::Categories { banks, start_date } => {
            commands::categories(cli.config.as_deref(), &credentials, banks, start_date).await?;
        }
    }

    Ok(())
}
