// ABOUTME: export-server entry point
// ABOUTME: Loads config and credentials, then serves the execution API until Ctrl+C

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use export_server::{build_router, AppState};
use ledger_export::commands::{build_job, load_config, Credentials};

#[derive(Parser)]
#[command(name = "export-server")]
#[command(about = "HTTP API for starting and polling ledger-export runs", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log: String,
    /// Path to ledger-export.toml
    #[arg(long)]
    config: Option<PathBuf>,
    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,
    /// Pluggy client id
    #[arg(long = "client-id", env = "PLUGGY_CLIENT_ID", hide_env_values = true)]
    client_id: Option<String>,
    /// Pluggy client secret
    #[arg(long = "client-secret", env = "PLUGGY_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = load_config(cli.config.as_deref())?;
    let credentials = Credentials {
        client_id: cli.client_id,
        client_secret: cli.client_secret,
    };
    let state = AppState::new(build_job(config, &credentials)?);
    let shutdown = state.shutdown.clone();
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", cli.host, cli.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("export-server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutting down, cancelling running exports");
            }
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    Ok(())
}
