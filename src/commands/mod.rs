// ABOUTME: Command implementations for the ledger-export CLI
// ABOUTME: Exports the run and categories commands plus shared job construction

pub mod categories;
pub mod run;

pub use categories::categories;
pub use run::{run, RunOptions};

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::ExportConfig;
use crate::provider::PluggyClient;
use crate::sync::ExportJob;

/// Provider credentials as received from flags or the environment.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl Credentials {
    fn require(&self) -> Result<(String, String)> {
        let client_id = self
            .client_id
            .clone()
            .filter(|v| !v.trim().is_empty())
            .context("Provider client id not set. Use --client-id or PLUGGY_CLIENT_ID")?;
        let client_secret = self
            .client_secret
            .clone()
            .filter(|v| !v.trim().is_empty())
            .context("Provider client secret not set. Use --client-secret or PLUGGY_CLIENT_SECRET")?;
        Ok((client_id, client_secret))
    }
}

pub fn load_config(path: Option<&Path>) -> Result<ExportConfig> {
    ExportConfig::load(path).context("Failed to load configuration")
}

/// Build an export job backed by the Pluggy HTTP client.
pub fn build_job(config: ExportConfig, credentials: &Credentials) -> Result<ExportJob> {
    let (client_id, client_secret) = credentials.require()?;
    let client = PluggyClient::new(config.provider.base_url.as_deref(), client_id, client_secret)
        .context("Failed to create provider client")?;
    Ok(ExportJob::new(Arc::new(client), config))
}

/// Cancellation token that fires on Ctrl+C.
pub(crate) fn cancel_on_ctrl_c() -> tokio_util::sync::CancellationToken {
    let cancel = tokio_util::sync::CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received Ctrl+C, cancelling export");
            trigger.cancel();
        }
    });
    cancel
}
