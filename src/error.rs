// ABOUTME: Error taxonomy for provider access and export runs
// ABOUTME: Separates recoverable per-item/per-page failures from fatal ones

use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by a [`crate::provider::ProviderGateway`].
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider rejected the credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode provider response: {0}")]
    Decode(String),

    /// Used by gateways that are not backed by HTTP.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by an export run.
///
/// `ProviderFetch`, `RefreshTimeout` and `RefreshFailed` are scoped to a single
/// item, account or page: the run records them and moves on. `Validation` is
/// raised before any provider call. `Persistence` and `Cancelled` abort the run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to fetch {scope}: {source}")]
    ProviderFetch {
        scope: String,
        #[source]
        source: ProviderError,
    },

    #[error("item {item_id} was still refreshing after {attempts} status polls")]
    RefreshTimeout { item_id: String, attempts: u32 },

    #[error("item {item_id} refresh ended in error state ({execution_status})")]
    RefreshFailed {
        item_id: String,
        execution_status: String,
    },

    #[error("invalid export options: {0}")]
    Validation(String),

    #[error("snapshot I/O failed for {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("export cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn provider(scope: impl Into<String>, source: ProviderError) -> Self {
        SyncError::ProviderFetch {
            scope: scope.into(),
            source,
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, source: impl Into<std::io::Error>) -> Self {
        SyncError::Persistence {
            path: path.into(),
            source: source.into(),
        }
    }

    /// True when the error only affects one item, account or page.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SyncError::ProviderFetch { .. }
                | SyncError::RefreshTimeout { .. }
                | SyncError::RefreshFailed { .. }
        )
    }
}
