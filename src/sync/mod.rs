// ABOUTME: Export pipeline: freshness, watermark, fetch, projection, reconciliation
// ABOUTME: ExportJob ties the stages together and writes the incremental snapshot

pub mod fetcher;
pub mod freshness;
pub mod installments;
pub mod pipeline;
pub mod reconciler;
pub mod watermark;

pub use fetcher::{AccountFetch, TransactionFetcher};
pub use freshness::{FreshnessCoordinator, FreshnessReport, FreshnessState, RefreshPolicy};
pub use installments::project;
pub use pipeline::{
    merge_options, resolve_banks, ExportArtifacts, ExportJob, ExportMetrics, ExportOptions,
    ExportOptionsOverride, ExportReport, ExportRequest, NoProgress, ProgressSink, ProgressStep,
    ProgressTracker, ProgressUpdate, SkippedUnit, CATEGORY_LOOKBACK_DAYS,
};
pub use reconciler::{reconcile, CanonicalKey, ReconciliationResult};

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::SyncError;

/// Await `future` unless the token fires first.
pub(crate) async fn until_cancelled<F: Future>(
    cancel: &CancellationToken,
    future: F,
) -> Result<F::Output, SyncError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        output = future => Ok(output),
    }
}
