// ABOUTME: One export run from request validation to snapshot files
// ABOUTME: Per-item freshness and fetch, then projection, reconciliation, diff, and write

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::fetcher::TransactionFetcher;
use super::freshness::{FreshnessCoordinator, RefreshPolicy};
use super::installments::project;
use super::reconciler::reconcile;
use super::until_cancelled;
use super::watermark;
use crate::config::{BankConfig, ExportConfig, OptionsConfig};
use crate::error::SyncError;
use crate::filters::CategoryFilter;
use crate::models::{AccountContext, AccountType, TransactionRecord};
use crate::provider::ProviderGateway;
use crate::snapshot::{diff, DiffOutcome, SnapshotKind, SnapshotRow, SnapshotStore};

/// Default category listing window when no start date is known.
pub const CATEGORY_LOOKBACK_DAYS: i64 = 365;

/// Per-request overrides of the configured options. Unset fields keep the default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportOptionsOverride {
    pub start_date: Option<NaiveDate>,
    pub include_categories: Option<Vec<String>>,
    pub exclude_categories: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    /// Configured bank ids to export; all when unset or empty
    #[serde(default)]
    pub banks: Option<Vec<String>>,
    #[serde(default)]
    pub options: ExportOptionsOverride,
    /// Write snapshot files; when false the run stops after diffing
    #[serde(default = "csv_enabled_default")]
    pub csv_enabled: bool,
}

fn csv_enabled_default() -> bool {
    true
}

impl Default for ExportRequest {
    fn default() -> Self {
        Self {
            banks: None,
            options: ExportOptionsOverride::default(),
            csv_enabled: true,
        }
    }
}

/// Validated options for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportOptions {
    pub start_date: Option<NaiveDate>,
    pub filter: CategoryFilter,
}

/// Overlay request options on the configured defaults and validate them.
pub fn merge_options(
    defaults: &OptionsConfig,
    overrides: &ExportOptionsOverride,
) -> Result<ExportOptions, SyncError> {
    let include = overrides
        .include_categories
        .clone()
        .or_else(|| defaults.include_categories.clone());
    let exclude = overrides
        .exclude_categories
        .clone()
        .or_else(|| defaults.exclude_categories.clone());

    Ok(ExportOptions {
        start_date: overrides.start_date.or(defaults.start_date),
        filter: CategoryFilter::new(include, exclude)?,
    })
}

/// Configured banks selected by id, in configured order.
///
/// No ids selects every configured bank. Unknown ids are ignored, but a
/// selection that leaves nothing to export is rejected.
pub fn resolve_banks(
    configured: &[BankConfig],
    requested: Option<&[String]>,
) -> Result<Vec<BankConfig>, SyncError> {
    let banks: Vec<BankConfig> = match requested {
        Some(ids) if !ids.is_empty() => configured
            .iter()
            .filter(|bank| ids.iter().any(|id| id == &bank.id))
            .cloned()
            .collect(),
        _ => configured.to_vec(),
    };

    if banks.is_empty() {
        return Err(SyncError::Validation(
            "no valid bank selected for export".to_string(),
        ));
    }
    Ok(banks)
}

/// Named pipeline stages reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressStep {
    Fetching,
    ProjectingInstallments,
    Deduplicating,
    Diffing,
    Writing,
    Finalizing,
}

impl ProgressStep {
    pub fn percent(&self) -> u8 {
        match self {
            ProgressStep::Fetching => 20,
            ProgressStep::ProjectingInstallments => 45,
            ProgressStep::Deduplicating => 65,
            ProgressStep::Diffing => 75,
            ProgressStep::Writing => 85,
            ProgressStep::Finalizing => 99,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStep::Fetching => "FETCHING",
            ProgressStep::ProjectingInstallments => "PROJECTING_INSTALLMENTS",
            ProgressStep::Deduplicating => "DEDUPLICATING",
            ProgressStep::Diffing => "DIFFING",
            ProgressStep::Writing => "WRITING",
            ProgressStep::Finalizing => "FINALIZING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub step: ProgressStep,
    pub progress: u8,
}

/// Receives progress updates from a run.
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        self(update)
    }
}

/// Discards progress updates.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _update: ProgressUpdate) {}
}

/// Forwards updates whose percentage does not go backwards.
pub struct ProgressTracker<'a> {
    sink: &'a dyn ProgressSink,
    last: u8,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self { sink, last: 0 }
    }

    pub fn advance(&mut self, step: ProgressStep) {
        let progress = step.percent();
        if progress < self.last {
            tracing::debug!("Ignoring progress regression to {}", step.as_str());
            return;
        }
        self.last = progress;
        self.sink.report(ProgressUpdate { step, progress });
    }

    pub fn last(&self) -> u8 {
        self.last
    }
}

/// A unit of work (item, account listing, page) that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedUnit {
    pub scope: String,
    pub reason: String,
}

impl SkippedUnit {
    fn new(scope: impl Into<String>, error: &SyncError) -> Self {
        Self {
            scope: scope.into(),
            reason: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetrics {
    pub transactions_fetched: usize,
    pub installments_created: usize,
    pub duplicates_removed: usize,
    pub new_rows: usize,
    pub skipped_units: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportArtifacts {
    pub csv_path: Option<PathBuf>,
    pub removed_csv_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct ExportReport {
    pub metrics: ExportMetrics,
    pub artifacts: ExportArtifacts,
    pub skipped: Vec<SkippedUnit>,
    /// Survivors of reconciliation, observed and projected
    pub reconciled: Vec<TransactionRecord>,
    /// Rows that were not in the previous snapshot
    pub new_rows: Vec<SnapshotRow>,
}

/// Records gathered across all items, plus what had to be skipped.
#[derive(Debug, Default)]
struct Gathered {
    records: Vec<TransactionRecord>,
    skipped: Vec<SkippedUnit>,
}

/// Runs exports against a provider gateway.
pub struct ExportJob {
    gateway: Arc<dyn ProviderGateway>,
    config: ExportConfig,
    clock: Option<DateTime<Utc>>,
}

impl ExportJob {
    pub fn new(gateway: Arc<dyn ProviderGateway>, config: ExportConfig) -> Self {
        Self {
            gateway,
            config,
            clock: None,
        }
    }

    /// Pin "now" for freshness checks, watermarks and file names.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.clock = Some(now);
        self
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or_else(Utc::now)
    }

    fn offset(&self) -> Result<FixedOffset, SyncError> {
        self.config
            .reference_offset()
            .map_err(|e| SyncError::Validation(e.to_string()))
    }

    /// Run one export.
    ///
    /// Options and banks are validated before any provider call. Item,
    /// account and page failures are skipped and listed in the report;
    /// snapshot I/O failures and cancellation abort the run.
    pub async fn run(
        &self,
        request: &ExportRequest,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<ExportReport, SyncError> {
        let banks = resolve_banks(&self.config.banks, request.banks.as_deref())?;
        let options = merge_options(&self.config.options, &request.options)?;
        let offset = self.offset()?;
        let now = self.now();
        let mut tracker = ProgressTracker::new(progress);

        let store = SnapshotStore::from_config(&self.config.snapshot);
        let snapshots = store.snapshots()?;
        let previous = snapshots.last();
        let last_snapshot_date = previous.map(|file| watermark::local_date(offset, file.taken_at));

        tracing::info!(
            "Starting export of {} bank(s) into {}, {} earlier snapshot(s), last {}",
            banks.len(),
            store.dir().display(),
            snapshots.len(),
            previous
                .map(|f| f.path.display().to_string())
                .unwrap_or_else(|| "none".to_string())
        );
        if !options.filter.is_empty() {
            tracing::info!(
                "Category filter: include {:?}, exclude {:?}",
                options.filter.include_categories(),
                options.filter.exclude_categories()
            );
        }

        tracker.advance(ProgressStep::Fetching);
        let gathered = self
            .gather(&banks, &options, last_snapshot_date, now, cancel)
            .await?;
        let fetched = gathered.records.len();

        tracker.advance(ProgressStep::ProjectingInstallments);
        let projected = project(gathered.records);
        let installments_created = projected.len() - fetched;

        tracker.advance(ProgressStep::Deduplicating);
        let reconciled = reconcile(projected);

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        tracker.advance(ProgressStep::Diffing);
        let rows: Vec<SnapshotRow> = reconciled
            .survivors
            .iter()
            .map(|record| SnapshotRow::from_record(record, &self.config))
            .collect();
        let known: Vec<PathBuf> = snapshots.iter().map(|f| f.path.clone()).collect();
        let outcome = diff(rows, &known)?;
        tracing::debug!("{} candidate row(s) are new", outcome.new_row_count());

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let mut artifacts = ExportArtifacts::default();
        if request.csv_enabled {
            tracker.advance(ProgressStep::Writing);
            if let DiffOutcome::NewRows(rows) = &outcome {
                artifacts.csv_path = Some(store.write(SnapshotKind::Snapshot, rows, now)?);
            } else {
                tracing::info!("No new data since the last snapshot, nothing written");
            }
            if !reconciled.removed.is_empty() {
                let removed_rows: Vec<SnapshotRow> = reconciled
                    .removed
                    .iter()
                    .map(|record| SnapshotRow::from_record(record, &self.config))
                    .collect();
                artifacts.removed_csv_path =
                    Some(store.write(SnapshotKind::Removed, &removed_rows, now)?);
            }
        }

        tracker.advance(ProgressStep::Finalizing);

        let new_rows = match outcome {
            DiffOutcome::NewRows(rows) => rows,
            DiffOutcome::NoNewData => Vec::new(),
        };
        let metrics = ExportMetrics {
            transactions_fetched: fetched,
            installments_created,
            duplicates_removed: reconciled.removed.len(),
            new_rows: new_rows.len(),
            skipped_units: gathered.skipped.len(),
        };

        tracing::info!(
            "Export finished: {} fetched, {} installment(s) projected, {} duplicate(s) removed, {} new row(s), {} skipped",
            metrics.transactions_fetched,
            metrics.installments_created,
            metrics.duplicates_removed,
            metrics.new_rows,
            metrics.skipped_units
        );

        Ok(ExportReport {
            metrics,
            artifacts,
            skipped: gathered.skipped,
            reconciled: reconciled.survivors,
            new_rows,
        })
    }

    /// Distinct provider categories across the selected banks, sorted.
    ///
    /// Category filters are not applied and the snapshot watermark is
    /// ignored: transactions are read from `start_date`, else the configured
    /// start date, else [`CATEGORY_LOOKBACK_DAYS`] before today.
    pub async fn list_categories(
        &self,
        banks: Option<&[String]>,
        start_date: Option<NaiveDate>,
        cancel: &CancellationToken,
    ) -> Result<(Vec<String>, Vec<SkippedUnit>), SyncError> {
        let banks = resolve_banks(&self.config.banks, banks)?;
        let now = self.now();
        let from = match start_date.or(self.config.options.start_date) {
            Some(date) => date,
            None => {
                let today = watermark::today_in(self.offset()?, now);
                today - chrono::Duration::days(CATEGORY_LOOKBACK_DAYS)
            }
        };
        let options = ExportOptions {
            start_date: Some(from),
            filter: CategoryFilter::empty(),
        };
        tracing::info!("Listing categories from {}", from);

        let gathered = self
            .gather(&banks, &options, None, now, cancel)
            .await?;

        let mut categories: Vec<String> = gathered
            .records
            .iter()
            .filter_map(|record| record.transaction.category.clone())
            .filter(|category| !category.is_empty())
            .collect();
        categories.sort();
        categories.dedup();
        Ok((categories, gathered.skipped))
    }

    /// Fetch every selected item, sequentially, skipping what fails.
    async fn gather(
        &self,
        banks: &[BankConfig],
        options: &ExportOptions,
        last_snapshot_date: Option<NaiveDate>,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Gathered, SyncError> {
        let offset = self.offset()?;
        let today = watermark::today_in(offset, now);
        let gateway = self.gateway.as_ref();
        let coordinator =
            FreshnessCoordinator::new(gateway, RefreshPolicy::from(&self.config.refresh));
        let fetcher = TransactionFetcher::new(gateway, self.config.fetch.page_size);
        let mut gathered = Gathered::default();

        for bank in banks {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let freshness = match coordinator.ensure_fresh(&bank.id, now, cancel).await {
                Ok(report) => report,
                Err(e) if !e.is_recoverable() => return Err(e),
                Err(e) => {
                    tracing::warn!("Skipping item {} ({}): {}", bank.id, bank.name, e);
                    gathered
                        .skipped
                        .push(SkippedUnit::new(format!("item {}", bank.id), &e));
                    continue;
                }
            };

            let bank_name = if bank.name.trim().is_empty() {
                freshness.connector_name.clone().unwrap_or_default()
            } else {
                bank.name.clone()
            };
            let item_updated = freshness
                .previous_updated_at
                .map(|t| watermark::local_date(offset, t));
            let watermark =
                watermark::resolve(options.start_date, last_snapshot_date, item_updated, today);
            tracing::info!(
                "Fetching {} ({}) from {}",
                bank_name,
                bank.id,
                watermark
            );

            for account_type in AccountType::ALL {
                let listed =
                    until_cancelled(cancel, gateway.list_accounts(&bank.id, account_type)).await?;
                let accounts = match listed {
                    Ok(accounts) => accounts,
                    Err(e) => {
                        let err = SyncError::provider(
                            format!("{} accounts of item {}", account_type, bank.id),
                            e,
                        );
                        tracing::warn!("Skipping {}", err);
                        gathered.skipped.push(SkippedUnit::new(
                            format!("item {} {} accounts", bank.id, account_type),
                            &err,
                        ));
                        continue;
                    }
                };

                for account in accounts {
                    let context = AccountContext {
                        account_id: account.id.clone(),
                        account_type,
                        owner_name: account.owner.clone().unwrap_or_default(),
                        bank_name: bank_name.clone(),
                    };

                    let fetch = fetcher
                        .fetch(&account.id, watermark, &options.filter, cancel)
                        .await?;
                    if let Some(failure) = &fetch.failure {
                        gathered.skipped.push(SkippedUnit::new(
                            format!("account {} page {}", account.id, fetch.pages + 1),
                            failure,
                        ));
                    }

                    tracing::debug!(
                        "Account {}: {} transaction(s) over {} page(s), {} filtered out",
                        account.id,
                        fetch.transactions.len(),
                        fetch.pages,
                        fetch.filtered_out
                    );
                    gathered.records.extend(
                        fetch
                            .transactions
                            .into_iter()
                            .map(|tx| TransactionRecord::observed(tx, context.clone())),
                    );
                }
            }
        }

        Ok(gathered)
    }
}
