// ABOUTME: `run` command: one export with a progress bar and a summary
// ABOUTME: Validates options before touching the provider; Ctrl+C cancels cleanly

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};

use super::{build_job, cancel_on_ctrl_c, load_config, Credentials};
use crate::sync::{
    merge_options, resolve_banks, ExportOptionsOverride, ExportReport, ExportRequest,
    ProgressUpdate,
};

pub struct RunOptions {
    pub config_path: Option<PathBuf>,
    pub credentials: Credentials,
    pub start_date: Option<NaiveDate>,
    pub banks: Option<Vec<String>>,
    pub include_categories: Option<Vec<String>>,
    pub exclude_categories: Option<Vec<String>>,
    pub snapshot_dir: Option<PathBuf>,
    pub csv_enabled: bool,
}

impl RunOptions {
    fn request(&self) -> ExportRequest {
        ExportRequest {
            banks: self.banks.clone(),
            options: ExportOptionsOverride {
                start_date: self.start_date,
                include_categories: self.include_categories.clone(),
                exclude_categories: self.exclude_categories.clone(),
            },
            csv_enabled: self.csv_enabled,
        }
    }
}

pub async fn run(opts: RunOptions) -> Result<ExportReport> {
    let mut config = load_config(opts.config_path.as_deref())?;
    if let Some(dir) = &opts.snapshot_dir {
        config.snapshot.dir = dir.clone();
    }

    let request = opts.request();
    let banks = resolve_banks(&config.banks, request.banks.as_deref())?;
    merge_options(&config.options, &request.options)?;

    let job = build_job(config, &opts.credentials)?;
    let cancel = cancel_on_ctrl_c();

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos:>3}% {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("=> "),
    );
    bar.set_message(format!("exporting {} bank(s)", banks.len()));
    let sink = {
        let bar = bar.clone();
        move |update: ProgressUpdate| {
            bar.set_position(update.progress as u64);
            bar.set_message(update.step.as_str());
        }
    };

    let result = job.run(&request, &sink, &cancel).await;
    bar.finish_and_clear();
    let report = result.context("Export failed")?;

    print_summary(&report);
    Ok(report)
}

fn print_summary(report: &ExportReport) {
    let metrics = &report.metrics;
    println!();
    println!("========================================");
    println!("Export complete");
    println!("========================================");
    println!("  Transactions fetched:  {}", metrics.transactions_fetched);
    println!("  Installments created:  {}", metrics.installments_created);
    println!("  Duplicates removed:    {}", metrics.duplicates_removed);
    println!("  New rows:              {}", metrics.new_rows);

    match &report.artifacts.csv_path {
        Some(path) => println!("  Snapshot:              {}", path.display()),
        None => println!("  Snapshot:              (no new data)"),
    }
    if let Some(path) = &report.artifacts.removed_csv_path {
        println!("  Removed rows:          {}", path.display());
    }

    if !report.skipped.is_empty() {
        println!("  Skipped:               {}", report.skipped.len());
        for unit in &report.skipped {
            println!("    - {}: {}", unit.scope, unit.reason);
        }
    }
}
