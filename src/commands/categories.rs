// ABOUTME: `categories` command: list the distinct provider categories
// ABOUTME: Helps build include/exclude filters and the category table

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use super::{build_job, cancel_on_ctrl_c, load_config, Credentials};
use crate::sync::resolve_banks;

pub async fn categories(
    config_path: Option<&Path>,
    credentials: &Credentials,
    banks: Option<Vec<String>>,
    start_date: Option<NaiveDate>,
) -> Result<Vec<String>> {
    let config = load_config(config_path)?;
    resolve_banks(&config.banks, banks.as_deref())?;

    let job = build_job(config, credentials)?;
    let cancel = cancel_on_ctrl_c();
    let (categories, skipped) = job
        .list_categories(banks.as_deref(), start_date, &cancel)
        .await
        .context("Failed to list categories")?;

    for unit in &skipped {
        tracing::warn!("Skipped {}: {}", unit.scope, unit.reason);
    }
    for category in &categories {
        println!("{}", category);
    }
    Ok(categories)
}
