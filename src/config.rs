// ABOUTME: Export configuration loaded from ledger-export.toml
// ABOUTME: Banks, default options, polling limits, snapshot location, and category table

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

/// File name searched in the working directory when no `--config` is given.
pub const LOCAL_CONFIG_FILE: &str = "ledger-export.toml";

/// A linked provider item exported under a display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankConfig {
    /// Provider item id
    pub id: String,
    /// Name written to the Bank column
    pub name: String,
}

/// Default export options, overridable per request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionsConfig {
    pub start_date: Option<NaiveDate>,
    pub include_categories: Option<Vec<String>>,
    pub exclude_categories: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Items whose last update is older than this are refreshed before fetching
    pub stale_after_secs: u64,
    pub poll_interval_ms: u64,
    /// Upper bound on status polls while an item refreshes
    pub max_attempts: u32,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 86_400,
            poll_interval_ms: 2_000,
            max_attempts: 90,
        }
    }
}

impl RefreshConfig {
    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_after_secs as i64)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub page_size: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { page_size: 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub dir: PathBuf,
    pub prefix: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            prefix: "transactions".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: Option<String>,
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub banks: Vec<BankConfig>,
    pub options: OptionsConfig,
    pub refresh: RefreshConfig,
    pub fetch: FetchConfig,
    pub snapshot: SnapshotConfig,
    /// Offset of the provider's home timezone, used for "today" and snapshot dates
    pub reference_utc_offset_minutes: i32,
    /// Display category => provider categories folded into it
    pub categories: BTreeMap<String, Vec<String>>,
    pub provider: ProviderConfig,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            banks: Vec::new(),
            options: OptionsConfig::default(),
            refresh: RefreshConfig::default(),
            fetch: FetchConfig::default(),
            snapshot: SnapshotConfig::default(),
            reference_utc_offset_minutes: -180,
            categories: BTreeMap::new(),
            provider: ProviderConfig::default(),
        }
    }
}

impl ExportConfig {
    /// Load configuration
    ///
    /// An explicit path must exist. Otherwise `./ledger-export.toml` and then
    /// `~/.ledger-export/config.toml` are tried, falling back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        for candidate in default_locations() {
            if candidate.exists() {
                tracing::debug!("Using configuration from {}", candidate.display());
                return Self::from_file(&candidate);
            }
        }

        tracing::debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: ExportConfig = toml::from_str(contents).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.reference_offset()?;
        if self.fetch.page_size == 0 {
            anyhow::bail!("fetch.page_size must be greater than zero");
        }
        if self.refresh.max_attempts == 0 {
            anyhow::bail!("refresh.max_attempts must be greater than zero");
        }
        if self.snapshot.prefix.trim().is_empty() {
            anyhow::bail!("snapshot.prefix cannot be empty");
        }
        for bank in &self.banks {
            if bank.id.trim().is_empty() {
                anyhow::bail!("bank '{}' has an empty id", bank.name);
            }
        }
        Ok(())
    }

    /// The reference timezone as a fixed offset.
    pub fn reference_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.reference_utc_offset_minutes * 60).with_context(|| {
            format!(
                "reference_utc_offset_minutes out of range: {}",
                self.reference_utc_offset_minutes
            )
        })
    }

    /// Display label for a provider category.
    ///
    /// Unmapped categories pass through unchanged; a missing category is empty.
    pub fn category_label(&self, category: Option<&str>) -> String {
        let Some(category) = category.filter(|c| !c.is_empty()) else {
            return String::new();
        };

        self.categories
            .iter()
            .find(|(_, members)| members.iter().any(|m| m == category))
            .map(|(label, _)| label.clone())
            .unwrap_or_else(|| category.to_string())
    }
}

fn default_locations() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
    if let Some(home) = dirs::home_dir() {
        locations.push(home.join(".ledger-export").join("config.toml"));
    }
    locations
}
