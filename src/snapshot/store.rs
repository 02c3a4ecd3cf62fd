// ABOUTME: Timestamped snapshot files in the output directory
// ABOUTME: Lists earlier snapshots oldest first and writes new files without overwriting

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};

use super::format::{write_rows, SnapshotRow};
use crate::config::SnapshotConfig;
use crate::error::SyncError;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";
const REMOVED_INFIX: &str = "removed";

/// What a written file contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    /// New rows of a run
    Snapshot,
    /// Records superseded during reconciliation, kept for audit
    Removed,
}

/// A snapshot file and the UTC instant embedded in its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    pub path: PathBuf,
    pub taken_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    prefix: String,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn from_config(config: &SnapshotConfig) -> Self {
        Self::new(&config.dir, &config.prefix)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a snapshot taken at `at`.
    pub fn file_name(&self, kind: SnapshotKind, at: DateTime<Utc>) -> String {
        let timestamp = at.format(TIMESTAMP_FORMAT);
        match kind {
            SnapshotKind::Snapshot => format!("{}_{}.csv", self.prefix, timestamp),
            SnapshotKind::Removed => {
                format!("{}_{}_{}.csv", self.prefix, REMOVED_INFIX, timestamp)
            }
        }
    }

    /// Timestamp of a snapshot file name, `None` for removed-row files and
    /// anything not written by this store.
    fn parse_file_name(&self, name: &str) -> Option<DateTime<Utc>> {
        let stem = name.strip_suffix(".csv")?;
        let timestamp = stem.strip_prefix(&self.prefix)?.strip_prefix('_')?;
        NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// Every snapshot in the directory, oldest first; empty when the
    /// directory is missing. Removed-row files and foreign files are skipped.
    pub fn snapshots(&self) -> Result<Vec<SnapshotFile>, SyncError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SyncError::persistence(&self.dir, e)),
        };

        let mut snapshots = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SyncError::persistence(&self.dir, e))?;
            let name = entry.file_name();
            let Some(taken_at) = name.to_str().and_then(|n| self.parse_file_name(n)) else {
                continue;
            };
            snapshots.push(SnapshotFile {
                path: entry.path(),
                taken_at,
            });
        }

        snapshots.sort_by(|a, b| a.taken_at.cmp(&b.taken_at));
        Ok(snapshots)
    }

    /// Newest snapshot by embedded timestamp.
    pub fn latest(&self) -> Result<Option<SnapshotFile>, SyncError> {
        Ok(self.snapshots()?.pop())
    }

    /// Write rows to a new file named for `at`. Never overwrites.
    pub fn write(
        &self,
        kind: SnapshotKind,
        rows: &[SnapshotRow],
        at: DateTime<Utc>,
    ) -> Result<PathBuf, SyncError> {
        fs::create_dir_all(&self.dir).map_err(|e| SyncError::persistence(&self.dir, e))?;

        let path = self.dir.join(self.file_name(kind, at));
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| SyncError::persistence(&path, e))?;

        let file = write_rows(file, rows).map_err(|e| SyncError::persistence(&path, e))?;
        file.sync_all().map_err(|e| SyncError::persistence(&path, e))?;

        tracing::info!("Wrote {} row(s) to {}", rows.len(), path.display());
        Ok(path)
    }
}

/// Data rows of a snapshot file, header excluded.
///
/// Lines with a different column count (older layouts) are skipped.
pub fn read_rows(path: &Path) -> Result<Vec<SnapshotRow>, SyncError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| SyncError::persistence(path, e))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| SyncError::persistence(path, e))?;
        if let Some(row) = SnapshotRow::from_fields(&record) {
            rows.push(row);
        }
    }
    Ok(rows)
}
