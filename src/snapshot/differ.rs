// ABOUTME: Keeps only rows absent from every earlier snapshot
// ABOUTME: Makes repeated exports additive instead of duplicating earlier output

use std::collections::HashSet;
use std::path::PathBuf;

use super::format::SnapshotRow;
use super::store::read_rows;
use crate::error::SyncError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOutcome {
    /// Rows not present in any earlier snapshot, in candidate order
    NewRows(Vec<SnapshotRow>),
    /// Nothing to write
    NoNewData,
}

impl DiffOutcome {
    pub fn new_row_count(&self) -> usize {
        match self {
            DiffOutcome::NewRows(rows) => rows.len(),
            DiffOutcome::NoNewData => 0,
        }
    }
}

/// Compare candidates with the rows of every earlier snapshot.
///
/// Each snapshot only holds the rows new at its run, so the known set is
/// the union of all of them. Identical candidates collapse to their first
/// occurrence.
pub fn diff(
    candidates: Vec<SnapshotRow>,
    previous: &[PathBuf],
) -> Result<DiffOutcome, SyncError> {
    let mut seen: HashSet<SnapshotRow> = HashSet::new();
    for path in previous {
        seen.extend(read_rows(path)?);
    }
    let known = seen.len();

    let new_rows: Vec<SnapshotRow> = candidates
        .into_iter()
        .filter(|row| seen.insert(row.clone()))
        .collect();

    tracing::info!(
        "Snapshot diff: {} new row(s) against {} known from {} snapshot(s)",
        new_rows.len(),
        known,
        previous.len()
    );

    if new_rows.is_empty() {
        Ok(DiffOutcome::NoNewData)
    } else {
        Ok(DiffOutcome::NewRows(new_rows))
    }
}
