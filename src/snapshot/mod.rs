// ABOUTME: Snapshot output: row formatting, timestamped files, and the incremental differ
// ABOUTME: Everything that touches the output directory lives here

pub mod differ;
pub mod format;
pub mod store;

pub use differ::{diff, DiffOutcome};
pub use format::{SnapshotRow, HEADER};
pub use store::{read_rows, SnapshotFile, SnapshotKind, SnapshotStore};
