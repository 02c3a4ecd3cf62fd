// ABOUTME: Library root for ledger-export
// ABOUTME: Exposes provider access, the sync pipeline, and snapshot persistence

pub mod commands;
pub mod config;
pub mod error;
pub mod filters;
pub mod models;
pub mod provider;
pub mod snapshot;
pub mod sync;

pub use config::ExportConfig;
pub use error::{ProviderError, SyncError};
pub use models::{
    AccountContext, AccountType, CreditCardMetadata, Direction, RawTransaction, RecordOrigin,
    TransactionRecord,
};
pub use provider::{PluggyClient, ProviderGateway};
pub use sync::{ExportJob, ExportReport, ExportRequest};
