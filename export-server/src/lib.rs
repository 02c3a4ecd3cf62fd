// ABOUTME: Job-status HTTP facade over ledger-export
// ABOUTME: Exposes the router and the in-memory execution store

pub mod server;
pub mod store;

pub use server::{build_router, AppState};
pub use store::{Execution, ExecutionStatus, ExecutionStore, StoreError};
