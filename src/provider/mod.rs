// ABOUTME: Gateway abstraction over the account aggregation provider
// ABOUTME: The pipeline depends on the trait; PluggyClient is the HTTP implementation

mod client;
pub mod models;

pub use client::{PluggyClient, DEFAULT_PROVIDER_API_URL};
pub use models::{ItemState, ItemStatus, ProviderAccount, TransactionPage, TransactionQuery};

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::models::AccountType;

/// Operations the export pipeline needs from the provider.
///
/// Implementations are injected as `Arc<dyn ProviderGateway>` so the
/// coordinator and fetcher can run against an in-memory fake in tests.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Current refresh status of a linked item.
    async fn item_status(&self, item_id: &str) -> Result<ItemStatus, ProviderError>;

    /// Ask the provider to start refreshing an item's data.
    async fn request_refresh(&self, item_id: &str) -> Result<(), ProviderError>;

    /// Sub-accounts of one type under an item.
    async fn list_accounts(
        &self,
        item_id: &str,
        account_type: AccountType,
    ) -> Result<Vec<ProviderAccount>, ProviderError>;

    /// One page of an account's transactions.
    async fn list_transactions(
        &self,
        account_id: &str,
        query: &TransactionQuery,
    ) -> Result<TransactionPage, ProviderError>;
}
