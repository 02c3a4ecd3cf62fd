// ABOUTME: Pages through one account's transactions from the watermark onwards
// ABOUTME: Applies category filters per record and keeps partial results on page failures

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use super::until_cancelled;
use crate::error::SyncError;
use crate::filters::CategoryFilter;
use crate::models::RawTransaction;
use crate::provider::{ProviderGateway, TransactionQuery};

/// Result of paging through one account.
#[derive(Debug, Default)]
pub struct AccountFetch {
    /// Transactions that passed the category filter, in provider order
    pub transactions: Vec<RawTransaction>,
    /// Pages successfully read
    pub pages: u32,
    pub filtered_out: usize,
    /// Set when a page request failed and pagination stopped early
    pub failure: Option<SyncError>,
}

pub struct TransactionFetcher<'a> {
    gateway: &'a dyn ProviderGateway,
    page_size: u32,
}

impl<'a> TransactionFetcher<'a> {
    pub fn new(gateway: &'a dyn ProviderGateway, page_size: u32) -> Self {
        Self {
            gateway,
            page_size: page_size.max(1),
        }
    }

    /// Fetch every page of `account_id` from `watermark`.
    ///
    /// Only cancellation is returned as an error; a failed page ends
    /// pagination for this account and is reported in `AccountFetch::failure`.
    pub async fn fetch(
        &self,
        account_id: &str,
        watermark: NaiveDate,
        filter: &CategoryFilter,
        cancel: &CancellationToken,
    ) -> Result<AccountFetch, SyncError> {
        let mut fetch = AccountFetch::default();
        let mut page = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let query = TransactionQuery {
                from: watermark,
                page,
                page_size: self.page_size,
            };
            let result =
                until_cancelled(cancel, self.gateway.list_transactions(account_id, &query)).await?;

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    let err = SyncError::provider(
                        format!("transactions of account {} page {}", account_id, page),
                        e,
                    );
                    tracing::warn!("{}, keeping {} fetched so far", err, fetch.transactions.len());
                    fetch.failure = Some(err);
                    break;
                }
            };

            fetch.pages += 1;
            let received = response.results.len();
            for transaction in response.results {
                if filter.allows(transaction.category.as_deref()) {
                    fetch.transactions.push(transaction);
                } else {
                    fetch.filtered_out += 1;
                }
            }

            tracing::debug!(
                "Account {} page {}/{}: {} transaction(s)",
                account_id,
                page,
                response.total_pages,
                received
            );

            if page >= response.total_pages {
                break;
            }
            page += 1;
        }

        Ok(fetch)
    }
}
