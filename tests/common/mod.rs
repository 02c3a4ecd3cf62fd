// ABOUTME: In-memory provider gateway and fixtures shared by integration tests
// ABOUTME: Scripts item status, accounts, and transaction pages per account

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ledger_export::config::{BankConfig, ExportConfig};
use ledger_export::models::{
    AccountType, CreditCardMetadata, Direction, PaymentData, PaymentParticipant, RawTransaction,
};
use ledger_export::provider::{
    ItemState, ItemStatus, ProviderAccount, TransactionPage, TransactionQuery,
};
use ledger_export::{ProviderError, ProviderGateway};
use rust_decimal::Decimal;

pub fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

/// Fixed "now" for pipeline tests.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 20, 15, 0, 0).unwrap()
}

/// Config with the given banks, fast polling, and snapshots under `dir`.
pub fn config(dir: &std::path::Path, banks: &[(&str, &str)]) -> ExportConfig {
    let mut config = ExportConfig::default();
    config.banks = banks
        .iter()
        .map(|(id, name)| BankConfig {
            id: id.to_string(),
            name: name.to_string(),
        })
        .collect();
    config.refresh.poll_interval_ms = 1;
    config.refresh.max_attempts = 3;
    config.fetch.page_size = 2;
    config.snapshot.dir = dir.to_path_buf();
    config
}

pub fn debit(id: &str, account_id: &str, date: DateTime<Utc>, cents: i64, description: &str) -> RawTransaction {
    RawTransaction {
        id: id.to_string(),
        date,
        amount: Decimal::new(-cents, 2),
        amount_in_account_currency: None,
        description: description.to_string(),
        description_raw: None,
        category: Some("Shopping".to_string()),
        direction: Direction::Debit,
        account_id: account_id.to_string(),
        updated_at: Some(date),
        credit_card_metadata: None,
        payment_data: None,
    }
}

pub fn with_category(mut tx: RawTransaction, category: &str) -> RawTransaction {
    tx.category = Some(category.to_string());
    tx
}

pub fn with_plan(mut tx: RawTransaction, current: u32, total: u32) -> RawTransaction {
    tx.credit_card_metadata = Some(CreditCardMetadata {
        installment_number: Some(current),
        total_installments: Some(total),
        bill_id: Some("bill-1".to_string()),
        purchase_date: None,
    });
    tx
}

pub fn with_updated_at(mut tx: RawTransaction, updated_at: DateTime<Utc>) -> RawTransaction {
    tx.updated_at = Some(updated_at);
    tx
}

pub fn with_payer(mut tx: RawTransaction, payer: &str) -> RawTransaction {
    tx.payment_data = Some(PaymentData {
        payer: Some(PaymentParticipant {
            name: Some(payer.to_string()),
        }),
    });
    tx
}

pub fn account(id: &str, account_type: AccountType, owner: &str) -> ProviderAccount {
    ProviderAccount {
        id: id.to_string(),
        account_type,
        name: None,
        owner: Some(owner.to_string()),
    }
}

/// A scripted page: transactions, or a failure.
#[derive(Clone)]
pub enum Page {
    Ok(Vec<RawTransaction>),
    Fail,
}

/// Provider gateway answering from in-memory scripts.
///
/// Items default to current as of `now()` so no refresh happens unless a
/// test scripts otherwise.
#[derive(Default)]
pub struct FakeGateway {
    items: Mutex<HashMap<String, ItemStatus>>,
    stuck_items: HashSet<String>,
    accounts: HashMap<(String, AccountType), Vec<ProviderAccount>>,
    failing_accounts: HashSet<(String, AccountType)>,
    pages: HashMap<String, Vec<Page>>,
    delay: Option<Duration>,
    queries: Mutex<Vec<(String, TransactionQuery)>>,
    refreshes: Mutex<Vec<String>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item(self, item_id: &str, connector: &str) -> Self {
        self.item_status(
            item_id,
            ItemStatus {
                state: ItemState::Current,
                execution_status: Some("SUCCESS".to_string()),
                updated_at: Some(now() - chrono::Duration::hours(1)),
                connector_name: Some(connector.to_string()),
            },
        )
    }

    pub fn item_status(self, item_id: &str, status: ItemStatus) -> Self {
        self.items
            .lock()
            .unwrap()
            .insert(item_id.to_string(), status);
        self
    }

    /// Item that stays UPDATING forever.
    pub fn stuck_item(mut self, item_id: &str) -> Self {
        self.stuck_items.insert(item_id.to_string());
        self.item_status(
            item_id,
            ItemStatus {
                state: ItemState::Updating,
                execution_status: None,
                updated_at: None,
                connector_name: None,
            },
        )
    }

    pub fn accounts(mut self, item_id: &str, accounts: Vec<ProviderAccount>) -> Self {
        for account in accounts {
            self.accounts
                .entry((item_id.to_string(), account.account_type))
                .or_default()
                .push(account);
        }
        self
    }

    pub fn failing_accounts(mut self, item_id: &str, account_type: AccountType) -> Self {
        self.failing_accounts
            .insert((item_id.to_string(), account_type));
        self
    }

    pub fn pages(mut self, account_id: &str, pages: Vec<Page>) -> Self {
        self.pages.insert(account_id.to_string(), pages);
        self
    }

    /// Sleep before every transaction page.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queries(&self) -> Vec<(String, TransactionQuery)> {
        self.queries.lock().unwrap().clone()
    }

    pub fn refreshes(&self) -> Vec<String> {
        self.refreshes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderGateway for FakeGateway {
    async fn item_status(&self, item_id: &str) -> Result<ItemStatus, ProviderError> {
        self.items
            .lock()
            .unwrap()
            .get(item_id)
            .cloned()
            .ok_or_else(|| ProviderError::Status {
                status: 404,
                body: format!("item {} not found", item_id),
            })
    }

    async fn request_refresh(&self, item_id: &str) -> Result<(), ProviderError> {
        self.refreshes.lock().unwrap().push(item_id.to_string());
        if self.stuck_items.contains(item_id) {
            return Ok(());
        }
        if let Some(status) = self.items.lock().unwrap().get_mut(item_id) {
            status.state = ItemState::Current;
            status.updated_at = Some(now());
        }
        Ok(())
    }

    async fn list_accounts(
        &self,
        item_id: &str,
        account_type: AccountType,
    ) -> Result<Vec<ProviderAccount>, ProviderError> {
        let key = (item_id.to_string(), account_type);
        if self.failing_accounts.contains(&key) {
            return Err(ProviderError::Status {
                status: 500,
                body: "accounts unavailable".to_string(),
            });
        }
        Ok(self.accounts.get(&key).cloned().unwrap_or_default())
    }

    async fn list_transactions(
        &self,
        account_id: &str,
        query: &TransactionQuery,
    ) -> Result<TransactionPage, ProviderError> {
        self.queries
            .lock()
            .unwrap()
            .push((account_id.to_string(), query.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let pages = self.pages.get(account_id).cloned().unwrap_or_default();
        let total_pages = pages.len() as u32;
        match pages.get(query.page as usize - 1) {
            Some(Page::Ok(results)) => Ok(TransactionPage {
                results: results.clone(),
                page: query.page,
                total_pages,
            }),
            Some(Page::Fail) => Err(ProviderError::Unavailable(format!(
                "page {} of {} failed",
                query.page, account_id
            ))),
            None => Ok(TransactionPage {
                results: Vec::new(),
                page: query.page,
                total_pages,
            }),
        }
    }
}
