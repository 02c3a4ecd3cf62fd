// ABOUTME: Data structures exchanged with the aggregation provider
// ABOUTME: Item status, sub-accounts, and paged transaction responses

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AccountType, RawTransaction};

/// Provider-side refresh state of a linked item, reduced to what the
/// freshness coordinator needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Current,
    Updating,
    Error,
}

impl ItemState {
    /// Maps the provider's item status string.
    pub fn from_provider(status: &str) -> Self {
        match status {
            "UPDATING" => ItemState::Updating,
            "LOGIN_ERROR" | "OUTDATED" | "WAITING_USER_INPUT" | "ERROR" => ItemState::Error,
            _ => ItemState::Current,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemStatus {
    pub state: ItemState,
    pub execution_status: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Institution name behind the item (e.g. "Nubank")
    pub connector_name: Option<String>,
}

/// A BANK or CREDIT account under an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAccount {
    pub id: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionQuery {
    /// Lower date bound (the watermark)
    pub from: NaiveDate,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPage {
    pub results: Vec<RawTransaction>,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default)]
    pub total_pages: u32,
}

fn first_page() -> u32 {
    1
}

/// Generic `{ "results": [...] }` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultsEnvelope<T> {
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Connector {
    pub name: String,
}

/// Item payload as returned by `GET /items/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResponse {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub execution_status: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub connector: Option<Connector>,
}

impl From<ItemResponse> for ItemStatus {
    fn from(item: ItemResponse) -> Self {
        ItemStatus {
            state: ItemState::from_provider(&item.status),
            execution_status: item.execution_status,
            updated_at: item.updated_at,
            connector_name: item.connector.map(|c| c.name),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub api_key: String,
}
