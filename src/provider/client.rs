// ABOUTME: HTTP client for the Pluggy aggregation API
// ABOUTME: Handles API-key authentication, item refresh, accounts, and paged transactions

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use super::models::{
    AuthRequest, AuthResponse, ItemResponse, ItemStatus, ProviderAccount, ResultsEnvelope,
    TransactionPage, TransactionQuery,
};
use super::ProviderGateway;
use crate::error::ProviderError;
use crate::models::AccountType;

/// Default Pluggy API base URL
pub const DEFAULT_PROVIDER_API_URL: &str = "https://api.pluggy.ai";

const API_KEY_HEADER: &str = "X-API-KEY";

/// Pluggy API client
///
/// Exchanges the client id/secret for a short-lived API key on first use and
/// re-authenticates once if a request comes back unauthorized.
pub struct PluggyClient {
    client: Client,
    api_base_url: String,
    client_id: String,
    client_secret: String,
    api_key: Mutex<Option<String>>,
}

impl PluggyClient {
    /// Create a new client
    ///
    /// # Arguments
    ///
    /// * `api_base_url` - Optional base URL (defaults to https://api.pluggy.ai)
    /// * `client_id` - Pluggy client id
    /// * `client_secret` - Pluggy client secret
    pub fn new(
        api_base_url: Option<&str>,
        client_id: String,
        client_secret: String,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            api_base_url: api_base_url
                .unwrap_or(DEFAULT_PROVIDER_API_URL)
                .trim_end_matches('/')
                .to_string(),
            client_id,
            client_secret,
            api_key: Mutex::new(None),
        })
    }

    async fn api_key(&self) -> Result<String, ProviderError> {
        let mut cached = self.api_key.lock().await;
        if let Some(key) = cached.as_ref() {
            return Ok(key.clone());
        }

        let url = format!("{}/auth", self.api_base_url);
        let response = self
            .client
            .post(&url)
            .json(&AuthRequest {
                client_id: &self.client_id,
                client_secret: &self.client_secret,
            })
            .send()
            .await?;
        let auth: AuthResponse = decode(response).await?;

        tracing::debug!("Authenticated against provider API");
        *cached = Some(auth.api_key.clone());
        Ok(auth.api_key)
    }

    /// Send a request with the API key attached, refreshing the key once on 401/403.
    async fn send<F>(&self, build: F) -> Result<Response, ProviderError>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let key = self.api_key().await?;
        let response = build(&key).send().await?;
        if !is_auth_failure(response.status()) {
            return Ok(response);
        }

        tracing::debug!("Provider rejected cached API key, re-authenticating");
        self.api_key.lock().await.take();
        let key = self.api_key().await?;
        Ok(build(&key).send().await?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }
}

#[async_trait]
impl ProviderGateway for PluggyClient {
    async fn item_status(&self, item_id: &str) -> Result<ItemStatus, ProviderError> {
        let url = self.url(&format!("/items/{}", item_id));
        let response = self
            .send(|key| self.client.get(&url).header(API_KEY_HEADER, key))
            .await?;
        let item: ItemResponse = decode(response).await?;
        Ok(item.into())
    }

    async fn request_refresh(&self, item_id: &str) -> Result<(), ProviderError> {
        let url = self.url(&format!("/items/{}", item_id));
        let response = self
            .send(|key| {
                self.client
                    .patch(&url)
                    .header(API_KEY_HEADER, key)
                    .json(&serde_json::json!({}))
            })
            .await?;
        let _: serde_json::Value = decode(response).await?;
        Ok(())
    }

    async fn list_accounts(
        &self,
        item_id: &str,
        account_type: AccountType,
    ) -> Result<Vec<ProviderAccount>, ProviderError> {
        let url = self.url("/accounts");
        let response = self
            .send(|key| {
                self.client
                    .get(&url)
                    .header(API_KEY_HEADER, key)
                    .query(&[("itemId", item_id), ("type", account_type.as_str())])
            })
            .await?;
        let envelope: ResultsEnvelope<ProviderAccount> = decode(response).await?;
        Ok(envelope.results)
    }

    async fn list_transactions(
        &self,
        account_id: &str,
        query: &TransactionQuery,
    ) -> Result<TransactionPage, ProviderError> {
        let url = self.url("/transactions");
        let params = [
            ("accountId", account_id.to_string()),
            ("from", query.from.format("%Y-%m-%d").to_string()),
            ("page", query.page.to_string()),
            ("pageSize", query.page_size.to_string()),
        ];
        let response = self
            .send(|key| {
                self.client
                    .get(&url)
                    .header(API_KEY_HEADER, key)
                    .query(&params)
            })
            .await?;
        decode(response).await
    }
}

fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
    let status = response.status();
    if is_auth_failure(status) {
        return Err(ProviderError::Unauthorized {
            status: status.as_u16(),
        });
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ProviderError::Decode(e.to_string()))
}
