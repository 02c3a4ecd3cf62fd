// ABOUTME: Router tests for the execution API using an in-memory provider
// ABOUTME: Requests go through tower's oneshot; runs execute on the test runtime

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use export_server::{build_router, AppState};
use ledger_export::config::{BankConfig, ExportConfig};
use ledger_export::models::{AccountType, Direction, RawTransaction};
use ledger_export::provider::{
    ItemState, ItemStatus, ProviderAccount, TransactionPage, TransactionQuery,
};
use ledger_export::{ExportJob, ProviderError, ProviderGateway};
use rust_decimal::Decimal;
use serde_json::Value;
use tempfile::TempDir;
use tower::util::ServiceExt;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 20, 15, 0, 0).unwrap()
}

/// One current item with one bank account and a single page of transactions.
struct SingleAccount {
    transactions: Vec<RawTransaction>,
    delay: Option<Duration>,
}

#[async_trait]
impl ProviderGateway for SingleAccount {
    async fn item_status(&self, _item_id: &str) -> Result<ItemStatus, ProviderError> {
        Ok(ItemStatus {
            state: ItemState::Current,
            execution_status: Some("SUCCESS".to_string()),
            updated_at: Some(now() - chrono::Duration::hours(1)),
            connector_name: Some("Nubank".to_string()),
        })
    }

    async fn request_refresh(&self, _item_id: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn list_accounts(
        &self,
        _item_id: &str,
        account_type: AccountType,
    ) -> Result<Vec<ProviderAccount>, ProviderError> {
        if account_type != AccountType::Bank {
            return Ok(Vec::new());
        }
        Ok(vec![ProviderAccount {
            id: "acc-1".to_string(),
            account_type,
            name: None,
            owner: Some("Ana Maria Souza".to_string()),
        }])
    }

    async fn list_transactions(
        &self,
        _account_id: &str,
        query: &TransactionQuery,
    ) -> Result<TransactionPage, ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(TransactionPage {
            results: self.transactions.clone(),
            page: query.page,
            total_pages: 1,
        })
    }
}

fn transaction(id: &str, cents: i64) -> RawTransaction {
    let date = Utc.with_ymd_and_hms(2025, 6, 18, 12, 0, 0).unwrap();
    RawTransaction {
        id: id.to_string(),
        date,
        amount: Decimal::new(-cents, 2),
        amount_in_account_currency: None,
        description: format!("Compra {}", id),
        description_raw: None,
        category: Some("Shopping".to_string()),
        direction: Direction::Debit,
        account_id: "acc-1".to_string(),
        updated_at: Some(date),
        credit_card_metadata: None,
        payment_data: None,
    }
}

fn app(dir: &TempDir, delay: Option<Duration>) -> (Router, AppState) {
    let mut config = ExportConfig::default();
    config.banks = vec![BankConfig {
        id: "item-a".to_string(),
        name: "Nubank".to_string(),
    }];
    config.snapshot.dir = dir.path().to_path_buf();

    let gateway = SingleAccount {
        transactions: vec![transaction("t1", 1000), transaction("t2", 2500)],
        delay,
    };
    let job = ExportJob::new(Arc::new(gateway), config).at(now());
    let state = AppState::new(job);
    (build_router(state.clone()), state)
}

async fn send(app: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn wait_for_finish(app: &Router, id: &str) -> Value {
    let uri = format!("/v1/executions/transactions/{}/status", id);
    for _ in 0..200 {
        let (status, body) = send(app, "GET", &uri, "").await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == "COMPLETED" || body["status"] == "FAILED" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("execution {} did not finish", id);
}

#[tokio::test]
async fn test_health() {
    let dir = TempDir::new().unwrap();
    let (app, _) = app(&dir, None);
    let (status, body) = send(&app, "GET", "/health", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_execution_runs_to_completion() {
    let dir = TempDir::new().unwrap();
    let (app, _) = app(&dir, None);

    let (status, accepted) = send(&app, "POST", "/v1/executions/transactions", "").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(accepted["status"], "QUEUED");
    let id = accepted["executionId"].as_str().unwrap().to_string();
    assert_eq!(
        accepted["links"]["status"],
        format!("/v1/executions/transactions/{}/status", id)
    );

    let finished = wait_for_finish(&app, &id).await;
    assert_eq!(finished["status"], "COMPLETED");
    assert_eq!(finished["step"], "DONE");
    assert_eq!(finished["progress"], 100);

    let (status, execution) = send(
        &app,
        "GET",
        &format!("/v1/executions/transactions/{}", id),
        "",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(execution["metrics"]["transactionsFetched"], 2);
    assert_eq!(execution["metrics"]["newRows"], 2);
    assert!(execution["artifacts"]["csvPath"].is_string());
    assert!(execution["finishedAt"].is_string());

    let (status, list) = send(&app, "GET", "/v1/executions/transactions", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 1);
    assert_eq!(list["items"][0]["executionId"], id.as_str());
}

#[tokio::test]
async fn test_second_execution_conflicts_while_running() {
    let dir = TempDir::new().unwrap();
    let (app, state) = app(&dir, Some(Duration::from_secs(5)));

    let (status, accepted) = send(&app, "POST", "/v1/executions/transactions", "{}").await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, conflict) = send(&app, "POST", "/v1/executions/transactions", "{}").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["executionId"], accepted["executionId"]);

    state.shutdown.cancel();
    let id = accepted["executionId"].as_str().unwrap().to_string();
    let finished = wait_for_finish(&app, &id).await;
    assert_eq!(finished["status"], "FAILED");
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (app, _) = app(&dir, None);

    let (status, body) = send(&app, "POST", "/v1/executions/transactions", "{nope").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("invalid request body"));
}

#[tokio::test]
async fn test_invalid_options_are_rejected() {
    let dir = TempDir::new().unwrap();
    let (app, state) = app(&dir, None);

    let (status, body) = send(
        &app,
        "POST",
        "/v1/executions/transactions",
        r#"{"banks": ["item-z"]}"#,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("no valid bank"));

    let (status, _) = send(
        &app,
        "POST",
        "/v1/executions/transactions",
        r#"{"options": {"includeCategories": ["Taxi"], "excludeCategories": ["Taxi"]}}"#,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(state.store.list().is_empty());
}

#[tokio::test]
async fn test_unknown_execution_and_route() {
    let dir = TempDir::new().unwrap();
    let (app, _) = app(&dir, None);

    let (status, body) = send(
        &app,
        "GET",
        "/v1/executions/transactions/4f1c2b1e-9d7a-4c39-8a57-1b2f3f0c9e11",
        "",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "execution not found");

    let (status, _) = send(&app, "GET", "/v1/executions/transactions/not-a-uuid/status", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "GET", "/v2/anything", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "route not found");
}
