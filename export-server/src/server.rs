// ABOUTME: HTTP routes for starting export executions and polling their status
// ABOUTME: Runs are spawned onto the runtime; handlers only touch the execution store

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use ledger_export::sync::{merge_options, resolve_banks, ProgressUpdate};
use ledger_export::{ExportJob, ExportRequest};
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::store::{Execution, ExecutionStatus, ExecutionStatusView, ExecutionStore, StoreError};

const EXECUTIONS_PATH: &str = "/v1/executions/transactions";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub job: Arc<ExportJob>,
    pub store: ExecutionStore,
    /// Cancels in-flight runs when the server shuts down
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(job: ExportJob) -> Self {
        Self {
            job: Arc::new(job),
            store: ExecutionStore::new(),
            shutdown: CancellationToken::new(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Accepted {
    execution_id: Uuid,
    status: ExecutionStatus,
    created_at: DateTime<Utc>,
    links: Links,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Links {
    #[serde(rename = "self")]
    self_link: String,
    status: String,
}

#[derive(Serialize)]
struct ExecutionList {
    total: usize,
    items: Vec<Execution>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(EXECUTIONS_PATH, post(start_execution).get(list_executions))
        .route(&format!("{}/:id", EXECUTIONS_PATH), get(get_execution))
        .route(
            &format!("{}/:id/status", EXECUTIONS_PATH),
            get(get_execution_status),
        )
        .fallback(not_found)
        .with_state(state)
}

/// GET /health
async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// POST /v1/executions/transactions
///
/// An empty body starts a run with the configured defaults.
async fn start_execution(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(message) => return bad_request(message),
    };

    let config = state.job.config();
    if let Err(e) = resolve_banks(&config.banks, request.banks.as_deref())
        .and_then(|_| merge_options(&config.options, &request.options))
    {
        return bad_request(e.to_string());
    }

    let execution = match state.store.create(request.clone()) {
        Ok(execution) => execution,
        Err(StoreError::Busy { execution_id }) => {
            return (
                StatusCode::CONFLICT,
                Json(json!({
                    "message": "an export execution is already in progress",
                    "executionId": execution_id,
                })),
            )
                .into_response();
        }
    };

    let id = execution.execution_id;
    tracing::info!("Queued export execution {}", id);
    spawn_execution(&state, id, request);

    let self_link = format!("{}/{}", EXECUTIONS_PATH, id);
    let accepted = Accepted {
        execution_id: id,
        status: execution.status,
        created_at: execution.created_at,
        links: Links {
            status: format!("{}/status", self_link),
            self_link,
        },
    };
    (StatusCode::ACCEPTED, Json(accepted)).into_response()
}

fn parse_request(body: &[u8]) -> Result<ExportRequest, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ExportRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| format!("invalid request body: {}", e))
}

fn spawn_execution(state: &AppState, id: Uuid, request: ExportRequest) {
    let job = state.job.clone();
    let store = state.store.clone();
    let cancel = state.shutdown.child_token();

    tokio::spawn(async move {
        store.mark_running(id);
        let sink = {
            let store = store.clone();
            move |update: ProgressUpdate| store.record_progress(id, update)
        };

        match job.run(&request, &sink, &cancel).await {
            Ok(report) => {
                tracing::info!(
                    "Execution {} completed with {} new row(s)",
                    id,
                    report.metrics.new_rows
                );
                store.complete(id, &report);
            }
            Err(e) => {
                tracing::error!("Execution {} failed: {}", id, e);
                store.fail(id, e.to_string());
            }
        }
    });
}

/// GET /v1/executions/transactions
async fn list_executions(State(state): State<AppState>) -> impl IntoResponse {
    let items = state.store.list();
    Json(ExecutionList {
        total: items.len(),
        items,
    })
}

/// GET /v1/executions/transactions/:id
async fn get_execution(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match lookup(&state, &id) {
        Ok(execution) => Json(execution).into_response(),
        Err(response) => response,
    }
}

/// GET /v1/executions/transactions/:id/status
async fn get_execution_status(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match lookup(&state, &id) {
        Ok(execution) => Json(ExecutionStatusView::from(&execution)).into_response(),
        Err(response) => response,
    }
}

fn lookup(state: &AppState, id: &str) -> Result<Execution, Response> {
    Uuid::parse_str(id)
        .ok()
        .and_then(|uuid| state.store.get(uuid))
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "message": "execution not found", "executionId": id })),
            )
                .into_response()
        })
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": "route not found" })),
    )
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "message": message }))).into_response()
}
