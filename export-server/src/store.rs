// ABOUTME: In-memory registry of export executions and their progress
// ABOUTME: Enforces one queued or running execution at a time

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use ledger_export::sync::{
    ExportArtifacts, ExportMetrics, ExportReport, ExportRequest, ProgressUpdate, SkippedUnit,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, ExecutionStatus::Queued | ExecutionStatus::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
    pub step: String,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub metrics: ExportMetrics,
    pub artifacts: ExportArtifacts,
    pub skipped: Vec<SkippedUnit>,
    pub error: Option<ExecutionError>,
    pub request: ExportRequest,
}

/// Compact view returned by the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStatusView {
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
    pub step: String,
    pub progress: u8,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&Execution> for ExecutionStatusView {
    fn from(execution: &Execution) -> Self {
        Self {
            execution_id: execution.execution_id,
            status: execution.status,
            step: execution.step.clone(),
            progress: execution.progress,
            finished_at: execution.finished_at,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("execution {execution_id} is still in progress")]
    Busy { execution_id: Uuid },
}

/// Shared execution map. Cloning shares the same registry.
#[derive(Debug, Clone, Default)]
pub struct ExecutionStore {
    inner: Arc<Mutex<HashMap<Uuid, Execution>>>,
}

impl ExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Execution>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a new execution unless another one is queued or running.
    pub fn create(&self, request: ExportRequest) -> Result<Execution, StoreError> {
        let mut executions = self.lock();
        if let Some(active) = executions.values().find(|e| e.status.is_active()) {
            return Err(StoreError::Busy {
                execution_id: active.execution_id,
            });
        }

        let execution = Execution {
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Queued,
            step: "QUEUED".to_string(),
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            metrics: ExportMetrics::default(),
            artifacts: ExportArtifacts::default(),
            skipped: Vec::new(),
            error: None,
            request,
        };
        executions.insert(execution.execution_id, execution.clone());
        Ok(execution)
    }

    pub fn get(&self, id: Uuid) -> Option<Execution> {
        self.lock().get(&id).cloned()
    }

    /// All executions, newest first.
    pub fn list(&self) -> Vec<Execution> {
        let mut executions: Vec<Execution> = self.lock().values().cloned().collect();
        executions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        executions
    }

    pub fn mark_running(&self, id: Uuid) {
        self.update(id, |execution| {
            execution.status = ExecutionStatus::Running;
            execution.step = "STARTED".to_string();
            execution.progress = 1;
            execution.started_at = Some(Utc::now());
        });
    }

    pub fn record_progress(&self, id: Uuid, update: ProgressUpdate) {
        self.update(id, |execution| {
            if update.progress >= execution.progress {
                execution.step = update.step.as_str().to_string();
                execution.progress = update.progress;
            }
        });
    }

    pub fn complete(&self, id: Uuid, report: &ExportReport) {
        self.update(id, |execution| {
            execution.status = ExecutionStatus::Completed;
            execution.step = "DONE".to_string();
            execution.progress = 100;
            execution.finished_at = Some(Utc::now());
            execution.metrics = report.metrics.clone();
            execution.artifacts = report.artifacts.clone();
            execution.skipped = report.skipped.clone();
        });
    }

    pub fn fail(&self, id: Uuid, message: String) {
        self.update(id, |execution| {
            execution.status = ExecutionStatus::Failed;
            execution.step = "ERROR".to_string();
            execution.finished_at = Some(Utc::now());
            execution.error = Some(ExecutionError {
                code: "EXECUTION_FAILED".to_string(),
                message,
            });
        });
    }

    fn update(&self, id: Uuid, apply: impl FnOnce(&mut Execution)) {
        match self.lock().get_mut(&id) {
            Some(execution) => apply(execution),
            None => tracing::warn!("Execution {} not found for update", id),
        }
    }
}
