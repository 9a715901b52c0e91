//! Types for the task orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::{ErrorDescriptor, TaskError, TaskRecord, TaskState};

/// Errors returned by orchestrator operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Task not found.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// No provider is registered for the task type.
    #[error("unknown task type: {0}")]
    UnknownTaskType(String),

    /// The request payload was rejected before a task was created.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// An external job id matched tasks of several types.
    #[error("external job {external_job_id} matches several tasks: {}", task_ids.join(", "))]
    AmbiguousTaskId {
        external_job_id: String,
        task_ids: Vec<String>,
    },

    /// Task store error.
    #[error("task store error: {0}")]
    Task(#[from] TaskError),
}

/// A unit of work: advance one task as far as it can go right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub task_id: String,
}

/// How a work item ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkOutcome {
    /// At least one transition was committed.
    Advanced { state: String },
    /// Nothing to do yet (not due, terminal, or only a poll refresh).
    Idle,
    /// Another holder owns the lease or the task is already in flight.
    Conflict,
    /// The wall-clock budget ran out.
    TimedOut,
    Error(String),
}

impl WorkOutcome {
    /// Label used in metrics.
    pub fn label(&self) -> &'static str {
        match self {
            WorkOutcome::Advanced { .. } => "advanced",
            WorkOutcome::Idle => "idle",
            WorkOutcome::Conflict => "conflict",
            WorkOutcome::TimedOut => "timeout",
            WorkOutcome::Error(_) => "error",
        }
    }
}

/// What one beat did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeatReport {
    /// Eligible index entries seen.
    pub scanned: usize,
    /// Work items queued.
    pub dispatched: usize,
    /// Entries skipped because the task was already in flight.
    pub in_flight: usize,
    /// Entries left for the next beat because the queue was full.
    pub deferred: usize,
}

/// Current status of the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    /// Whether the beat and workers are running.
    pub running: bool,
    pub worker_pool_size: usize,
    /// Tasks currently queued or executing.
    pub in_flight: usize,
    /// Beats run since construction.
    pub beats: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_beat_at: Option<DateTime<Utc>>,
    pub pending_count: i64,
    pub monitoring_count: i64,
    pub retry_count: i64,
    pub completed_count: i64,
    pub failed_count: i64,
}

/// Caller-facing view of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusView {
    pub task_id: String,
    pub task_type: String,
    pub state: String,
    /// When a task waiting out a backoff becomes eligible again.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_hint: Option<String>,
    pub attempt_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorDescriptor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&TaskRecord> for TaskStatusView {
    fn from(task: &TaskRecord) -> Self {
        let retry_after = match task.state {
            TaskState::RetryPending { retry_after, .. } => Some(retry_after),
            _ => None,
        };
        Self {
            task_id: task.task_id.clone(),
            task_type: task.task_type.clone(),
            state: task.state.state_type().to_string(),
            retry_after,
            progress_hint: task.progress_hint.clone(),
            attempt_count: task.attempt_count,
            external_job_id: task.external_job_id.clone(),
            artifact_ref: task.artifact_ref.clone(),
            last_error: task.last_error.clone(),
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}
