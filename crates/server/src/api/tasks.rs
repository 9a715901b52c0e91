//! Task API handlers.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::error;
use genbroker_core::task::parse_task_id;
use genbroker_core::{
    OrchestratorError, StorageError, TaskError, TaskFilter, TaskState, TaskStatusView,
};

use crate::state::AppState;

/// Maximum allowed limit for task queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for task queries
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for submitting a task
#[derive(Debug, Deserialize)]
pub struct SubmitTaskBody {
    /// Registered task type, selects the provider
    pub task_type: String,
    /// Provider-specific request, stored verbatim
    #[serde(default = "empty_payload")]
    pub payload: Value,
}

fn empty_payload() -> Value {
    Value::Object(Default::default())
}

/// Query parameters for listing tasks
#[derive(Debug, Deserialize)]
pub struct ListTasksParams {
    /// Filter by state type
    pub state: Option<String>,
    /// Filter by task type
    pub task_type: Option<String>,
    /// Maximum number of tasks to return
    pub limit: Option<i64>,
    /// Pagination offset
    pub offset: Option<i64>,
}

/// Query parameters for lookups by provider job id
#[derive(Debug, Deserialize)]
pub struct ExternalJobParams {
    /// Narrow the match when several providers reuse job ids
    pub task_type: Option<String>,
}

/// Response for listing tasks
#[derive(Debug, Serialize)]
pub struct ListTasksResponse {
    pub tasks: Vec<TaskStatusView>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct TaskErrorResponse {
    pub error: String,
    /// Candidate tasks when a lookup was ambiguous
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_ids: Option<Vec<String>>,
}

type ApiError = (StatusCode, Json<TaskErrorResponse>);

fn error_response(err: OrchestratorError) -> ApiError {
    let status = match &err {
        OrchestratorError::TaskNotFound(_) | OrchestratorError::Task(TaskError::NotFound(_)) => {
            StatusCode::NOT_FOUND
        }
        OrchestratorError::UnknownTaskType(_) | OrchestratorError::InvalidPayload(_) => {
            StatusCode::BAD_REQUEST
        }
        OrchestratorError::AmbiguousTaskId { .. }
        | OrchestratorError::Task(TaskError::DuplicateTask(_)) => StatusCode::CONFLICT,
        OrchestratorError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let task_ids = match &err {
        OrchestratorError::AmbiguousTaskId { task_ids, .. } => Some(task_ids.clone()),
        _ => None,
    };
    (
        status,
        Json(TaskErrorResponse {
            error: err.to_string(),
            task_ids,
        }),
    )
}

fn plain_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(TaskErrorResponse {
            error: message.into(),
            task_ids: None,
        }),
    )
}

fn check_task_id(id: &str) -> Result<(), ApiError> {
    match parse_task_id(id) {
        Some(_) => Ok(()),
        None => Err(plain_error(
            StatusCode::BAD_REQUEST,
            format!("Malformed task id: {}", id),
        )),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a new task
pub async fn submit_task(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitTaskBody>,
) -> Result<(StatusCode, Json<TaskStatusView>), ApiError> {
    match state.orchestrator().submit(&body.task_type, body.payload) {
        Ok(task) => Ok((StatusCode::CREATED, Json(TaskStatusView::from(&task)))),
        Err(e) => Err(error_response(e)),
    }
}

/// Get a task by ID
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TaskStatusView>, ApiError> {
    check_task_id(&id)?;
    state
        .orchestrator()
        .get_status(&id)
        .map(Json)
        .map_err(error_response)
}

/// Download the stored artifact of a completed task
pub async fn get_task_artifact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    check_task_id(&id)?;
    let task = state
        .task_store()
        .get(&id)
        .map_err(|e| error_response(OrchestratorError::Task(e)))?
        .ok_or_else(|| error_response(OrchestratorError::TaskNotFound(id.clone())))?;

    let key = match (&task.state, task.artifact_ref.as_deref()) {
        (TaskState::Completed, Some(key)) => key.to_string(),
        _ => {
            let message = format!(
                "No artifact available for task {} in state {}",
                id,
                task.state.state_type()
            );
            return Err(plain_error(StatusCode::NOT_FOUND, message));
        }
    };
    let content_type = task
        .artifact_metadata
        .as_ref()
        .map(|m| m.content_type.clone())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    match state.object_store().get(&key).await {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response()),
        Err(e @ StorageError::NotFound { .. }) => {
            Err(plain_error(StatusCode::NOT_FOUND, e.to_string()))
        }
        Err(e) => {
            error!(task_id = %id, key = %key, error = %e, "Failed to read artifact");
            Err(plain_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// Get a task by the provider's job id
pub async fn get_task_by_external_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    Query(params): Query<ExternalJobParams>,
) -> Result<Json<TaskStatusView>, ApiError> {
    state
        .orchestrator()
        .get_status_by_external_job(&job_id, params.task_type.as_deref())
        .map(Json)
        .map_err(error_response)
}

/// List tasks with optional filters
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListTasksParams>,
) -> Result<Json<ListTasksResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = TaskFilter::new().with_limit(limit).with_offset(offset);

    if let Some(ref state_filter) = params.state {
        filter = filter.with_state(state_filter);
    }

    if let Some(ref task_type) = params.task_type {
        filter = filter.with_task_type(task_type);
    }

    let tasks = state
        .task_store()
        .list(&filter)
        .map_err(|e| error_response(e.into()))?;

    // Count ignores pagination
    let count_filter = TaskFilter {
        limit: i64::MAX,
        offset: 0,
        ..filter
    };
    let total = state
        .task_store()
        .count(&count_filter)
        .map_err(|e| error_response(e.into()))?;

    Ok(Json(ListTasksResponse {
        tasks: tasks.iter().map(TaskStatusView::from).collect(),
        total,
        limit,
        offset,
    }))
}
