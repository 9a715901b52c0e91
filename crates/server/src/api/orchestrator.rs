//! Orchestrator API handlers.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;
use genbroker_core::{BeatReport, OrchestratorStatus};

use crate::state::AppState;

/// Error response
#[derive(Debug, Serialize)]
pub struct OrchestratorErrorResponse {
    pub error: String,
}

/// Get orchestrator status
pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<OrchestratorStatus>, impl IntoResponse> {
    state.orchestrator().status().map(Json).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(OrchestratorErrorResponse {
                error: e.to_string(),
            }),
        )
    })
}

/// Run one beat immediately
///
/// Works whether or not the periodic loop is running; with no workers
/// the dispatched items wait in the queue until `start`.
pub async fn trigger_beat(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BeatReport>, impl IntoResponse> {
    state.orchestrator().beat_now().map(Json).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(OrchestratorErrorResponse {
                error: e.to_string(),
            }),
        )
    })
}
