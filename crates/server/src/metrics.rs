//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the genbroker server:
//! - HTTP request metrics (latency, counts, errors)
//! - Task counts by state (collected dynamically)
//! - Orchestrator status (collected dynamically)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use regex_lite::Regex;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "genbroker_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("genbroker_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "genbroker_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Task Metrics (collected dynamically)
// =============================================================================

/// Tasks by current state.
pub static TASKS_BY_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("genbroker_tasks_by_state", "Current task count by state"),
        &["state"],
    )
    .unwrap()
});

// =============================================================================
// Orchestrator Metrics (collected dynamically)
// =============================================================================

/// Orchestrator running state (1 = running, 0 = stopped).
pub static ORCHESTRATOR_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "genbroker_orchestrator_running",
        "Whether the orchestrator is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Work items queued or executing.
pub static WORK_ITEMS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "genbroker_work_items_in_flight",
        "Number of tasks currently queued or executing",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Tasks
    registry.register(Box::new(TASKS_BY_STATE.clone())).unwrap();

    // Orchestrator
    registry
        .register(Box::new(ORCHESTRATOR_RUNNING.clone()))
        .unwrap();
    registry
        .register(Box::new(WORK_ITEMS_IN_FLIGHT.clone()))
        .unwrap();

    // Core metrics (task lifecycle, scheduling, artifacts, notifications)
    for metric in genbroker_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Every state a task can be in, as reported by the API.
const TASK_STATES: [&str; 10] = [
    "submitted",
    "pending",
    "generating",
    "external_completed",
    "downloading",
    "processing",
    "uploading",
    "completed",
    "retry_pending",
    "failed",
];

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the gauges reflect the store and orchestrator
/// at scrape time.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let orchestrator = state.orchestrator();
    ORCHESTRATOR_RUNNING.set(if orchestrator.is_running() { 1 } else { 0 });
    if let Ok(status) = orchestrator.status() {
        WORK_ITEMS_IN_FLIGHT.set(status.in_flight as i64);
    }

    let task_store = state.task_store();
    for state_type in TASK_STATES {
        let filter = genbroker_core::TaskFilter::new().with_state(state_type);
        if let Ok(count) = task_store.count(&filter) {
            TASKS_BY_STATE.with_label_values(&[state_type]).set(count);
        }
    }
}

static TASK_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-z][a-z0-9_]*:\d+-[A-Za-z0-9]+").unwrap());
static EXTERNAL_JOB_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/by-external/[^/]+").unwrap());
static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});
static NUMERIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = EXTERNAL_JOB_RE.replace_all(path, "/by-external/{job_id}");
    let result = TASK_ID_RE.replace_all(&result, "{id}");
    let result = UUID_RE.replace_all(&result, "{id}");
    let result = NUMERIC_RE.replace_all(&result, "/{id}$1");
    result.to_string()
}
