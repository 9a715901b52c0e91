//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Task lifecycle (submissions, transitions, rejected events)
//! - Scheduling (beats, work items, lease contention)
//! - Providers and artifacts (poll outcomes, stored bytes)
//! - Notifications

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Task Lifecycle
// =============================================================================

/// Tasks submitted, by task type.
pub static TASKS_SUBMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("genbroker_tasks_submitted_total", "Total tasks submitted"),
        &["task_type"],
    )
    .unwrap()
});

/// Accepted state transitions.
pub static TASK_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "genbroker_task_transitions_total",
            "Accepted task state transitions",
        ),
        &["from_state", "to_state"],
    )
    .unwrap()
});

/// Events rejected because their precondition did not match.
pub static TRANSITIONS_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "genbroker_transitions_rejected_total",
            "Task events rejected by the state machine",
        ),
        &["event"],
    )
    .unwrap()
});

// =============================================================================
// Scheduling
// =============================================================================

/// Beats run.
pub static BEATS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("genbroker_beats_total", "Total scheduler beats").unwrap()
});

/// Work items finished, by outcome.
pub static WORK_ITEMS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("genbroker_work_items_total", "Work items executed"),
        &["outcome"], // "advanced", "idle", "conflict", "timeout", "error"
    )
    .unwrap()
});

/// Work item duration in seconds.
pub static WORK_ITEM_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "genbroker_work_item_duration_seconds",
            "Duration of a single work item",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0]),
        &["outcome"],
    )
    .unwrap()
});

/// Work items skipped because another holder had the lease.
pub static LEASE_CONFLICTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "genbroker_lease_conflicts_total",
        "Work items skipped due to lease contention",
    )
    .unwrap()
});

/// Work items not dispatched because the queue was full.
pub static DISPATCH_DEFERRED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "genbroker_dispatch_deferred_total",
        "Work items left for the next beat because the queue was full",
    )
    .unwrap()
});

// =============================================================================
// Providers & Artifacts
// =============================================================================

/// Poll results by task type and classification.
pub static POLL_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("genbroker_poll_outcomes_total", "Provider poll outcomes"),
        &["task_type", "outcome"],
    )
    .unwrap()
});

/// Bytes written to the object store.
pub static ARTIFACT_BYTES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "genbroker_artifact_bytes_total",
            "Artifact bytes uploaded to the object store",
        ),
        &["task_type"],
    )
    .unwrap()
});

// =============================================================================
// Notifications
// =============================================================================

/// Notification results.
pub static NOTIFICATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("genbroker_notifications_total", "Notifications by result"),
        &["event", "result"], // "delivered", "failed", "dropped"
    )
    .unwrap()
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Task lifecycle
        Box::new(TASKS_SUBMITTED.clone()),
        Box::new(TASK_TRANSITIONS.clone()),
        Box::new(TRANSITIONS_REJECTED.clone()),
        // Scheduling
        Box::new(BEATS.clone()),
        Box::new(WORK_ITEMS.clone()),
        Box::new(WORK_ITEM_DURATION.clone()),
        Box::new(LEASE_CONFLICTS.clone()),
        Box::new(DISPATCH_DEFERRED.clone()),
        // Providers & artifacts
        Box::new(POLL_OUTCOMES.clone()),
        Box::new(ARTIFACT_BYTES.clone()),
        // Notifications
        Box::new(NOTIFICATIONS.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register_cleanly() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }

        TASK_TRANSITIONS
            .with_label_values(&["pending", "generating"])
            .inc();
        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert!(names.contains(&"genbroker_task_transitions_total".to_string()));
    }
}
