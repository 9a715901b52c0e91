//! Task orchestrator implementation.
//!
//! A periodic beat scans the active queue indexes and hands eligible tasks to
//! a fixed pool of workers over a bounded channel. Workers claim a lease per
//! task, so several orchestrator instances can share one store.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::task::{
    generate_task_id, is_valid_task_type, CreateTaskRequest, IndexScan, QueueIndex, ScanOptions,
    TaskRecord, TaskStore,
};

use super::context::OrchestratorContext;
use super::types::{
    BeatReport, OrchestratorError, OrchestratorStatus, TaskStatusView, WorkItem, WorkOutcome,
};
use super::worker::{execute, holder_id};

/// State shared between the orchestrator handle, the beat loop and workers.
struct Shared {
    ctx: Arc<OrchestratorContext>,
    instance_id: String,
    in_flight: Mutex<HashSet<String>>,
    work_tx: mpsc::Sender<WorkItem>,
    work_rx: tokio::sync::Mutex<mpsc::Receiver<WorkItem>>,
    beats: AtomicU64,
    last_beat_at: Mutex<Option<DateTime<Utc>>>,
}

impl Shared {
    /// Scan the active indexes and queue every eligible task not already in
    /// flight.
    fn beat(&self) -> Result<BeatReport, OrchestratorError> {
        let now = Utc::now();
        let mut report = BeatReport::default();
        let store: &dyn TaskStore = self.ctx.store.as_ref();
        let batch_size = self.ctx.config.scan_batch_size.max(1);

        let scans = [
            (QueueIndex::Pending, None),
            (QueueIndex::Monitoring, None),
            (QueueIndex::Retry, Some(now)),
        ];

        'indexes: for (index, due_before) in scans {
            let options = ScanOptions {
                batch_size,
                due_before,
            };
            for entry in IndexScan::new(store, index, options) {
                let entry = entry?;
                report.scanned += 1;

                if !self.claim(&entry.task_id) {
                    report.in_flight += 1;
                    continue;
                }

                match self.work_tx.try_send(WorkItem {
                    task_id: entry.task_id.clone(),
                }) {
                    Ok(()) => report.dispatched += 1,
                    Err(mpsc::error::TrySendError::Full(item)) => {
                        self.release(&item.task_id);
                        report.deferred += 1;
                        metrics::DISPATCH_DEFERRED.inc();
                        // Queue is full; everything else waits for the next beat.
                        break 'indexes;
                    }
                    Err(mpsc::error::TrySendError::Closed(item)) => {
                        self.release(&item.task_id);
                        warn!("Work queue closed, stopping beat");
                        break 'indexes;
                    }
                }
            }
        }

        self.beats.fetch_add(1, Ordering::Relaxed);
        *self.last_beat_at.lock().unwrap() = Some(now);
        metrics::BEATS.inc();

        if report.dispatched > 0 || report.deferred > 0 {
            info!(
                scanned = report.scanned,
                dispatched = report.dispatched,
                in_flight = report.in_flight,
                deferred = report.deferred,
                "Beat dispatched work"
            );
        } else {
            debug!(scanned = report.scanned, "Beat found nothing to dispatch");
        }

        Ok(report)
    }

    /// Mark a task in flight. Returns false if it already was.
    fn claim(&self, task_id: &str) -> bool {
        self.in_flight.lock().unwrap().insert(task_id.to_string())
    }

    fn release(&self, task_id: &str) {
        self.in_flight.lock().unwrap().remove(task_id);
    }
}

/// The task orchestrator: accepts submissions and drives tasks to a terminal
/// state.
pub struct TaskOrchestrator {
    shared: Arc<Shared>,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl TaskOrchestrator {
    /// Create a new orchestrator. Nothing runs until [`start`](Self::start).
    pub fn new(ctx: Arc<OrchestratorContext>) -> Self {
        let (work_tx, work_rx) = mpsc::channel(ctx.config.queue_capacity.max(1));
        let (shutdown_tx, _) = broadcast::channel(1);
        let instance_id = format!("genbroker-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);

        Self {
            shared: Arc::new(Shared {
                ctx,
                instance_id,
                in_flight: Mutex::new(HashSet::new()),
                work_tx,
                work_rx: tokio::sync::Mutex::new(work_rx),
                beats: AtomicU64::new(0),
                last_beat_at: Mutex::new(None),
            }),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Shared dependencies.
    pub fn context(&self) -> &Arc<OrchestratorContext> {
        &self.shared.ctx
    }

    /// Lease holder prefix for this instance.
    pub fn instance_id(&self) -> &str {
        &self.shared.instance_id
    }

    /// Check if the orchestrator is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the worker pool and the beat loop.
    ///
    /// The first beat runs immediately, which picks up tasks persisted by a
    /// previous process.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Orchestrator already running");
            return;
        }

        info!(
            instance_id = %self.shared.instance_id,
            workers = self.shared.ctx.config.worker_pool_size,
            beat_interval_secs = self.shared.ctx.config.beat_interval_secs,
            "Starting task orchestrator"
        );

        for worker in 0..self.shared.ctx.config.worker_pool_size.max(1) {
            self.spawn_worker(worker);
        }
        self.spawn_beat_loop();

        info!("Task orchestrator started");
    }

    /// Stop the orchestrator gracefully.
    ///
    /// Workers finish the item they are on; leases left behind expire on
    /// their own.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Orchestrator not running");
            return;
        }

        info!("Stopping task orchestrator");

        // Signal shutdown to all workers
        let _ = self.shutdown_tx.send(());

        // Give workers a moment to finish current work
        tokio::time::sleep(Duration::from_millis(500)).await;

        info!("Task orchestrator stopped");
    }

    /// Run one beat now, outside the schedule.
    pub fn beat_now(&self) -> Result<BeatReport, OrchestratorError> {
        self.shared.beat()
    }

    /// Run one work item for a task inline, bypassing the queue.
    pub async fn drive(&self, task_id: &str) -> WorkOutcome {
        if !self.shared.claim(task_id) {
            return WorkOutcome::Conflict;
        }
        let holder = format!("{}/inline", self.shared.instance_id);
        let outcome = execute(&self.shared.ctx, &holder, task_id).await;
        self.shared.release(task_id);
        outcome
    }

    /// Accept a new generation request.
    pub fn submit(&self, task_type: &str, payload: Value) -> Result<TaskRecord, OrchestratorError> {
        if !is_valid_task_type(task_type) || !self.shared.ctx.providers.contains(task_type) {
            return Err(OrchestratorError::UnknownTaskType(task_type.to_string()));
        }
        if !payload.is_object() {
            return Err(OrchestratorError::InvalidPayload(
                "payload must be a JSON object".to_string(),
            ));
        }

        let task = self.shared.ctx.store.create(CreateTaskRequest {
            task_id: generate_task_id(task_type, Utc::now()),
            task_type: task_type.to_string(),
            payload,
        })?;

        metrics::TASKS_SUBMITTED.with_label_values(&[task_type]).inc();
        info!(task_id = %task.task_id, task_type = %task_type, "Task submitted");

        if self.shared.ctx.config.kick_on_submit && self.is_running() {
            if let Err(e) = self.shared.beat() {
                warn!(error = %e, "Beat after submission failed");
            }
        }

        Ok(task)
    }

    /// Status of a task by id.
    pub fn get_status(&self, task_id: &str) -> Result<TaskStatusView, OrchestratorError> {
        self.shared
            .ctx
            .store
            .get(task_id)?
            .map(|task| TaskStatusView::from(&task))
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.to_string()))
    }

    /// Status of a task by provider job id.
    ///
    /// Without a task type, a job id that several providers issued is
    /// reported as ambiguous rather than guessed.
    pub fn get_status_by_external_job(
        &self,
        external_job_id: &str,
        task_type: Option<&str>,
    ) -> Result<TaskStatusView, OrchestratorError> {
        let mut matches = self
            .shared
            .ctx
            .store
            .find_by_external_job(external_job_id, task_type)?;

        match matches.len() {
            0 => Err(OrchestratorError::TaskNotFound(external_job_id.to_string())),
            1 => Ok(TaskStatusView::from(&matches.remove(0))),
            _ => Err(OrchestratorError::AmbiguousTaskId {
                external_job_id: external_job_id.to_string(),
                task_ids: matches.into_iter().map(|t| t.task_id).collect(),
            }),
        }
    }

    /// Get current orchestrator status.
    pub fn status(&self) -> Result<OrchestratorStatus, OrchestratorError> {
        let store = &self.shared.ctx.store;
        Ok(OrchestratorStatus {
            running: self.is_running(),
            worker_pool_size: self.shared.ctx.config.worker_pool_size,
            in_flight: self.shared.in_flight.lock().unwrap().len(),
            beats: self.shared.beats.load(Ordering::Relaxed),
            last_beat_at: *self.shared.last_beat_at.lock().unwrap(),
            pending_count: store.index_len(QueueIndex::Pending)?,
            monitoring_count: store.index_len(QueueIndex::Monitoring)?,
            retry_count: store.index_len(QueueIndex::Retry)?,
            completed_count: store.index_len(QueueIndex::Completed)?,
            failed_count: store.index_len(QueueIndex::Failed)?,
        })
    }

    /// Spawn the periodic beat.
    fn spawn_beat_loop(&self) {
        let running = Arc::clone(&self.running);
        let shared = Arc::clone(&self.shared);
        let interval = Duration::from_secs(shared.ctx.config.beat_interval_secs.max(1));
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Beat loop started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Beat loop received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        if let Err(e) = shared.beat() {
                            warn!("Beat error: {}", e);
                        }
                    }
                }
            }
            info!("Beat loop stopped");
        });
    }

    /// Spawn one worker pulling from the shared queue.
    fn spawn_worker(&self, worker: usize) {
        let shared = Arc::clone(&self.shared);
        let holder = holder_id(&shared.instance_id, worker);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            debug!(holder = %holder, "Worker started");
            loop {
                let item = tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    item = async { shared.work_rx.lock().await.recv().await } => item,
                };
                let Some(item) = item else {
                    break;
                };

                let outcome = execute(&shared.ctx, &holder, &item.task_id).await;
                shared.release(&item.task_id);
                debug!(
                    holder = %holder,
                    task_id = %item.task_id,
                    outcome = outcome.label(),
                    "Work item finished"
                );
            }
            debug!(holder = %holder, "Worker stopped");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::OrchestratorConfig;
    use crate::task::TaskState;
    use crate::testing::fixtures::{orchestrator_with, TestHarness};
    use crate::testing::MockProvider;
    use serde_json::json;

    fn harness() -> TestHarness {
        let mut config = OrchestratorConfig::default();
        config.queue_capacity = 2;
        TestHarness::new(config, vec![MockProvider::video("video_a")])
    }

    #[tokio::test]
    async fn test_submit_creates_submitted_task() {
        let h = harness();
        let orchestrator = orchestrator_with(&h);

        let task = orchestrator
            .submit("video_a", json!({"prompt": "a fox"}))
            .unwrap();
        assert!(task.task_id.starts_with("video_a:"));
        assert_eq!(task.state, TaskState::Submitted);

        let view = orchestrator.get_status(&task.task_id).unwrap();
        assert_eq!(view.state, "submitted");
    }

    #[tokio::test]
    async fn test_submit_rejects_unknown_type_and_bad_payload() {
        let h = harness();
        let orchestrator = orchestrator_with(&h);

        assert!(matches!(
            orchestrator.submit("image_z", json!({})),
            Err(OrchestratorError::UnknownTaskType(_))
        ));
        assert!(matches!(
            orchestrator.submit("video_a", json!("just a string")),
            Err(OrchestratorError::InvalidPayload(_))
        ));
        assert_eq!(orchestrator.status().unwrap().pending_count, 0);
    }

    #[tokio::test]
    async fn test_get_status_missing() {
        let h = harness();
        let orchestrator = orchestrator_with(&h);
        assert!(matches!(
            orchestrator.get_status("video_a:1-missing"),
            Err(OrchestratorError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_beat_defers_when_queue_full() {
        let h = harness();
        let orchestrator = orchestrator_with(&h);
        for _ in 0..3 {
            orchestrator.submit("video_a", json!({})).unwrap();
        }

        let report = orchestrator.beat_now().unwrap();
        assert_eq!(report.dispatched, 2);
        assert_eq!(report.deferred, 1);

        // Nothing consumed the queue, so the second beat sees them in flight.
        let report = orchestrator.beat_now().unwrap();
        assert_eq!(report.dispatched, 0);
        assert_eq!(report.in_flight, 2);
        assert_eq!(orchestrator.status().unwrap().in_flight, 2);
    }

    #[tokio::test]
    async fn test_drive_skips_task_in_flight() {
        let h = harness();
        let orchestrator = orchestrator_with(&h);
        let task = orchestrator.submit("video_a", json!({})).unwrap();

        orchestrator.beat_now().unwrap();
        assert_eq!(orchestrator.drive(&task.task_id).await, WorkOutcome::Conflict);
    }

    #[tokio::test]
    async fn test_status_by_external_job_ambiguous() {
        let h = TestHarness::new(
            OrchestratorConfig::default(),
            vec![MockProvider::video("video_a"), MockProvider::image("image_b")],
        );
        let orchestrator = orchestrator_with(&h);

        let a = orchestrator.submit("video_a", json!({})).unwrap();
        let b = orchestrator.submit("image_b", json!({})).unwrap();
        h.providers[0].push_create(Ok("shared-1".to_string()));
        h.providers[1].push_create(Ok("shared-1".to_string()));
        orchestrator.drive(&a.task_id).await;
        orchestrator.drive(&b.task_id).await;

        assert!(matches!(
            orchestrator.get_status_by_external_job("shared-1", None),
            Err(OrchestratorError::AmbiguousTaskId { .. })
        ));
        let view = orchestrator
            .get_status_by_external_job("shared-1", Some("image_b"))
            .unwrap();
        assert_eq!(view.task_id, b.task_id);
        assert_eq!(view.state, "generating");
    }

    #[tokio::test]
    async fn test_start_stop() {
        let h = harness();
        let orchestrator = orchestrator_with(&h);

        orchestrator.start().await;
        assert!(orchestrator.is_running());
        orchestrator.start().await; // warns, no-op

        // Let the immediate first beat run.
        tokio::time::sleep(Duration::from_millis(50)).await;
        orchestrator.stop().await;
        assert!(!orchestrator.is_running());
        assert!(orchestrator.status().unwrap().beats >= 1);
    }
}
