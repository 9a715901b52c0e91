//! Execution of a single work item.
//!
//! A work item claims the task's lease, then advances the task through as
//! many states as it can without waiting on the provider. Every transition
//! goes through [`TaskStore::transition_leased`], so a worker whose lease
//! was taken over cannot commit anything.
//!
//! [`TaskStore::transition_leased`]: crate::task::TaskStore::transition_leased

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::artifact::{ArtifactError, ArtifactMetadata, StagedArtifact};
use crate::metrics;
use crate::notifier::NotificationEvent;
use crate::provider::PollOutcome;
use crate::task::{
    ErrorDescriptor, ErrorKind, Lease, TaskError, TaskEvent, TaskRecord, TaskState,
};

use super::context::OrchestratorContext;
use super::types::WorkOutcome;

/// Run one work item for `task_id` on behalf of `holder`.
pub(crate) async fn execute(ctx: &OrchestratorContext, holder: &str, task_id: &str) -> WorkOutcome {
    let started = Instant::now();
    let ttl = Duration::from_secs(ctx.config.lease_ttl_secs);

    let outcome = match ctx.store.acquire_lease(task_id, holder, ttl) {
        Ok(Some(lease)) => {
            let budget = Duration::from_secs(ctx.config.work_item_timeout_secs);
            let outcome = match tokio::time::timeout(budget, advance(ctx, &lease)).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    warn!(task_id = %task_id, error = %e, "Work item failed");
                    WorkOutcome::Error(e.to_string())
                }
                Err(_) => {
                    warn!(
                        task_id = %task_id,
                        budget_secs = budget.as_secs(),
                        "Work item exceeded its time budget"
                    );
                    WorkOutcome::TimedOut
                }
            };
            if let Err(e) = ctx.store.release_lease(&lease) {
                warn!(task_id = %task_id, error = %e, "Failed to release lease");
            }
            outcome
        }
        Ok(None) => {
            metrics::LEASE_CONFLICTS.inc();
            debug!(task_id = %task_id, holder = %holder, "Task is leased elsewhere, skipping");
            WorkOutcome::Conflict
        }
        Err(e) => {
            warn!(task_id = %task_id, error = %e, "Failed to acquire lease");
            WorkOutcome::Error(e.to_string())
        }
    };

    metrics::WORK_ITEMS
        .with_label_values(&[outcome.label()])
        .inc();
    metrics::WORK_ITEM_DURATION
        .with_label_values(&[outcome.label()])
        .observe(started.elapsed().as_secs_f64());

    outcome
}

/// Drive the leased task until it is terminal or has to wait.
async fn advance(ctx: &OrchestratorContext, lease: &Lease) -> Result<WorkOutcome, TaskError> {
    let initial = ctx
        .store
        .get(&lease.task_id)?
        .ok_or_else(|| TaskError::NotFound(lease.task_id.clone()))?;

    if initial.state.is_terminal() {
        return Ok(WorkOutcome::Idle);
    }

    let provider = match ctx.providers.get(&initial.task_type) {
        Some(provider) => provider,
        None => {
            let error = ErrorDescriptor::permanent(format!(
                "no provider registered for task type {}",
                initial.task_type
            ));
            let task = step(ctx, lease, &initial, TaskEvent::Fail { error })?;
            finish(ctx, &initial, &task);
            return Ok(outcome_for(&initial, &task));
        }
    };

    let mut task = initial.clone();
    let mut staged: Option<StagedArtifact> = None;
    let mut metadata: Option<ArtifactMetadata> = None;

    loop {
        match task.state {
            TaskState::Completed | TaskState::Failed => break,

            TaskState::Submitted => {
                task = step(ctx, lease, &task, TaskEvent::Enqueue)?;
            }

            TaskState::Pending => {
                let created = provider.create(&task.payload).await;
                match created {
                    Ok(external_job_id) => {
                        info!(
                            task_id = %task.task_id,
                            external_job_id = %external_job_id,
                            "Provider accepted job"
                        );
                        task = step(ctx, lease, &task, TaskEvent::ExternalCreateOk { external_job_id })?;
                        // Generation takes a while; the next beat polls.
                        break;
                    }
                    Err(e) if e.is_transient() => {
                        let error = ErrorDescriptor::transient(e.to_string());
                        task = fail_transient(ctx, lease, &task, error, |error, retry_after| {
                            TaskEvent::ExternalCreateFail { error, retry_after }
                        })?;
                    }
                    Err(e) => {
                        let error = ErrorDescriptor::permanent(e.to_string());
                        task = step(ctx, lease, &task, TaskEvent::Fail { error })?;
                    }
                }
            }

            TaskState::Generating => {
                let Some(external_job_id) = task.external_job_id.clone() else {
                    let error = ErrorDescriptor::permanent("generating without an external job id");
                    task = step(ctx, lease, &task, TaskEvent::Fail { error })?;
                    continue;
                };

                let polled = ctx.poller.poll(provider.as_ref(), &external_job_id).await;
                match polled {
                    PollOutcome::Running { progress_hint } => {
                        task = step(ctx, lease, &task, TaskEvent::ExternalPollRunning { progress_hint })?;
                        break;
                    }
                    PollOutcome::Done { locator } => {
                        task = step(ctx, lease, &task, TaskEvent::ExternalPollDone { locator })?;
                    }
                    PollOutcome::TransientError { message } => {
                        let error = ErrorDescriptor::transient(message);
                        task = fail_transient(ctx, lease, &task, error, |error, retry_after| {
                            TaskEvent::ExternalPollError { error, retry_after }
                        })?;
                    }
                    PollOutcome::PermanentError { message } => {
                        let error = ErrorDescriptor::permanent(message);
                        task = step(ctx, lease, &task, TaskEvent::Fail { error })?;
                    }
                }
            }

            TaskState::ExternalCompleted => {
                task = step(ctx, lease, &task, TaskEvent::BeginDownload)?;
            }

            TaskState::Downloading => {
                let fetched = ctx.pipeline.stage(&task).await;
                match fetched {
                    Ok(artifact) => {
                        staged = Some(artifact);
                        task = step(ctx, lease, &task, TaskEvent::DownloadOk)?;
                    }
                    Err(e) => {
                        task = artifact_failure(ctx, lease, &task, e, |error, retry_after| {
                            TaskEvent::DownloadFail { error, retry_after }
                        })?;
                    }
                }
            }

            TaskState::Processing => {
                if staged.is_none() {
                    // Resumed after a restart or a retry: nothing is staged.
                    let restaged = ctx.pipeline.stage(&task).await;
                    match restaged {
                        Ok(artifact) => staged = Some(artifact),
                        Err(e) => {
                            warn!(task_id = %task.task_id, error = %e, "Could not restage artifact for validation");
                            task = artifact_failure(ctx, lease, &task, e, |error, retry_after| {
                                TaskEvent::ProcessingFail { error, retry_after }
                            })?;
                            continue;
                        }
                    }
                }
                let Some(artifact) = staged.as_ref() else {
                    break;
                };

                match ctx.pipeline.inspect(artifact, provider.media_class()) {
                    Ok(signature) => {
                        metadata = Some(ctx.pipeline.describe(&task, artifact, signature));
                        task = step(ctx, lease, &task, TaskEvent::ValidateOk)?;
                    }
                    Err(e) => {
                        let error = ErrorDescriptor::new(ErrorKind::ArtifactValidationError, e.to_string());
                        task = step(ctx, lease, &task, TaskEvent::ValidateFail { error })?;
                    }
                }
            }

            TaskState::Uploading => {
                if staged.is_none() {
                    let restaged = ctx.pipeline.stage(&task).await;
                    match restaged {
                        Ok(artifact) => staged = Some(artifact),
                        Err(e) => {
                            task = artifact_failure(ctx, lease, &task, e, |error, retry_after| {
                                TaskEvent::UploadFail { error, retry_after }
                            })?;
                            continue;
                        }
                    }
                }
                let Some(artifact) = staged.as_ref() else {
                    break;
                };

                if metadata.is_none() {
                    match ctx.pipeline.inspect(artifact, provider.media_class()) {
                        Ok(signature) => {
                            metadata = Some(ctx.pipeline.describe(&task, artifact, signature));
                        }
                        Err(e) => {
                            let error = ErrorDescriptor::new(
                                ErrorKind::ArtifactValidationError,
                                e.to_string(),
                            );
                            task = step(ctx, lease, &task, TaskEvent::Fail { error })?;
                            continue;
                        }
                    }
                }
                let Some(described) = metadata.clone() else {
                    break;
                };

                let uploaded = ctx.pipeline.upload(&task, artifact, &described).await;
                match uploaded {
                    Ok(artifact_ref) => {
                        task = step(
                            ctx,
                            lease,
                            &task,
                            TaskEvent::UploadOk {
                                artifact_ref,
                                metadata: described,
                            },
                        )?;
                    }
                    Err(e) => {
                        task = artifact_failure(ctx, lease, &task, e, |error, retry_after| {
                            TaskEvent::UploadFail { error, retry_after }
                        })?;
                    }
                }
            }

            TaskState::RetryPending { retry_after, .. } => {
                if retry_after > Utc::now() {
                    break;
                }
                task = step(ctx, lease, &task, TaskEvent::Resume)?;
            }
        }
    }

    finish(ctx, &initial, &task);
    Ok(outcome_for(&initial, &task))
}

/// Apply one event under the lease.
fn step(
    ctx: &OrchestratorContext,
    lease: &Lease,
    task: &TaskRecord,
    event: TaskEvent,
) -> Result<TaskRecord, TaskError> {
    match ctx.store.transition_leased(lease, &event) {
        Ok(next) => {
            let from = task.state.state_type();
            let to = next.state.state_type();
            if next.history.len() > task.history.len() {
                metrics::TASK_TRANSITIONS.with_label_values(&[from, to]).inc();
                info!(
                    task_id = %next.task_id,
                    from = %from,
                    to = %to,
                    event = %event.name(),
                    attempt_count = next.attempt_count,
                    "Task transitioned"
                );
            } else {
                debug!(
                    task_id = %next.task_id,
                    state = %to,
                    progress = ?next.progress_hint,
                    "Task still generating"
                );
            }
            Ok(next)
        }
        Err(TaskError::Rejected(rejected)) => {
            metrics::TRANSITIONS_REJECTED
                .with_label_values(&[rejected.event])
                .inc();
            warn!(
                task_id = %rejected.task_id,
                state = %rejected.state,
                event = %rejected.event,
                reason = %rejected.reason,
                "Transition rejected"
            );
            Err(TaskError::Rejected(rejected))
        }
        Err(e) => Err(e),
    }
}

/// Record a transient failure, then give up if the phase budget is spent.
fn fail_transient(
    ctx: &OrchestratorContext,
    lease: &Lease,
    task: &TaskRecord,
    error: ErrorDescriptor,
    event: impl FnOnce(ErrorDescriptor, DateTime<Utc>) -> TaskEvent,
) -> Result<TaskRecord, TaskError> {
    let retry = &ctx.config.retry;
    let delay = retry.delay_for(task.attempt_count.saturating_add(1));
    let delay = chrono::Duration::from_std(delay)
        .unwrap_or_else(|_| chrono::Duration::seconds(retry.max_delay_secs as i64));

    let next = step(ctx, lease, task, event(error, Utc::now() + delay))?;
    if next.attempt_count >= retry.max_attempts {
        warn!(
            task_id = %next.task_id,
            attempts = next.attempt_count,
            "Retry budget exhausted"
        );
        return step(ctx, lease, &next, TaskEvent::AttemptsExhausted);
    }
    Ok(next)
}

/// Route an artifact error: retryable ones go through the phase's transient
/// event, everything else fails the task.
fn artifact_failure(
    ctx: &OrchestratorContext,
    lease: &Lease,
    task: &TaskRecord,
    err: ArtifactError,
    event: impl FnOnce(ErrorDescriptor, DateTime<Utc>) -> TaskEvent,
) -> Result<TaskRecord, TaskError> {
    let error = ErrorDescriptor::new(err.kind(), err.to_string());
    if err.is_retryable() {
        fail_transient(ctx, lease, task, error, event)
    } else {
        step(ctx, lease, task, TaskEvent::Fail { error })
    }
}

/// Emit the terminal notification when this work item ended the task.
fn finish(ctx: &OrchestratorContext, initial: &TaskRecord, task: &TaskRecord) {
    if initial.state.is_terminal() || !task.state.is_terminal() {
        return;
    }
    if let Some(event) = NotificationEvent::for_terminal(task) {
        ctx.notifications.emit(event);
    }
}

fn outcome_for(initial: &TaskRecord, task: &TaskRecord) -> WorkOutcome {
    if task.history.len() > initial.history.len() {
        WorkOutcome::Advanced {
            state: task.state.state_type().to_string(),
        }
    } else {
        WorkOutcome::Idle
    }
}

/// Worker id used as lease holder.
pub(crate) fn holder_id(instance: &str, worker: usize) -> String {
    format!("{}/worker-{}", instance, worker)
}
