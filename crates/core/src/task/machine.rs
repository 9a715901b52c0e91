//! Task state machine.
//!
//! Pure decision logic: given the stored record and an event, either produce
//! the next record or reject the event. Persistence and side effects live in
//! the store and the orchestrator.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::artifact::ArtifactMetadata;

use super::types::{ErrorDescriptor, HistoryEntry, TaskPhase, TaskRecord, TaskState};

/// Something that happened to a task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// A worker picked up a freshly submitted task.
    Enqueue,
    /// The provider accepted the job.
    ExternalCreateOk { external_job_id: String },
    /// The create call failed transiently.
    ExternalCreateFail {
        error: ErrorDescriptor,
        retry_after: DateTime<Utc>,
    },
    /// The provider finished the job and published its result.
    ExternalPollDone { locator: String },
    /// The provider is still working.
    ExternalPollRunning { progress_hint: Option<String> },
    /// Polling failed transiently.
    ExternalPollError {
        error: ErrorDescriptor,
        retry_after: DateTime<Utc>,
    },
    BeginDownload,
    DownloadOk,
    DownloadFail {
        error: ErrorDescriptor,
        retry_after: DateTime<Utc>,
    },
    /// Re-staging the artifact for validation failed transiently.
    ProcessingFail {
        error: ErrorDescriptor,
        retry_after: DateTime<Utc>,
    },
    ValidateOk,
    /// The artifact is unusable. Never retried.
    ValidateFail { error: ErrorDescriptor },
    UploadOk {
        artifact_ref: String,
        metadata: ArtifactMetadata,
    },
    UploadFail {
        error: ErrorDescriptor,
        retry_after: DateTime<Utc>,
    },
    /// The per-phase retry budget is spent.
    AttemptsExhausted,
    /// Backoff elapsed; re-enter the failed phase.
    Resume,
    /// Permanent error from any non-terminal state.
    Fail { error: ErrorDescriptor },
}

impl TaskEvent {
    /// Event name (for logging and metrics).
    pub fn name(&self) -> &'static str {
        match self {
            TaskEvent::Enqueue => "enqueue",
            TaskEvent::ExternalCreateOk { .. } => "external_create_ok",
            TaskEvent::ExternalCreateFail { .. } => "external_create_fail",
            TaskEvent::ExternalPollDone { .. } => "external_poll_done",
            TaskEvent::ExternalPollRunning { .. } => "external_poll_running",
            TaskEvent::ExternalPollError { .. } => "external_poll_error",
            TaskEvent::BeginDownload => "begin_download",
            TaskEvent::DownloadOk => "download_ok",
            TaskEvent::DownloadFail { .. } => "download_fail",
            TaskEvent::ProcessingFail { .. } => "processing_fail",
            TaskEvent::ValidateOk => "validate_ok",
            TaskEvent::ValidateFail { .. } => "validate_fail",
            TaskEvent::UploadOk { .. } => "upload_ok",
            TaskEvent::UploadFail { .. } => "upload_fail",
            TaskEvent::AttemptsExhausted => "attempts_exhausted",
            TaskEvent::Resume => "resume",
            TaskEvent::Fail { .. } => "fail",
        }
    }

    /// Whether this event counts against the phase retry budget.
    pub fn is_transient_failure(&self) -> bool {
        matches!(
            self,
            TaskEvent::ExternalCreateFail { .. }
                | TaskEvent::ExternalPollError { .. }
                | TaskEvent::DownloadFail { .. }
                | TaskEvent::ProcessingFail { .. }
                | TaskEvent::UploadFail { .. }
        )
    }
}

/// An event whose precondition does not match the stored state.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("event {event} rejected for task {task_id} in state {state}: {reason}")]
pub struct TransitionRejected {
    pub task_id: String,
    pub state: String,
    pub event: &'static str,
    pub reason: String,
}

impl TaskRecord {
    /// Apply an event, returning the updated record.
    ///
    /// The receiver is left untouched; on rejection the stored record stays as
    /// it was.
    pub fn apply(
        &self,
        event: &TaskEvent,
        now: DateTime<Utc>,
    ) -> Result<TaskRecord, TransitionRejected> {
        let reject = |reason: &str| TransitionRejected {
            task_id: self.task_id.clone(),
            state: self.state.state_type().to_string(),
            event: event.name(),
            reason: reason.to_string(),
        };

        if self.state.is_terminal() {
            return Err(reject("task is terminal"));
        }

        let mut next = self.clone();
        next.updated_at = now;

        let next_state = match (&self.state, event) {
            (TaskState::Submitted, TaskEvent::Enqueue) => TaskState::Pending,

            (TaskState::Pending, TaskEvent::ExternalCreateOk { external_job_id }) => {
                if self.external_job_id.is_some() {
                    return Err(reject("external_job_id already set"));
                }
                next.external_job_id = Some(external_job_id.clone());
                TaskState::Generating
            }
            (TaskState::Pending, TaskEvent::ExternalCreateFail { retry_after, .. }) => {
                TaskState::RetryPending {
                    phase: TaskPhase::Create,
                    retry_after: *retry_after,
                }
            }

            (TaskState::Generating, TaskEvent::ExternalPollDone { locator }) => {
                next.result_locator = Some(locator.clone());
                TaskState::ExternalCompleted
            }
            (TaskState::Generating, TaskEvent::ExternalPollRunning { progress_hint }) => {
                // Refresh only: no history entry, no counter change.
                if progress_hint.is_some() {
                    next.progress_hint = progress_hint.clone();
                }
                return Ok(next);
            }
            (TaskState::Generating, TaskEvent::ExternalPollError { retry_after, .. }) => {
                TaskState::RetryPending {
                    phase: TaskPhase::Generation,
                    retry_after: *retry_after,
                }
            }

            (TaskState::ExternalCompleted, TaskEvent::BeginDownload) => TaskState::Downloading,

            (TaskState::Downloading, TaskEvent::DownloadOk) => TaskState::Processing,
            (TaskState::Downloading, TaskEvent::DownloadFail { retry_after, .. }) => {
                TaskState::RetryPending {
                    phase: TaskPhase::Download,
                    retry_after: *retry_after,
                }
            }

            (TaskState::Processing, TaskEvent::ProcessingFail { retry_after, .. }) => {
                TaskState::RetryPending {
                    phase: TaskPhase::Processing,
                    retry_after: *retry_after,
                }
            }
            (TaskState::Processing, TaskEvent::ValidateOk) => TaskState::Uploading,
            (TaskState::Processing, TaskEvent::ValidateFail { .. }) => TaskState::Failed,

            (
                TaskState::Uploading,
                TaskEvent::UploadOk {
                    artifact_ref,
                    metadata,
                },
            ) => {
                next.artifact_ref = Some(artifact_ref.clone());
                next.artifact_metadata = Some(metadata.clone());
                TaskState::Completed
            }
            (TaskState::Uploading, TaskEvent::UploadFail { retry_after, .. }) => {
                TaskState::RetryPending {
                    phase: TaskPhase::Upload,
                    retry_after: *retry_after,
                }
            }

            (TaskState::RetryPending { .. }, TaskEvent::AttemptsExhausted) => TaskState::Failed,
            (TaskState::RetryPending { phase, .. }, TaskEvent::Resume) => phase.entry_state(),

            (_, TaskEvent::Fail { .. }) => TaskState::Failed,

            _ => return Err(reject("precondition does not match")),
        };

        if let Some(error) = event_error(event) {
            let mut error = error.clone();
            error.phase = self.state.phase();
            next.last_error = Some(error);
        }

        match (self.state.phase(), next_state.phase()) {
            (Some(from), Some(to)) if from != to => next.attempt_count = 0,
            _ => {}
        }
        if event.is_transient_failure() {
            next.attempt_count = self.attempt_count.saturating_add(1);
        }

        next.history.push(HistoryEntry {
            at: now,
            from_state: Some(self.state.state_type().to_string()),
            to_state: next_state.state_type().to_string(),
            note: Some(history_note(event)),
        });
        next.state = next_state;

        Ok(next)
    }
}

fn event_error(event: &TaskEvent) -> Option<&ErrorDescriptor> {
    match event {
        TaskEvent::ExternalCreateFail { error, .. }
        | TaskEvent::ExternalPollError { error, .. }
        | TaskEvent::DownloadFail { error, .. }
        | TaskEvent::ProcessingFail { error, .. }
        | TaskEvent::ValidateFail { error }
        | TaskEvent::UploadFail { error, .. }
        | TaskEvent::Fail { error } => Some(error),
        _ => None,
    }
}

fn history_note(event: &TaskEvent) -> String {
    match event_error(event) {
        Some(error) => format!("{}: {}", event.name(), error.message),
        None => event.name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::MediaClass;
    use crate::task::ErrorKind;

    fn record() -> TaskRecord {
        TaskRecord::new(
            "video_a:1700000000-abc",
            "video_a",
            serde_json::json!({"prompt": "a cat"}),
            Utc::now(),
        )
    }

    fn step(record: &TaskRecord, event: TaskEvent) -> TaskRecord {
        record.apply(&event, Utc::now()).unwrap()
    }

    fn metadata() -> ArtifactMetadata {
        ArtifactMetadata {
            content_type: "video/mp4".to_string(),
            extension: "mp4".to_string(),
            media_class: MediaClass::Video,
            size_bytes: 42,
            sha256: "abc".to_string(),
            md5: "def".to_string(),
            params: serde_json::json!({}),
        }
    }

    fn to_generating() -> TaskRecord {
        let r = step(&record(), TaskEvent::Enqueue);
        step(
            &r,
            TaskEvent::ExternalCreateOk {
                external_job_id: "job-1".to_string(),
            },
        )
    }

    #[test]
    fn test_happy_path_history_is_ordered() {
        let r = to_generating();
        let r = step(
            &r,
            TaskEvent::ExternalPollDone {
                locator: "https://cdn/x.mp4".to_string(),
            },
        );
        let r = step(&r, TaskEvent::BeginDownload);
        let r = step(&r, TaskEvent::DownloadOk);
        let r = step(&r, TaskEvent::ValidateOk);
        let r = step(
            &r,
            TaskEvent::UploadOk {
                artifact_ref: "k".to_string(),
                metadata: metadata(),
            },
        );

        assert_eq!(r.state, TaskState::Completed);
        assert_eq!(r.artifact_ref.as_deref(), Some("k"));
        assert_eq!(r.result_locator.as_deref(), Some("https://cdn/x.mp4"));
        let path: Vec<&str> = r.history.iter().map(|h| h.to_state.as_str()).collect();
        assert_eq!(
            path,
            vec![
                "submitted",
                "pending",
                "generating",
                "external_completed",
                "downloading",
                "processing",
                "uploading",
                "completed"
            ]
        );
        for pair in r.history.windows(2) {
            assert_eq!(pair[1].from_state.as_deref(), Some(pair[0].to_state.as_str()));
        }
    }

    #[test]
    fn test_precondition_mismatch_is_rejected() {
        let r = record();
        let err = r.apply(&TaskEvent::DownloadOk, Utc::now()).unwrap_err();
        assert_eq!(err.state, "submitted");
        assert_eq!(err.event, "download_ok");
    }

    #[test]
    fn test_terminal_event_twice_is_rejected() {
        let r = step(
            &record(),
            TaskEvent::Fail {
                error: ErrorDescriptor::permanent("bad request"),
            },
        );
        assert_eq!(r.state, TaskState::Failed);

        let again = r.apply(
            &TaskEvent::Fail {
                error: ErrorDescriptor::permanent("bad request"),
            },
            Utc::now(),
        );
        assert!(again.is_err());
    }

    #[test]
    fn test_poll_running_refreshes_without_history() {
        let r = to_generating();
        let before = r.history.len();
        let later = r.updated_at + chrono::Duration::seconds(5);
        let next = r
            .apply(
                &TaskEvent::ExternalPollRunning {
                    progress_hint: Some("45%".to_string()),
                },
                later,
            )
            .unwrap();

        assert_eq!(next.state, TaskState::Generating);
        assert_eq!(next.history.len(), before);
        assert_eq!(next.updated_at, later);
        assert_eq!(next.progress_hint.as_deref(), Some("45%"));
    }

    #[test]
    fn test_transient_failures_count_within_phase() {
        let r = step(&record(), TaskEvent::Enqueue);
        let retry_after = Utc::now();
        let r = step(
            &r,
            TaskEvent::ExternalCreateFail {
                error: ErrorDescriptor::transient("HTTP 500"),
                retry_after,
            },
        );
        assert_eq!(r.attempt_count, 1);
        assert_eq!(
            r.state,
            TaskState::RetryPending {
                phase: TaskPhase::Create,
                retry_after
            }
        );
        let last_error = r.last_error.as_ref().unwrap();
        assert_eq!(last_error.kind, ErrorKind::TransientExternalError);
        assert_eq!(last_error.phase, Some(TaskPhase::Create));

        let r = step(&r, TaskEvent::Resume);
        assert_eq!(r.state, TaskState::Pending);
        assert_eq!(r.attempt_count, 1);

        let r = step(
            &r,
            TaskEvent::ExternalCreateFail {
                error: ErrorDescriptor::transient("HTTP 500"),
                retry_after,
            },
        );
        assert_eq!(r.attempt_count, 2);

        let r = step(&r, TaskEvent::AttemptsExhausted);
        assert_eq!(r.state, TaskState::Failed);
        assert_eq!(r.attempt_count, 2);
        assert!(r.external_job_id.is_none());
    }

    #[test]
    fn test_phase_change_resets_attempts() {
        let r = step(&record(), TaskEvent::Enqueue);
        let r = step(
            &r,
            TaskEvent::ExternalCreateFail {
                error: ErrorDescriptor::transient("timeout"),
                retry_after: Utc::now(),
            },
        );
        let r = step(&r, TaskEvent::Resume);
        assert_eq!(r.attempt_count, 1);

        let r = step(
            &r,
            TaskEvent::ExternalCreateOk {
                external_job_id: "job-9".to_string(),
            },
        );
        assert_eq!(r.attempt_count, 0);
    }

    #[test]
    fn test_validate_fail_keeps_attempt_count() {
        let r = to_generating();
        let r = step(
            &r,
            TaskEvent::ExternalPollDone {
                locator: "file:///tmp/x".to_string(),
            },
        );
        let r = step(&r, TaskEvent::BeginDownload);
        let r = step(&r, TaskEvent::DownloadOk);
        let entering = r.attempt_count;

        let r = step(
            &r,
            TaskEvent::ValidateFail {
                error: ErrorDescriptor::new(ErrorKind::ArtifactValidationError, "empty file"),
            },
        );
        assert_eq!(r.state, TaskState::Failed);
        assert_eq!(r.attempt_count, entering);
        assert_eq!(
            r.last_error.unwrap().kind,
            ErrorKind::ArtifactValidationError
        );
    }

    #[test]
    fn test_processing_fail_counts_against_processing_phase() {
        let r = to_generating();
        let r = step(
            &r,
            TaskEvent::ExternalPollDone {
                locator: "https://cdn/x.mp4".to_string(),
            },
        );
        let r = step(&r, TaskEvent::BeginDownload);
        let r = step(&r, TaskEvent::DownloadOk);
        assert_eq!(r.attempt_count, 0);

        let r = step(
            &r,
            TaskEvent::ProcessingFail {
                error: ErrorDescriptor::transient("connection refused"),
                retry_after: Utc::now(),
            },
        );
        assert!(matches!(
            r.state,
            TaskState::RetryPending {
                phase: TaskPhase::Processing,
                ..
            }
        ));
        assert_eq!(r.attempt_count, 1);
        assert_eq!(
            r.last_error.as_ref().unwrap().phase,
            Some(TaskPhase::Processing)
        );

        let r = step(&r, TaskEvent::Resume);
        assert_eq!(r.state, TaskState::Processing);
        assert_eq!(r.attempt_count, 1);

        let r = step(
            &r,
            TaskEvent::ProcessingFail {
                error: ErrorDescriptor::transient("connection refused"),
                retry_after: Utc::now(),
            },
        );
        let r = step(&r, TaskEvent::AttemptsExhausted);
        assert_eq!(r.state, TaskState::Failed);
        assert_eq!(r.attempt_count, 2);
    }

    #[test]
    fn test_external_job_id_set_once() {
        let r = to_generating();
        assert_eq!(r.external_job_id.as_deref(), Some("job-1"));

        let err = r
            .apply(
                &TaskEvent::ExternalCreateOk {
                    external_job_id: "job-2".to_string(),
                },
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(err.event, "external_create_ok");
    }

    #[test]
    fn test_resume_enters_phase_entry_state() {
        let r = to_generating();
        let r = step(
            &r,
            TaskEvent::ExternalPollError {
                error: ErrorDescriptor::transient("connection reset"),
                retry_after: Utc::now(),
            },
        );
        let r = step(&r, TaskEvent::Resume);
        assert_eq!(r.state, TaskState::Generating);
    }

    #[test]
    fn test_attempts_exhausted_only_from_retry_pending() {
        let r = to_generating();
        assert!(r.apply(&TaskEvent::AttemptsExhausted, Utc::now()).is_err());
    }
}
