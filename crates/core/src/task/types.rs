//! Core task data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactMetadata;

/// Execution phase a state belongs to.
///
/// `attempt_count` is scoped to a phase: it resets whenever a transition
/// crosses from one phase into another.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    /// Submission and the external create call.
    Create,
    /// Waiting for the provider to finish.
    Generation,
    /// Pulling the result artifact into staging.
    Download,
    /// Validating and describing the staged artifact.
    Processing,
    /// Writing the artifact to the object store.
    Upload,
}

impl TaskPhase {
    /// State a task re-enters when resuming this phase after a backoff.
    pub fn entry_state(&self) -> TaskState {
        match self {
            TaskPhase::Create => TaskState::Pending,
            TaskPhase::Generation => TaskState::Generating,
            TaskPhase::Download => TaskState::Downloading,
            TaskPhase::Processing => TaskState::Processing,
            TaskPhase::Upload => TaskState::Uploading,
        }
    }
}

impl std::fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskPhase::Create => write!(f, "create"),
            TaskPhase::Generation => write!(f, "generation"),
            TaskPhase::Download => write!(f, "download"),
            TaskPhase::Processing => write!(f, "processing"),
            TaskPhase::Upload => write!(f, "upload"),
        }
    }
}

/// Current state of a task.
///
/// State machine flow:
/// ```text
/// Submitted -> Pending -> Generating -> ExternalCompleted -> Downloading
///                 |           |                                 |
///                 v           v                                 v
///            RetryPending (resumes into the phase entry state)  Processing -> Uploading -> Completed
///
/// Any non-terminal state can transition to Failed.
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskState {
    /// Accepted, not yet picked up by a worker.
    Submitted,
    /// Queued for the external create call.
    Pending,
    /// The provider accepted the job and is working on it.
    Generating,
    /// The provider reported completion; the artifact has not been pulled yet.
    ExternalCompleted,
    /// The artifact is being downloaded into staging.
    Downloading,
    /// The staged artifact is being validated.
    Processing,
    /// The artifact is being written to the object store.
    Uploading,
    /// Artifact stored (terminal).
    Completed,
    /// Waiting out a backoff after a transient failure.
    RetryPending {
        /// Phase to resume.
        phase: TaskPhase,
        /// Earliest time the task may resume.
        retry_after: DateTime<Utc>,
    },
    /// Unrecoverable failure (terminal).
    Failed,
}

impl TaskState {
    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    /// Returns true if the task is waiting for a scheduled retry.
    pub fn is_retry_pending(&self) -> bool {
        matches!(self, TaskState::RetryPending { .. })
    }

    /// Returns the phase this state belongs to, if any.
    pub fn phase(&self) -> Option<TaskPhase> {
        match self {
            TaskState::Submitted | TaskState::Pending => Some(TaskPhase::Create),
            TaskState::Generating | TaskState::ExternalCompleted => Some(TaskPhase::Generation),
            TaskState::Downloading => Some(TaskPhase::Download),
            TaskState::Processing => Some(TaskPhase::Processing),
            TaskState::Uploading => Some(TaskPhase::Upload),
            TaskState::RetryPending { phase, .. } => Some(*phase),
            TaskState::Completed | TaskState::Failed => None,
        }
    }

    /// Returns the state type as a string (for filtering).
    pub fn state_type(&self) -> &'static str {
        match self {
            TaskState::Submitted => "submitted",
            TaskState::Pending => "pending",
            TaskState::Generating => "generating",
            TaskState::ExternalCompleted => "external_completed",
            TaskState::Downloading => "downloading",
            TaskState::Processing => "processing",
            TaskState::Uploading => "uploading",
            TaskState::Completed => "completed",
            TaskState::RetryPending { .. } => "retry_pending",
            TaskState::Failed => "failed",
        }
    }
}

/// Classification of a failure recorded on a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorKind {
    /// Timeout, 5xx, connection reset. Retried with backoff.
    TransientExternalError,
    /// 4xx, malformed request, provider-reported failure.
    PermanentExternalError,
    /// Artifact is empty, corrupt or of the wrong media type.
    ArtifactValidationError,
    /// Object store unavailable. Retried, escalated after max attempts.
    StorageError,
}

impl ErrorKind {
    /// Whether failures of this kind are retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::TransientExternalError | ErrorKind::StorageError
        )
    }
}

/// Structured error descriptor stored in `last_error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub message: String,
    /// Phase the failure happened in. Stamped by the state machine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<TaskPhase>,
    pub at: DateTime<Utc>,
}

impl ErrorDescriptor {
    /// Create a descriptor timestamped now.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            phase: None,
            at: Utc::now(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientExternalError, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermanentExternalError, message)
    }
}

/// One entry in a task's append-only history log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    /// Absent for the creation entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_state: Option<String>,
    pub to_state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A single generation request tracked through its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    /// Unique identifier, `{task_type}:{unix_ts}-{random}`.
    pub task_id: String,

    /// Registered provider identifier.
    pub task_type: String,

    /// Current state.
    pub state: TaskState,

    /// Provider job identifier. Set once, never cleared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_job_id: Option<String>,

    /// Where the provider published the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_locator: Option<String>,

    /// Last status or progress text reported by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_hint: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Per-phase retry counter.
    #[serde(default)]
    pub attempt_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorDescriptor>,

    /// Original request parameters.
    pub payload: serde_json::Value,

    /// Object store key of the uploaded artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_ref: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_metadata: Option<ArtifactMetadata>,

    /// Ordered transition log. Never empty.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl TaskRecord {
    /// Build a freshly submitted record with its creation history entry.
    pub fn new(
        task_id: impl Into<String>,
        task_type: impl Into<String>,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            task_type: task_type.into(),
            state: TaskState::Submitted,
            external_job_id: None,
            result_locator: None,
            progress_hint: None,
            created_at: now,
            updated_at: now,
            attempt_count: 0,
            last_error: None,
            payload,
            artifact_ref: None,
            artifact_metadata: None,
            history: vec![HistoryEntry {
                at: now,
                from_state: None,
                to_state: TaskState::Submitted.state_type().to_string(),
                note: Some("created".to_string()),
            }],
        }
    }
}

/// Named queue index a task is listed in, derived from its state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueueIndex {
    Pending,
    Monitoring,
    Retry,
    Completed,
    Failed,
}

impl QueueIndex {
    /// All indices, in scan order.
    pub const ALL: [QueueIndex; 5] = [
        QueueIndex::Pending,
        QueueIndex::Monitoring,
        QueueIndex::Retry,
        QueueIndex::Completed,
        QueueIndex::Failed,
    ];

    /// Index matching the given state.
    pub fn for_state(state: &TaskState) -> Self {
        match state {
            TaskState::Submitted | TaskState::Pending => QueueIndex::Pending,
            TaskState::Generating
            | TaskState::ExternalCompleted
            | TaskState::Downloading
            | TaskState::Processing
            | TaskState::Uploading => QueueIndex::Monitoring,
            TaskState::RetryPending { .. } => QueueIndex::Retry,
            TaskState::Completed => QueueIndex::Completed,
            TaskState::Failed => QueueIndex::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueIndex::Pending => "pending",
            QueueIndex::Monitoring => "monitoring",
            QueueIndex::Retry => "retry",
            QueueIndex::Completed => "completed",
            QueueIndex::Failed => "failed",
        }
    }

    /// Whether the beat scans this index for work.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            QueueIndex::Pending | QueueIndex::Monitoring | QueueIndex::Retry
        )
    }
}

impl std::fmt::Display for QueueIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submitted_state_is_not_terminal() {
        let state = TaskState::Submitted;
        assert!(!state.is_terminal());
        assert_eq!(state.state_type(), "submitted");
        assert_eq!(state.phase(), Some(TaskPhase::Create));
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert_eq!(TaskState::Completed.phase(), None);
        assert_eq!(TaskState::Failed.phase(), None);
    }

    #[test]
    fn test_retry_pending_keeps_phase() {
        let state = TaskState::RetryPending {
            phase: TaskPhase::Upload,
            retry_after: Utc::now(),
        };
        assert!(state.is_retry_pending());
        assert_eq!(state.phase(), Some(TaskPhase::Upload));
        assert_eq!(state.state_type(), "retry_pending");
    }

    #[test]
    fn test_phase_entry_states() {
        assert_eq!(TaskPhase::Create.entry_state(), TaskState::Pending);
        assert_eq!(TaskPhase::Generation.entry_state(), TaskState::Generating);
        assert_eq!(TaskPhase::Download.entry_state(), TaskState::Downloading);
        assert_eq!(TaskPhase::Upload.entry_state(), TaskState::Uploading);
    }

    #[test]
    fn test_state_serialization() {
        let state = TaskState::ExternalCompleted;
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, r#"{"type":"external_completed"}"#);

        let deserialized: TaskState = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, state);
    }

    #[test]
    fn test_retry_pending_serialization() {
        let state = TaskState::RetryPending {
            phase: TaskPhase::Generation,
            retry_after: Utc::now(),
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains(r#""type":"retry_pending""#));
        assert!(json.contains(r#""phase":"generation""#));

        let deserialized: TaskState = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, state);
    }

    #[test]
    fn test_queue_index_mapping() {
        assert_eq!(QueueIndex::for_state(&TaskState::Submitted), QueueIndex::Pending);
        assert_eq!(QueueIndex::for_state(&TaskState::Pending), QueueIndex::Pending);
        assert_eq!(
            QueueIndex::for_state(&TaskState::Uploading),
            QueueIndex::Monitoring
        );
        assert_eq!(
            QueueIndex::for_state(&TaskState::RetryPending {
                phase: TaskPhase::Create,
                retry_after: Utc::now(),
            }),
            QueueIndex::Retry
        );
        assert_eq!(QueueIndex::for_state(&TaskState::Failed), QueueIndex::Failed);
        assert!(!QueueIndex::Completed.is_active());
    }

    #[test]
    fn test_new_record_has_creation_history() {
        let now = Utc::now();
        let record = TaskRecord::new("video_a:1-abc", "video_a", serde_json::json!({}), now);
        assert_eq!(record.history.len(), 1);
        assert_eq!(record.history[0].from_state, None);
        assert_eq!(record.history[0].to_state, "submitted");
        assert_eq!(record.attempt_count, 0);
    }

    #[test]
    fn test_error_kind_transience() {
        assert!(ErrorKind::TransientExternalError.is_transient());
        assert!(ErrorKind::StorageError.is_transient());
        assert!(!ErrorKind::PermanentExternalError.is_transient());
        assert!(!ErrorKind::ArtifactValidationError.is_transient());
    }
}
