use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactMetadata;
use crate::task::{ErrorDescriptor, TaskRecord, TaskState};

/// Body posted to the notification target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    TaskCompleted {
        task_id: String,
        task_type: String,
        artifact_ref: String,
        metadata: ArtifactMetadata,
    },
    TaskFailed {
        task_id: String,
        task_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_error: Option<ErrorDescriptor>,
    },
}

impl NotificationEvent {
    /// Event for a task that just reached a terminal state. `None` otherwise.
    pub fn for_terminal(task: &TaskRecord) -> Option<Self> {
        match task.state {
            TaskState::Completed => Some(NotificationEvent::TaskCompleted {
                task_id: task.task_id.clone(),
                task_type: task.task_type.clone(),
                artifact_ref: task.artifact_ref.clone()?,
                metadata: task.artifact_metadata.clone()?,
            }),
            TaskState::Failed => Some(NotificationEvent::TaskFailed {
                task_id: task.task_id.clone(),
                task_type: task.task_type.clone(),
                last_error: task.last_error.clone(),
            }),
            _ => None,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            NotificationEvent::TaskCompleted { .. } => "task_completed",
            NotificationEvent::TaskFailed { .. } => "task_failed",
        }
    }

    pub fn task_id(&self) -> &str {
        match self {
            NotificationEvent::TaskCompleted { task_id, .. }
            | NotificationEvent::TaskFailed { task_id, .. } => task_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_failed_event_serialization() {
        let mut task = TaskRecord::new("video_a:1-abc", "video_a", serde_json::json!({}), Utc::now());
        task.state = TaskState::Failed;
        task.last_error = Some(ErrorDescriptor::permanent("HTTP 400"));

        let event = NotificationEvent::for_terminal(&task).unwrap();
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event"], "task_failed");
        assert_eq!(json["task_id"], "video_a:1-abc");
        assert_eq!(json["last_error"]["kind"], "PermanentExternalError");
    }

    #[test]
    fn test_non_terminal_has_no_event() {
        let task = TaskRecord::new("video_a:1-abc", "video_a", serde_json::json!({}), Utc::now());
        assert!(NotificationEvent::for_terminal(&task).is_none());
    }

    #[test]
    fn test_completed_requires_artifact() {
        let mut task = TaskRecord::new("video_a:1-abc", "video_a", serde_json::json!({}), Utc::now());
        task.state = TaskState::Completed;
        assert!(NotificationEvent::for_terminal(&task).is_none());
    }
}
