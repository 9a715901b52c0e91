//! Task records, their state machine and durable storage.

mod id;
mod machine;
mod sqlite_store;
mod store;
mod types;

pub use id::{generate_task_id, is_valid_task_type, parse_task_id, TaskId};
pub use machine::{TaskEvent, TransitionRejected};
pub use sqlite_store::SqliteTaskStore;
pub use store::{
    CreateTaskRequest, IndexEntry, IndexScan, Lease, ScanOptions, TaskError, TaskFilter,
    TaskStore,
};
pub use types::{
    ErrorDescriptor, ErrorKind, HistoryEntry, QueueIndex, TaskPhase, TaskRecord, TaskState,
};
