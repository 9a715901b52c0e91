//! Task storage trait and types.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::machine::{TaskEvent, TransitionRejected};
use super::types::{QueueIndex, TaskRecord};

/// Error type for task store operations.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Task not found.
    #[error("task not found: {0}")]
    NotFound(String),

    /// A task with this id already exists.
    #[error("duplicate task: {0}")]
    DuplicateTask(String),

    /// The event does not apply to the stored state.
    #[error(transparent)]
    Rejected(#[from] TransitionRejected),

    /// The caller's lease expired or was taken over.
    #[error("lease lost for task {task_id}")]
    LeaseLost { task_id: String },

    /// Stored data could not be decoded.
    #[error("corrupt record {task_id}: {reason}")]
    Corrupt { task_id: String, reason: String },

    /// Database error.
    #[error("database error: {0}")]
    Database(String),
}

/// Request to create a new task.
#[derive(Debug, Clone)]
pub struct CreateTaskRequest {
    pub task_id: String,
    pub task_type: String,
    pub payload: serde_json::Value,
}

/// Filter for querying tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Filter by state type.
    pub state: Option<String>,
    /// Filter by task type.
    pub task_type: Option<String>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl TaskFilter {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self {
            state: None,
            task_type: None,
            limit: 100,
            offset: 0,
        }
    }

    /// Filter by state type.
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Filter by task type.
    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    /// Set limit.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Set offset.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Exclusive, time-bounded claim on a task.
#[derive(Debug, Clone, PartialEq)]
pub struct Lease {
    pub task_id: String,
    pub holder: String,
    /// Unique per acquisition so a re-acquired lease invalidates older copies.
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// A task id listed in a queue index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Insertion sequence; defines scan order.
    pub seq: i64,
    pub task_id: String,
    /// For the retry index: when the entry becomes due.
    pub ready_at: Option<DateTime<Utc>>,
}

/// Options for scanning a queue index.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Entries fetched per page.
    pub batch_size: usize,
    /// Only yield entries whose `ready_at` is absent or not after this instant.
    pub due_before: Option<DateTime<Utc>>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            due_before: None,
        }
    }
}

/// Trait for task storage backends.
///
/// Every mutating operation is atomic: a transition, its history entries and
/// the queue index move commit together or not at all.
pub trait TaskStore: Send + Sync {
    /// Create a new task in `submitted`, listed in the pending index.
    fn create(&self, request: CreateTaskRequest) -> Result<TaskRecord, TaskError>;

    /// Get a task by id.
    fn get(&self, task_id: &str) -> Result<Option<TaskRecord>, TaskError>;

    /// List tasks matching the filter.
    fn list(&self, filter: &TaskFilter) -> Result<Vec<TaskRecord>, TaskError>;

    /// Count tasks matching the filter.
    fn count(&self, filter: &TaskFilter) -> Result<i64, TaskError>;

    /// Apply an event to the stored record.
    fn transition(&self, task_id: &str, event: &TaskEvent) -> Result<TaskRecord, TaskError>;

    /// Apply an event, verifying in the same transaction that `lease` is
    /// still held.
    fn transition_leased(&self, lease: &Lease, event: &TaskEvent)
        -> Result<TaskRecord, TaskError>;

    /// List a task in an index, removing it from any other.
    fn index_add(
        &self,
        index: QueueIndex,
        task_id: &str,
        ready_at: Option<DateTime<Utc>>,
    ) -> Result<(), TaskError>;

    /// Remove a task from an index. Returns whether it was listed there.
    fn index_remove(&self, index: QueueIndex, task_id: &str) -> Result<bool, TaskError>;

    /// Fetch one page of an index: entries with `after < seq <= upto`, in
    /// sequence order.
    fn index_page(
        &self,
        index: QueueIndex,
        after: i64,
        upto: i64,
        options: &ScanOptions,
    ) -> Result<Vec<IndexEntry>, TaskError>;

    /// Highest sequence number currently in the index (0 when empty).
    fn index_high_water(&self, index: QueueIndex) -> Result<i64, TaskError>;

    /// Number of entries in an index.
    fn index_len(&self, index: QueueIndex) -> Result<i64, TaskError>;

    /// Try to claim a task. Returns `None` while another holder's lease is live.
    fn acquire_lease(
        &self,
        task_id: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<Option<Lease>, TaskError>;

    /// Release a lease. Releasing a lease that was taken over is a no-op.
    fn release_lease(&self, lease: &Lease) -> Result<(), TaskError>;

    /// Find tasks by provider job id, optionally restricted to one task type.
    fn find_by_external_job(
        &self,
        external_job_id: &str,
        task_type: Option<&str>,
    ) -> Result<Vec<TaskRecord>, TaskError>;

    /// Permanently delete a task, its history, index entry and lease.
    fn delete(&self, task_id: &str) -> Result<TaskRecord, TaskError>;
}

/// Lazy, paged iterator over a queue index.
///
/// The scan is bounded by the high-water mark taken when it starts, so entries
/// added while scanning are left for the next scan. It can be resumed from
/// [`IndexScan::cursor`].
pub struct IndexScan<'a> {
    store: &'a dyn TaskStore,
    index: QueueIndex,
    options: ScanOptions,
    /// Last sequence fetched from the store.
    fetched: i64,
    /// Last sequence handed out.
    cursor: i64,
    upto: Option<i64>,
    buffer: VecDeque<IndexEntry>,
    done: bool,
}

impl<'a> IndexScan<'a> {
    /// Start a scan from the beginning of the index.
    pub fn new(store: &'a dyn TaskStore, index: QueueIndex, options: ScanOptions) -> Self {
        Self::resume(store, index, options, 0)
    }

    /// Continue a scan after the given cursor.
    pub fn resume(
        store: &'a dyn TaskStore,
        index: QueueIndex,
        options: ScanOptions,
        cursor: i64,
    ) -> Self {
        Self {
            store,
            index,
            options,
            fetched: cursor,
            cursor,
            upto: None,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    /// Sequence number of the last entry yielded.
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    fn fill(&mut self) -> Result<(), TaskError> {
        let upto = match self.upto {
            Some(upto) => upto,
            None => {
                let upto = self.store.index_high_water(self.index)?;
                self.upto = Some(upto);
                upto
            }
        };
        let due_before = self.options.due_before;

        // A page can be entirely filtered out as not yet due, so keep paging
        // until something is found or the window is exhausted.
        while self.buffer.is_empty() && self.fetched < upto {
            let page = self
                .store
                .index_page(self.index, self.fetched, upto, &self.options)?;
            match page.last() {
                Some(last) => self.fetched = last.seq,
                None => break,
            }
            self.buffer
                .extend(page.into_iter().filter(|entry| match (due_before, entry.ready_at) {
                    (Some(due), Some(ready)) => ready <= due,
                    _ => true,
                }));
        }

        if self.buffer.is_empty() {
            self.done = true;
        }
        Ok(())
    }
}

impl Iterator for IndexScan<'_> {
    type Item = Result<IndexEntry, TaskError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            if let Err(e) = self.fill() {
                self.done = true;
                return Some(Err(e));
            }
        }
        let entry = self.buffer.pop_front()?;
        self.cursor = entry.seq;
        Some(Ok(entry))
    }
}
