//! SQLite-backed task store implementation.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::machine::TaskEvent;
use super::store::{
    CreateTaskRequest, IndexEntry, Lease, ScanOptions, TaskError, TaskFilter, TaskStore,
};
use super::types::{HistoryEntry, QueueIndex, TaskRecord, TaskState};

const TASK_COLUMNS: &str = "task_id, task_type, state, external_job_id, result_locator, \
     progress_hint, created_at, updated_at, attempt_count, last_error, payload, artifact_ref, \
     artifact_metadata";

/// SQLite-backed task store.
///
/// A single connection behind a mutex; every operation that reads and then
/// writes runs inside one transaction while the lock is held.
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
}

/// Raw column values of a `tasks` row.
struct TaskRow {
    task_id: String,
    task_type: String,
    state: String,
    external_job_id: Option<String>,
    result_locator: Option<String>,
    progress_hint: Option<String>,
    created_at: String,
    updated_at: String,
    attempt_count: u32,
    last_error: Option<String>,
    payload: String,
    artifact_ref: Option<String>,
    artifact_metadata: Option<String>,
}

fn db_err(e: rusqlite::Error) -> TaskError {
    TaskError::Database(e.to_string())
}

fn json_err(e: serde_json::Error) -> TaskError {
    TaskError::Database(e.to_string())
}

fn parse_timestamp(task_id: &str, value: &str) -> Result<DateTime<Utc>, TaskError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TaskError::Corrupt {
            task_id: task_id.to_string(),
            reason: format!("bad timestamp {:?}: {}", value, e),
        })
}

fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

impl TaskRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            task_id: row.get(0)?,
            task_type: row.get(1)?,
            state: row.get(2)?,
            external_job_id: row.get(3)?,
            result_locator: row.get(4)?,
            progress_hint: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
            attempt_count: row.get(8)?,
            last_error: row.get(9)?,
            payload: row.get(10)?,
            artifact_ref: row.get(11)?,
            artifact_metadata: row.get(12)?,
        })
    }

    fn into_record(self, history: Vec<HistoryEntry>) -> Result<TaskRecord, TaskError> {
        let corrupt = |field: &str, e: serde_json::Error| TaskError::Corrupt {
            task_id: self.task_id.clone(),
            reason: format!("{}: {}", field, e),
        };

        let state: TaskState =
            serde_json::from_str(&self.state).map_err(|e| corrupt("state", e))?;
        let payload = serde_json::from_str(&self.payload).map_err(|e| corrupt("payload", e))?;
        let last_error = self
            .last_error
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| corrupt("last_error", e))?;
        let artifact_metadata = self
            .artifact_metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| corrupt("artifact_metadata", e))?;
        let created_at = parse_timestamp(&self.task_id, &self.created_at)?;
        let updated_at = parse_timestamp(&self.task_id, &self.updated_at)?;

        Ok(TaskRecord {
            task_id: self.task_id,
            task_type: self.task_type,
            state,
            external_job_id: self.external_job_id,
            result_locator: self.result_locator,
            progress_hint: self.progress_hint,
            created_at,
            updated_at,
            attempt_count: self.attempt_count,
            last_error,
            payload,
            artifact_ref: self.artifact_ref,
            artifact_metadata,
            history,
        })
    }
}

impl SqliteTaskStore {
    /// Create a new SQLite task store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, TaskError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite task store (useful for testing).
    pub fn in_memory() -> Result<Self, TaskError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), TaskError> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS tasks (
                task_id TEXT PRIMARY KEY,
                task_type TEXT NOT NULL,
                state TEXT NOT NULL,
                external_job_id TEXT,
                result_locator TEXT,
                progress_hint TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                attempt_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                payload TEXT NOT NULL,
                artifact_ref TEXT,
                artifact_metadata TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_task_type ON tasks(task_type);
            CREATE INDEX IF NOT EXISTS idx_tasks_external_job_id ON tasks(external_job_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_created_at ON tasks(created_at);

            CREATE TABLE IF NOT EXISTS task_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL,
                at TEXT NOT NULL,
                from_state TEXT,
                to_state TEXT NOT NULL,
                note TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_task_history_task_id ON task_history(task_id, id);

            CREATE TABLE IF NOT EXISTS task_index (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                index_name TEXT NOT NULL,
                task_id TEXT NOT NULL UNIQUE,
                ready_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_task_index_name_seq ON task_index(index_name, seq);

            CREATE TABLE IF NOT EXISTS task_leases (
                task_id TEXT PRIMARY KEY,
                holder TEXT NOT NULL,
                token TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );
            "#,
        )
        .map_err(db_err)?;

        Ok(())
    }

    fn build_where_clause(filter: &TaskFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref state) = filter.state {
            conditions.push("json_extract(state, '$.type') = ?");
            params.push(Box::new(state.clone()));
        }

        if let Some(ref task_type) = filter.task_type {
            conditions.push("task_type = ?");
            params.push(Box::new(task_type.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn load_history(conn: &Connection, task_id: &str) -> Result<Vec<HistoryEntry>, TaskError> {
        let mut stmt = conn
            .prepare(
                "SELECT at, from_state, to_state, note FROM task_history WHERE task_id = ? ORDER BY id ASC",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![task_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .map_err(db_err)?;

        let mut history = Vec::new();
        for row in rows {
            let (at, from_state, to_state, note) = row.map_err(db_err)?;
            history.push(HistoryEntry {
                at: parse_timestamp(task_id, &at)?,
                from_state,
                to_state,
                note,
            });
        }
        Ok(history)
    }

    fn load_task(conn: &Connection, task_id: &str) -> Result<Option<TaskRecord>, TaskError> {
        let row = conn
            .query_row(
                &format!("SELECT {} FROM tasks WHERE task_id = ?", TASK_COLUMNS),
                params![task_id],
                TaskRow::from_row,
            )
            .optional()
            .map_err(db_err)?;

        match row {
            Some(row) => {
                let history = Self::load_history(conn, task_id)?;
                row.into_record(history).map(Some)
            }
            None => Ok(None),
        }
    }

    fn query_tasks(
        conn: &Connection,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<TaskRecord>, TaskError> {
        let mut stmt = conn.prepare(sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params, TaskRow::from_row)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            let history = Self::load_history(conn, &row.task_id)?;
            tasks.push(row.into_record(history)?);
        }
        Ok(tasks)
    }

    fn insert_history(
        conn: &Connection,
        task_id: &str,
        entries: &[HistoryEntry],
    ) -> Result<(), TaskError> {
        for entry in entries {
            conn.execute(
                "INSERT INTO task_history (task_id, at, from_state, to_state, note) VALUES (?, ?, ?, ?, ?)",
                params![
                    task_id,
                    entry.at.to_rfc3339(),
                    entry.from_state,
                    entry.to_state,
                    entry.note,
                ],
            )
            .map_err(db_err)?;
        }
        Ok(())
    }

    fn set_index(
        conn: &Connection,
        index: QueueIndex,
        task_id: &str,
        ready_at: Option<DateTime<Utc>>,
    ) -> Result<(), TaskError> {
        conn.execute("DELETE FROM task_index WHERE task_id = ?", params![task_id])
            .map_err(db_err)?;
        conn.execute(
            "INSERT INTO task_index (index_name, task_id, ready_at) VALUES (?, ?, ?)",
            params![
                index.as_str(),
                task_id,
                ready_at.map(|t| t.timestamp_millis())
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn check_lease(conn: &Connection, lease: &Lease) -> Result<(), TaskError> {
        let current: Option<(String, i64)> = conn
            .query_row(
                "SELECT token, expires_at FROM task_leases WHERE task_id = ?",
                params![lease.task_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err)?;

        match current {
            Some((token, expires_at))
                if token == lease.token && expires_at > Utc::now().timestamp_millis() =>
            {
                Ok(())
            }
            _ => Err(TaskError::LeaseLost {
                task_id: lease.task_id.clone(),
            }),
        }
    }

    fn apply_event(
        &self,
        task_id: &str,
        event: &TaskEvent,
        lease: Option<&Lease>,
    ) -> Result<TaskRecord, TaskError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;

        if let Some(lease) = lease {
            Self::check_lease(&tx, lease)?;
        }

        let current = Self::load_task(&tx, task_id)?
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;

        let next = current.apply(event, Utc::now())?;

        let last_error = next
            .last_error
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(json_err)?;
        let artifact_metadata = next
            .artifact_metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(json_err)?;
        let state_json = serde_json::to_string(&next.state).map_err(json_err)?;

        tx.execute(
            "UPDATE tasks SET state = ?, external_job_id = ?, result_locator = ?, progress_hint = ?, \
             updated_at = ?, attempt_count = ?, last_error = ?, artifact_ref = ?, artifact_metadata = ? \
             WHERE task_id = ?",
            params![
                state_json,
                next.external_job_id,
                next.result_locator,
                next.progress_hint,
                next.updated_at.to_rfc3339(),
                next.attempt_count,
                last_error,
                next.artifact_ref,
                artifact_metadata,
                task_id,
            ],
        )
        .map_err(db_err)?;

        Self::insert_history(&tx, task_id, &next.history[current.history.len()..])?;

        let from_index = QueueIndex::for_state(&current.state);
        let to_index = QueueIndex::for_state(&next.state);
        if from_index != to_index {
            let ready_at = match next.state {
                TaskState::RetryPending { retry_after, .. } => Some(retry_after),
                _ => None,
            };
            Self::set_index(&tx, to_index, task_id, ready_at)?;
        }

        tx.commit().map_err(db_err)?;
        Ok(next)
    }
}

impl TaskStore for SqliteTaskStore {
    fn create(&self, request: CreateTaskRequest) -> Result<TaskRecord, TaskError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;

        let exists: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM tasks WHERE task_id = ?)",
                params![request.task_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        if exists {
            return Err(TaskError::DuplicateTask(request.task_id));
        }

        let record = TaskRecord::new(
            request.task_id,
            request.task_type,
            request.payload,
            Utc::now(),
        );

        let state_json = serde_json::to_string(&record.state).map_err(json_err)?;
        let payload_json = serde_json::to_string(&record.payload).map_err(json_err)?;

        tx.execute(
            &format!(
                "INSERT INTO tasks ({}) VALUES (?, ?, ?, NULL, NULL, NULL, ?, ?, 0, NULL, ?, NULL, NULL)",
                TASK_COLUMNS
            ),
            params![
                record.task_id,
                record.task_type,
                state_json,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
                payload_json,
            ],
        )
        .map_err(db_err)?;

        Self::insert_history(&tx, &record.task_id, &record.history)?;
        Self::set_index(
            &tx,
            QueueIndex::for_state(&record.state),
            &record.task_id,
            None,
        )?;

        tx.commit().map_err(db_err)?;
        Ok(record)
    }

    fn get(&self, task_id: &str) -> Result<Option<TaskRecord>, TaskError> {
        let conn = self.conn.lock().unwrap();
        Self::load_task(&conn, task_id)
    }

    fn list(&self, filter: &TaskFilter) -> Result<Vec<TaskRecord>, TaskError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT {} FROM tasks {} ORDER BY created_at ASC, task_id ASC LIMIT ? OFFSET ?",
            TASK_COLUMNS, where_clause
        );

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        Self::query_tasks(&conn, &sql, &param_refs)
    }

    fn count(&self, filter: &TaskFilter) -> Result<i64, TaskError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!("SELECT COUNT(*) FROM tasks {}", where_clause);

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(db_err)
    }

    fn transition(&self, task_id: &str, event: &TaskEvent) -> Result<TaskRecord, TaskError> {
        self.apply_event(task_id, event, None)
    }

    fn transition_leased(
        &self,
        lease: &Lease,
        event: &TaskEvent,
    ) -> Result<TaskRecord, TaskError> {
        self.apply_event(&lease.task_id, event, Some(lease))
    }

    fn index_add(
        &self,
        index: QueueIndex,
        task_id: &str,
        ready_at: Option<DateTime<Utc>>,
    ) -> Result<(), TaskError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;
        Self::set_index(&tx, index, task_id, ready_at)?;
        tx.commit().map_err(db_err)
    }

    fn index_remove(&self, index: QueueIndex, task_id: &str) -> Result<bool, TaskError> {
        let conn = self.conn.lock().unwrap();
        let removed = conn
            .execute(
                "DELETE FROM task_index WHERE index_name = ? AND task_id = ?",
                params![index.as_str(), task_id],
            )
            .map_err(db_err)?;
        Ok(removed > 0)
    }

    fn index_page(
        &self,
        index: QueueIndex,
        after: i64,
        upto: i64,
        options: &ScanOptions,
    ) -> Result<Vec<IndexEntry>, TaskError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT seq, task_id, ready_at FROM task_index \
                 WHERE index_name = ? AND seq > ? AND seq <= ? ORDER BY seq ASC LIMIT ?",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(
                params![index.as_str(), after, upto, options.batch_size.max(1) as i64],
                |row| {
                    let ready_at: Option<i64> = row.get(2)?;
                    Ok(IndexEntry {
                        seq: row.get(0)?,
                        task_id: row.get(1)?,
                        ready_at: ready_at.and_then(millis_to_datetime),
                    })
                },
            )
            .map_err(db_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    fn index_high_water(&self, index: QueueIndex) -> Result<i64, TaskError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COALESCE(MAX(seq), 0) FROM task_index WHERE index_name = ?",
            params![index.as_str()],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    fn index_len(&self, index: QueueIndex) -> Result<i64, TaskError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM task_index WHERE index_name = ?",
            params![index.as_str()],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    fn acquire_lease(
        &self,
        task_id: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<Option<Lease>, TaskError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;

        let exists: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM tasks WHERE task_id = ?)",
                params![task_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        if !exists {
            return Err(TaskError::NotFound(task_id.to_string()));
        }

        let now = Utc::now();
        let live: Option<i64> = tx
            .query_row(
                "SELECT expires_at FROM task_leases WHERE task_id = ? AND expires_at > ?",
                params![task_id, now.timestamp_millis()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        if live.is_some() {
            return Ok(None);
        }

        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| TaskError::Database(format!("invalid lease ttl: {}", e)))?;
        let lease = Lease {
            task_id: task_id.to_string(),
            holder: holder.to_string(),
            token: uuid::Uuid::new_v4().to_string(),
            expires_at: now + ttl,
        };

        tx.execute(
            "INSERT OR REPLACE INTO task_leases (task_id, holder, token, expires_at) VALUES (?, ?, ?, ?)",
            params![
                lease.task_id,
                lease.holder,
                lease.token,
                lease.expires_at.timestamp_millis()
            ],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;
        Ok(Some(lease))
    }

    fn release_lease(&self, lease: &Lease) -> Result<(), TaskError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM task_leases WHERE task_id = ? AND token = ?",
            params![lease.task_id, lease.token],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn find_by_external_job(
        &self,
        external_job_id: &str,
        task_type: Option<&str>,
    ) -> Result<Vec<TaskRecord>, TaskError> {
        let conn = self.conn.lock().unwrap();
        match task_type {
            Some(task_type) => Self::query_tasks(
                &conn,
                &format!(
                    "SELECT {} FROM tasks WHERE external_job_id = ? AND task_type = ? ORDER BY created_at ASC",
                    TASK_COLUMNS
                ),
                &[&external_job_id, &task_type],
            ),
            None => Self::query_tasks(
                &conn,
                &format!(
                    "SELECT {} FROM tasks WHERE external_job_id = ? ORDER BY created_at ASC",
                    TASK_COLUMNS
                ),
                &[&external_job_id],
            ),
        }
    }

    fn delete(&self, task_id: &str) -> Result<TaskRecord, TaskError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;

        let record = Self::load_task(&tx, task_id)?
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;

        for table in ["tasks", "task_history", "task_index", "task_leases"] {
            tx.execute(
                &format!("DELETE FROM {} WHERE task_id = ?", table),
                params![task_id],
            )
            .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)?;
        Ok(record)
    }
}
