//! Task identifier generation and parsing.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex_lite::Regex;

static TASK_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-z][a-z0-9_]*):(\d+)-([A-Za-z0-9]+)$").unwrap());

static TASK_TYPE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").unwrap());

/// Components of a task identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskId<'a> {
    pub task_type: &'a str,
    pub unix_ts: i64,
    pub random: &'a str,
}

/// Generate a new identifier `{task_type}:{unix_ts}-{random}`.
pub fn generate_task_id(task_type: &str, now: DateTime<Utc>) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{}:{}-{}", task_type, now.timestamp(), &random[..8])
}

/// Parse an identifier into its components.
pub fn parse_task_id(id: &str) -> Option<TaskId<'_>> {
    let caps = TASK_ID_RE.captures(id)?;
    Some(TaskId {
        task_type: caps.get(1)?.as_str(),
        unix_ts: caps.get(2)?.as_str().parse().ok()?,
        random: caps.get(3)?.as_str(),
    })
}

/// Whether the string is usable as a task type.
pub fn is_valid_task_type(task_type: &str) -> bool {
    TASK_TYPE_RE.is_match(task_type)
}
