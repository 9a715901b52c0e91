//! Task orchestrator.
//!
//! Drives generation tasks through the state machine:
//! - **Beat**: periodic scan of the pending, monitoring and due retry indexes
//! - **Workers**: a fixed pool, one leased work item at a time each
//! - **Lookups**: status by task id or by provider job id

mod config;
mod context;
mod runner;
mod types;
mod worker;

pub use config::{OrchestratorConfig, RetryConfig};
pub use context::OrchestratorContext;
pub use runner::TaskOrchestrator;
pub use types::{
    BeatReport, OrchestratorError, OrchestratorStatus, TaskStatusView, WorkItem, WorkOutcome,
};
