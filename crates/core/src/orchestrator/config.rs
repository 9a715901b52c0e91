//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::capped_exponential;
use crate::provider::PollerConfig;

/// Configuration for the task orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Enable/disable the background beat and workers.
    /// When disabled, tasks are only advanced by explicit beats.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between scheduler beats.
    #[serde(default = "default_beat_interval")]
    pub beat_interval_secs: u64,

    /// Number of concurrent workers.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Capacity of the work queue between the beat and the workers.
    /// Items that do not fit are left for the next beat.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Lifetime of a task lease. Must exceed the work item timeout.
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl_secs: u64,

    /// Wall-clock budget for one work item.
    #[serde(default = "default_work_item_timeout")]
    pub work_item_timeout_secs: u64,

    /// Index entries read per page while scanning.
    #[serde(default = "default_scan_batch_size")]
    pub scan_batch_size: usize,

    /// Run a beat immediately after each submission.
    #[serde(default)]
    pub kick_on_submit: bool,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub poller: PollerConfig,
}

/// Per-phase retry policy for transient failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Transient failures allowed in one phase before the task fails.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_true() -> bool {
    true
}

fn default_beat_interval() -> u64 {
    60
}

fn default_worker_pool_size() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    256
}

fn default_lease_ttl() -> u64 {
    600 // 10 minutes
}

fn default_work_item_timeout() -> u64 {
    300 // 5 minutes
}

fn default_scan_batch_size() -> usize {
    100
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> u64 {
    60
}

fn default_max_delay() -> u64 {
    3600
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            beat_interval_secs: default_beat_interval(),
            worker_pool_size: default_worker_pool_size(),
            queue_capacity: default_queue_capacity(),
            lease_ttl_secs: default_lease_ttl(),
            work_item_timeout_secs: default_work_item_timeout(),
            scan_batch_size: default_scan_batch_size(),
            kick_on_submit: false,
            retry: RetryConfig::default(),
            poller: PollerConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_secs: default_initial_delay(),
            max_delay_secs: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        capped_exponential(
            Duration::from_secs(self.initial_delay_secs),
            self.backoff_multiplier,
            Duration::from_secs(self.max_delay_secs),
            attempt,
        )
    }
}
