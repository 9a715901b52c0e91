//! Status polling and classification.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backoff::capped_exponential;
use crate::metrics;

use super::traits::GenerationProvider;
use super::types::{PollOutcome, ProviderJobStatus, StatusClass, StatusVocabulary};

/// In-call retry settings for status polls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Extra attempts after a transient network error.
    #[serde(default = "default_poll_retries")]
    pub poll_retries: u32,

    #[serde(default = "default_poll_backoff_initial_ms")]
    pub poll_backoff_initial_ms: u64,

    #[serde(default = "default_poll_backoff_max_ms")]
    pub poll_backoff_max_ms: u64,
}

fn default_poll_retries() -> u32 {
    2
}

fn default_poll_backoff_initial_ms() -> u64 {
    500
}

fn default_poll_backoff_max_ms() -> u64 {
    5000
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_retries: default_poll_retries(),
            poll_backoff_initial_ms: default_poll_backoff_initial_ms(),
            poll_backoff_max_ms: default_poll_backoff_max_ms(),
        }
    }
}

/// Polls a provider and classifies what it reports.
#[derive(Debug, Clone, Default)]
pub struct StatusPoller {
    config: PollerConfig,
}

impl StatusPoller {
    pub fn new(config: PollerConfig) -> Self {
        Self { config }
    }

    /// Classify a raw provider status.
    ///
    /// A completion flag takes precedence over the status word. Completion
    /// without a locator is unusable and therefore permanent. Status words
    /// the vocabulary does not list are treated as still running.
    pub fn classify(
        status: &ProviderJobStatus,
        vocabulary: &StatusVocabulary,
        external_job_id: &str,
    ) -> PollOutcome {
        if status.done == Some(true) {
            if let Some(error) = &status.error {
                return PollOutcome::PermanentError {
                    message: error.clone(),
                };
            }
            return match &status.locator {
                Some(locator) => PollOutcome::Done {
                    locator: locator.clone(),
                },
                None => PollOutcome::PermanentError {
                    message: "job completed without result locator".to_string(),
                },
            };
        }

        let class = status.status.as_deref().and_then(|s| vocabulary.classify(s));

        match class {
            Some(StatusClass::Failed) => PollOutcome::PermanentError {
                message: status.error.clone().unwrap_or_else(|| {
                    format!(
                        "provider reported status {}",
                        status.status.as_deref().unwrap_or_default()
                    )
                }),
            },
            Some(StatusClass::Done) => match &status.locator {
                Some(locator) => PollOutcome::Done {
                    locator: locator.clone(),
                },
                None => PollOutcome::PermanentError {
                    message: "job completed without result locator".to_string(),
                },
            },
            Some(StatusClass::Running) => PollOutcome::Running {
                progress_hint: status.progress.clone().or_else(|| status.status.clone()),
            },
            None => {
                warn!(
                    external_job_id = %external_job_id,
                    status = ?status.status,
                    "Unrecognised provider status, treating as running"
                );
                PollOutcome::Running {
                    progress_hint: status.progress.clone().or_else(|| status.status.clone()),
                }
            }
        }
    }

    /// Poll once, retrying transient network errors with capped backoff.
    pub async fn poll(
        &self,
        provider: &dyn GenerationProvider,
        external_job_id: &str,
    ) -> PollOutcome {
        let mut attempt = 0u32;
        let outcome = loop {
            match provider.poll(external_job_id).await {
                Ok(status) => {
                    break Self::classify(&status, provider.vocabulary(), external_job_id);
                }
                Err(e) if e.is_transient() && attempt < self.config.poll_retries => {
                    attempt += 1;
                    let delay = capped_exponential(
                        Duration::from_millis(self.config.poll_backoff_initial_ms),
                        2.0,
                        Duration::from_millis(self.config.poll_backoff_max_ms),
                        attempt,
                    );
                    debug!(
                        external_job_id = %external_job_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient poll error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_transient() => {
                    break PollOutcome::TransientError {
                        message: e.to_string(),
                    };
                }
                Err(e) => {
                    break PollOutcome::PermanentError {
                        message: e.to_string(),
                    };
                }
            }
        };

        metrics::POLL_OUTCOMES
            .with_label_values(&[provider.task_type(), outcome.label()])
            .inc();

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;
    use crate::testing::MockProvider;

    fn vocab() -> StatusVocabulary {
        StatusVocabulary::default()
    }

    #[test]
    fn test_classify_running_with_progress() {
        let status = ProviderJobStatus {
            status: Some("processing".to_string()),
            progress: Some("40%".to_string()),
            ..Default::default()
        };
        assert_eq!(
            StatusPoller::classify(&status, &vocab(), "j"),
            PollOutcome::Running {
                progress_hint: Some("40%".to_string())
            }
        );
    }

    #[test]
    fn test_classify_unknown_and_absent_status_as_running() {
        let unknown = ProviderJobStatus::running("warming_up");
        assert!(matches!(
            StatusPoller::classify(&unknown, &vocab(), "j"),
            PollOutcome::Running { .. }
        ));

        let absent = ProviderJobStatus::default();
        assert_eq!(
            StatusPoller::classify(&absent, &vocab(), "j"),
            PollOutcome::Running {
                progress_hint: None
            }
        );
    }

    #[test]
    fn test_classify_done() {
        let status = ProviderJobStatus::done("https://cdn/x.mp4");
        assert_eq!(
            StatusPoller::classify(&status, &vocab(), "j"),
            PollOutcome::Done {
                locator: "https://cdn/x.mp4".to_string()
            }
        );
    }

    #[test]
    fn test_classify_done_without_locator_is_permanent() {
        let status = ProviderJobStatus::running("succeeded");
        assert!(matches!(
            StatusPoller::classify(&status, &vocab(), "j"),
            PollOutcome::PermanentError { .. }
        ));
    }

    #[test]
    fn test_classify_failed() {
        let status = ProviderJobStatus::failed("content policy");
        assert_eq!(
            StatusPoller::classify(&status, &vocab(), "j"),
            PollOutcome::PermanentError {
                message: "content policy".to_string()
            }
        );
    }

    #[test]
    fn test_done_flag_overrides_status_word() {
        let status = ProviderJobStatus {
            status: Some("running".to_string()),
            done: Some(true),
            locator: Some("gs://bucket/v.mp4".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            StatusPoller::classify(&status, &vocab(), "j"),
            PollOutcome::Done { .. }
        ));

        let errored = ProviderJobStatus {
            done: Some(true),
            error: Some("quota".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            StatusPoller::classify(&errored, &vocab(), "j"),
            PollOutcome::PermanentError { .. }
        ));
    }

    fn fast_poller(retries: u32) -> StatusPoller {
        StatusPoller::new(PollerConfig {
            poll_retries: retries,
            poll_backoff_initial_ms: 1,
            poll_backoff_max_ms: 2,
        })
    }

    #[tokio::test]
    async fn test_poll_retries_transient_errors_in_call() {
        let provider = MockProvider::video("video_a");
        provider.push_poll(Err(ProviderError::Timeout("slow".to_string())));
        provider.push_poll(Err(ProviderError::Connection("reset".to_string())));
        provider.push_poll(Ok(ProviderJobStatus::done("file:///x.mp4")));

        let outcome = fast_poller(2).poll(&provider, "job-1").await;
        assert!(matches!(outcome, PollOutcome::Done { .. }));
        assert_eq!(provider.poll_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_poll_gives_up_after_retries() {
        let provider = MockProvider::video("video_a");
        for _ in 0..3 {
            provider.push_poll(Err(ProviderError::Http {
                status: 503,
                body: "busy".to_string(),
            }));
        }

        let outcome = fast_poller(1).poll(&provider, "job-1").await;
        assert!(matches!(outcome, PollOutcome::TransientError { .. }));
        assert_eq!(provider.poll_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_poll_permanent_error_not_retried() {
        let provider = MockProvider::video("video_a");
        provider.push_poll(Err(ProviderError::Http {
            status: 404,
            body: "no such job".to_string(),
        }));

        let outcome = fast_poller(3).poll(&provider, "job-1").await;
        assert!(matches!(outcome, PollOutcome::PermanentError { .. }));
        assert_eq!(provider.poll_calls().len(), 1);
    }
}
