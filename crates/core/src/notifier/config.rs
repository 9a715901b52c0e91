//! Configuration for notifications.

use serde::{Deserialize, Serialize};

/// Configuration for the `[notifier]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Post events to `url`. When disabled events are only logged.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Delivery attempts per event.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Pause between attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Events buffered between workers and the dispatcher.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_buffer_size() -> usize {
    256
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            timeout_secs: default_timeout_secs(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            buffer_size: default_buffer_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NotifierConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.retry_count, 3);
        assert_eq!(config.retry_delay_ms, 2000);
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_deserialize() {
        let config: NotifierConfig = toml::from_str(
            r#"
            enabled = true
            url = "http://registry.local/hooks/assets"
            retry_count = 5
            "#,
        )
        .unwrap();
        assert!(config.enabled);
        assert_eq!(config.retry_count, 5);
        assert_eq!(config.buffer_size, 256);
    }
}
