use std::collections::HashSet;

use crate::task::is_valid_task_type;

use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Orchestrator pool size, beat interval and retry budget are at least 1
/// - Lease TTL exceeds the work item timeout
/// - Provider task types are well-formed and unique, with a base URL
/// - An enabled notifier has a URL
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

    // Server validation
    if config.server.port == 0 {
        return invalid("server.port cannot be 0".to_string());
    }

    // Orchestrator validation
    let orch = &config.orchestrator;
    if orch.worker_pool_size == 0 {
        return invalid("orchestrator.worker_pool_size must be at least 1".to_string());
    }
    if orch.beat_interval_secs == 0 {
        return invalid("orchestrator.beat_interval_secs must be at least 1".to_string());
    }
    if orch.retry.max_attempts == 0 {
        return invalid("orchestrator.retry.max_attempts must be at least 1".to_string());
    }
    if orch.lease_ttl_secs <= orch.work_item_timeout_secs {
        return invalid(format!(
            "orchestrator.lease_ttl_secs ({}) must exceed work_item_timeout_secs ({})",
            orch.lease_ttl_secs, orch.work_item_timeout_secs
        ));
    }

    // Provider validation
    let mut seen = HashSet::new();
    for provider in &config.providers {
        if !is_valid_task_type(&provider.task_type) {
            return invalid(format!(
                "providers.task_type {:?} must be lowercase letters, digits and underscores",
                provider.task_type
            ));
        }
        if !seen.insert(provider.task_type.as_str()) {
            return invalid(format!(
                "providers.task_type {} is configured twice",
                provider.task_type
            ));
        }
        if provider.base_url.is_empty() {
            return invalid(format!(
                "providers.base_url is empty for {}",
                provider.task_type
            ));
        }
    }

    // Notifier validation
    if config.notifier.enabled && config.notifier.url.as_deref().unwrap_or("").is_empty() {
        return invalid("notifier.url is required when notifier.enabled = true".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::MediaClass;
    use crate::provider::ProviderConfig;

    fn valid() -> Config {
        let mut config = Config::default();
        config.providers.push(ProviderConfig::new(
            "video_a",
            MediaClass::Video,
            "https://api.example.com",
        ));
        config
    }

    fn assert_invalid(config: &Config, needle: &str) {
        match validate_config(config) {
            Err(ConfigError::ValidationError(msg)) => {
                assert!(msg.contains(needle), "unexpected message: {}", msg)
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid()).is_ok());
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = valid();
        config.server.port = 0;
        assert_invalid(&config, "server.port");
    }

    #[test]
    fn test_validate_orchestrator_bounds() {
        let mut config = valid();
        config.orchestrator.worker_pool_size = 0;
        assert_invalid(&config, "worker_pool_size");

        let mut config = valid();
        config.orchestrator.retry.max_attempts = 0;
        assert_invalid(&config, "max_attempts");

        let mut config = valid();
        config.orchestrator.lease_ttl_secs = 300;
        config.orchestrator.work_item_timeout_secs = 300;
        assert_invalid(&config, "lease_ttl_secs");
    }

    #[test]
    fn test_validate_provider_task_types() {
        let mut config = valid();
        config.providers.push(ProviderConfig::new(
            "video_a",
            MediaClass::Video,
            "https://other.example.com",
        ));
        assert_invalid(&config, "configured twice");

        let mut config = valid();
        config.providers[0].task_type = "Video-A".to_string();
        assert_invalid(&config, "lowercase");
    }

    #[test]
    fn test_validate_enabled_notifier_needs_url() {
        let mut config = valid();
        config.notifier.enabled = true;
        assert_invalid(&config, "notifier.url");

        config.notifier.url = Some("https://hooks.example.com/genbroker".to_string());
        assert!(validate_config(&config).is_ok());
    }
}
