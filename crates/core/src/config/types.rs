use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::artifact::ArtifactConfig;
use crate::notifier::NotifierConfig;
use crate::orchestrator::OrchestratorConfig;
use crate::provider::ProviderConfig;
use crate::storage::StorageConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub artifact: ArtifactConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    /// One entry per task type.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("genbroker.db")
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub orchestrator: OrchestratorConfig,
    pub artifact: ArtifactConfig,
    pub storage: StorageConfig,
    pub notifier: SanitizedNotifierConfig,
    pub providers: Vec<SanitizedProviderConfig>,
}

/// Sanitized notifier config (target URL hidden; it may embed a token)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedNotifierConfig {
    pub enabled: bool,
    pub url_configured: bool,
    pub timeout_secs: u64,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
}

/// Sanitized provider config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedProviderConfig {
    pub task_type: String,
    pub media_class: String,
    pub base_url: String,
    pub api_key_configured: bool,
    pub timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            orchestrator: config.orchestrator.clone(),
            artifact: config.artifact.clone(),
            storage: config.storage.clone(),
            notifier: SanitizedNotifierConfig {
                enabled: config.notifier.enabled,
                url_configured: config.notifier.url.is_some(),
                timeout_secs: config.notifier.timeout_secs,
                retry_count: config.notifier.retry_count,
                retry_delay_ms: config.notifier.retry_delay_ms,
            },
            providers: config
                .providers
                .iter()
                .map(|p| SanitizedProviderConfig {
                    task_type: p.task_type.clone(),
                    media_class: p.media_class.to_string(),
                    base_url: p.base_url.clone(),
                    api_key_configured: p.api_key.as_deref().is_some_and(|k| !k.is_empty()),
                    timeout_secs: p.timeout_secs,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.path, PathBuf::from("genbroker.db"));
        assert!(config.orchestrator.enabled);
        assert!(!config.notifier.enabled);
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_sanitized_config_hides_secrets() {
        let toml = r#"
[notifier]
enabled = true
url = "https://hooks.example.com/T0KEN"

[[providers]]
task_type = "video_a"
media_class = "video"
base_url = "https://api.example.com"
api_key = "sk-secret"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let sanitized = SanitizedConfig::from(&config);
        let json = serde_json::to_string(&sanitized).unwrap();

        assert!(!json.contains("sk-secret"));
        assert!(!json.contains("T0KEN"));
        assert!(sanitized.providers[0].api_key_configured);
        assert!(sanitized.notifier.url_configured);
    }
}
