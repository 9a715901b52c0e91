//! JSON-over-HTTP provider driven by configuration.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::artifact::MediaClass;

use super::config::ProviderConfig;
use super::traits::GenerationProvider;
use super::types::{ProviderError, ProviderJobStatus, StatusVocabulary};

/// Provider client for APIs that accept a JSON create request and expose a
/// JSON status endpoint.
pub struct HttpProvider {
    client: Client,
    config: ProviderConfig,
}

impl HttpProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        if config.base_url.is_empty() {
            return Err(ProviderError::NotConfigured(format!(
                "provider {} has no base_url",
                config.task_type
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn status_url(&self, external_job_id: &str) -> String {
        let path = self
            .config
            .status_path
            .replace("{job_id}", &urlencoding::encode(external_job_id));
        self.url(&path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) if !key.is_empty() => request.header(
                self.config.auth_header.as_str(),
                format!("{}{}", self.config.auth_prefix, key),
            ),
            _ => request,
        }
    }

    async fn send_json(&self, request: reqwest::RequestBuilder) -> Result<Value, ProviderError> {
        let response = self.authorize(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("response is not JSON: {}", e)))
    }

    /// Extract the job id from a create response.
    pub fn parse_create_response(&self, body: &Value) -> Result<String, ProviderError> {
        text_at(body, &self.config.response.job_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                ProviderError::UnconfirmedCreate(format!(
                    "no job id at {} in create response",
                    self.config.response.job_id
                ))
            })
    }

    /// Extract status fields from a status response.
    pub fn parse_status_response(&self, body: &Value) -> ProviderJobStatus {
        let mapping = &self.config.response;
        let at = |pointer: &Option<String>| pointer.as_deref().and_then(|p| text_at(body, p));

        ProviderJobStatus {
            status: at(&mapping.status),
            done: mapping
                .done
                .as_deref()
                .and_then(|p| body.pointer(p))
                .and_then(Value::as_bool),
            locator: text_at(body, &mapping.locator).filter(|l| !l.is_empty()),
            error: at(&mapping.error),
            progress: at(&mapping.progress),
        }
    }
}

/// Read a pointer as text. Numbers are formatted; objects and arrays are
/// serialized; null and missing values are `None`.
fn text_at(body: &Value, pointer: &str) -> Option<String> {
    match body.pointer(pointer)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl GenerationProvider for HttpProvider {
    fn task_type(&self) -> &str {
        &self.config.task_type
    }

    fn media_class(&self) -> MediaClass {
        self.config.media_class
    }

    fn vocabulary(&self) -> &StatusVocabulary {
        &self.config.vocabulary
    }

    async fn create(&self, payload: &Value) -> Result<String, ProviderError> {
        let url = self.url(&self.config.create_path);
        debug!(task_type = %self.config.task_type, url = %url, "Creating provider job");

        // The request went through, so an unreadable answer must not be retried.
        let body = self
            .send_json(self.client.post(&url).json(payload))
            .await
            .map_err(|e| match e {
                ProviderError::InvalidResponse(msg) => ProviderError::UnconfirmedCreate(msg),
                other => other,
            })?;
        self.parse_create_response(&body)
    }

    async fn poll(&self, external_job_id: &str) -> Result<ProviderJobStatus, ProviderError> {
        let url = self.status_url(external_job_id);
        debug!(task_type = %self.config.task_type, url = %url, "Polling provider job");

        let body = self.send_json(self.client.get(&url)).await?;
        Ok(self.parse_status_response(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> HttpProvider {
        HttpProvider::new(ProviderConfig::new(
            "video_a",
            MediaClass::Video,
            "http://127.0.0.1:1/v1/",
        ))
        .unwrap()
    }

    #[test]
    fn test_status_url_encodes_job_id() {
        let p = provider();
        assert_eq!(
            p.status_url("operations/abc 1"),
            "http://127.0.0.1:1/v1/jobs/operations%2Fabc%201"
        );
    }

    #[test]
    fn test_parse_create_response() {
        let p = provider();
        assert_eq!(p.parse_create_response(&json!({"id": "job-1"})).unwrap(), "job-1");
        assert_eq!(p.parse_create_response(&json!({"id": 42})).unwrap(), "42");
        assert!(matches!(
            p.parse_create_response(&json!({"job": "x"})),
            Err(ProviderError::UnconfirmedCreate(_))
        ));
        assert!(p.parse_create_response(&json!({"id": ""})).is_err());
    }

    #[test]
    fn test_create_response_without_job_id_is_not_retried() {
        let p = provider();
        for body in [json!({}), json!({"id": null}), json!({"id": ""})] {
            let err = p.parse_create_response(&body).unwrap_err();
            assert!(!err.is_transient(), "retryable for {}", body);
        }
    }

    #[test]
    fn test_parse_status_response() {
        let p = provider();
        let status = p.parse_status_response(&json!({
            "status": "processing",
            "progress": 45,
            "result_url": null,
            "error": null
        }));
        assert_eq!(status.status.as_deref(), Some("processing"));
        assert_eq!(status.progress.as_deref(), Some("45"));
        assert_eq!(status.locator, None);
        assert_eq!(status.error, None);
        assert_eq!(status.done, None);
    }

    #[test]
    fn test_parse_operation_style_response() {
        let mut config = ProviderConfig::new("video_c", MediaClass::Video, "https://ops");
        config.response.status = None;
        config.response.done = Some("/done".to_string());
        config.response.locator = "/response/videos/0/uri".to_string();
        config.response.error = Some("/error".to_string());
        let p = HttpProvider::new(config).unwrap();

        let status = p.parse_status_response(&json!({
            "name": "operations/1",
            "done": true,
            "response": {"videos": [{"uri": "https://cdn/v.mp4"}]}
        }));
        assert_eq!(status.done, Some(true));
        assert_eq!(status.locator.as_deref(), Some("https://cdn/v.mp4"));

        let failed = p.parse_status_response(&json!({
            "done": true,
            "error": {"code": 3, "message": "unsafe prompt"}
        }));
        assert!(failed.error.unwrap().contains("unsafe prompt"));
    }

    #[test]
    fn test_empty_base_url_is_rejected() {
        let result = HttpProvider::new(ProviderConfig::new("video_a", MediaClass::Video, ""));
        assert!(matches!(result, Err(ProviderError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_transient() {
        let p = provider();
        let err = p.create(&json!({"prompt": "x"})).await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {:?}", err);
    }
}
