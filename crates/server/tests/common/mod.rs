//! Common test utilities for API testing with mocks.
//!
//! Builds the real router over an orchestrator whose providers, object
//! store and notification channel are all in-process mocks.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use genbroker_core::{
    testing::{
        fixtures::{fast_config, TestHarness},
        MockProvider,
    },
    Config, GenerationProvider, ObjectStore, OrchestratorConfig, TaskOrchestrator, TaskStore,
};
use genbroker_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use genbroker_core::testing::fixtures;

/// Test fixture for API testing with mock dependencies.
///
/// The orchestrator is not started; tests advance tasks explicitly with
/// `drive` or the beat endpoint.
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mocks and store behind the orchestrator
    pub harness: TestHarness,
    pub orchestrator: Arc<TaskOrchestrator>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Raw response from a test request
#[derive(Debug)]
pub struct BytesResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl TestFixture {
    /// Fixture with a video provider `video_a` and an image provider `image_b`.
    pub fn new() -> Self {
        Self::with_providers(
            fast_config(),
            vec![MockProvider::video("video_a"), MockProvider::image("image_b")],
        )
    }

    pub fn with_providers(config: OrchestratorConfig, providers: Vec<MockProvider>) -> Self {
        let harness = TestHarness::new(config.clone(), providers);
        let orchestrator = Arc::new(TaskOrchestrator::new(Arc::clone(&harness.context)));

        let app_config = Config {
            orchestrator: config,
            ..Config::default()
        };
        let task_store: Arc<dyn TaskStore> = harness.store.clone();
        let object_store: Arc<dyn ObjectStore> = harness.objects.clone();
        let state = Arc::new(AppState::new(
            app_config,
            Arc::clone(&orchestrator),
            task_store,
            object_store,
        ));

        Self {
            router: create_router(state),
            harness,
            orchestrator,
        }
    }

    /// The mock registered for `task_type`.
    pub fn provider(&self, task_type: &str) -> &MockProvider {
        self.harness
            .providers
            .iter()
            .find(|p| p.task_type() == task_type)
            .map(|p| p.as_ref())
            .expect("no mock provider for task type")
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Fetch the raw text of a response, for non-JSON endpoints.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let response = self.get_bytes(path).await;
        (response.status, String::from_utf8_lossy(&response.body).into_owned())
    }

    /// Fetch a response body as bytes along with its content type.
    pub async fn get_bytes(&self, path: &str) -> BytesResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes()
            .to_vec();
        BytesResponse {
            status,
            content_type,
            body,
        }
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let builder = Request::builder().method(method).uri(path);
        let request = match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(serde_json::to_string(&json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Percent-encode the `:` in a task id for use in a request path.
pub fn task_path(task_id: &str) -> String {
    format!("/api/v1/tasks/{}", task_id.replace(':', "%3A"))
}
