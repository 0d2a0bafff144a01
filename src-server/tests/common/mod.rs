//! Shared setup for API tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use harvest::config::RunnerConfig;
use harvest::store::SqliteJobStore;
use harvest::{Database, JobId, JobRunner, JobStore, ProgressBus, SampleExtractor};
use harvest_server::{app, AppState};

pub struct TestServer {
    _temp_dir: TempDir,
    pub state: Arc<AppState>,
    pub app: Router,
}

impl TestServer {
    pub fn new() -> Self {
        Self::with_delay(0)
    }

    /// Sample extractor slowed down by `delay_ms` per call.
    pub fn with_delay(delay_ms: u64) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(&temp_dir.path().join("harvest.db")).expect("Failed to open db");
        let store: Arc<dyn JobStore> = Arc::new(SqliteJobStore::new(db));
        let config = RunnerConfig {
            worker_count: 2,
            default_max_results: 15,
            max_results_limit: 100,
            observer_buffer: 64,
        };
        let runner = JobRunner::new(
            store,
            Arc::new(SampleExtractor::with_delay_ms(delay_ms)),
            ProgressBus::new(),
            &config,
        );
        let state = Arc::new(AppState::new(runner, config.observer_buffer));
        let app = app(Arc::clone(&state), &["http://localhost:3000".to_string()]);

        Self {
            _temp_dir: temp_dir,
            state,
            app,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let (status, bytes) = self
            .send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, bytes) = self.send(request).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("DELETE")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let (status, bytes) = self.send(request).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    /// Polls the API until the job is completed or failed.
    pub async fn wait_for_terminal(&self, id: JobId) -> Value {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let (_, job) = self.get_json(&format!("/api/scraping/jobs/{}", id)).await;
                if job["status"] == "completed" || job["status"] == "failed" {
                    return job;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("job did not finish in time")
    }
}
