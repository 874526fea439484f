//! Shared utilities for integration tests.

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use tower::ServiceExt;

use logging_app::config::AppConfig;
use logging_app::http::{HttpServer, ServiceState};
use logging_app::observability::{LogSink, MetricSink, Metrics, RequestRecord};

/// Log sink keeping every record in memory.
#[derive(Default)]
pub struct RecordingLogSink {
    records: Mutex<Vec<RequestRecord>>,
}

impl RecordingLogSink {
    pub fn records(&self) -> Vec<RequestRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl LogSink for RecordingLogSink {
    fn emit(&self, record: &RequestRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}

/// Metric sink keeping every sample in memory.
#[derive(Default)]
pub struct RecordingMetricSink {
    samples: Mutex<Vec<(String, f64)>>,
}

#[allow(dead_code)]
impl RecordingMetricSink {
    pub fn names(&self) -> Vec<String> {
        self.samples
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl MetricSink for RecordingMetricSink {
    fn timing(&self, name: &str, millis: f64) {
        self.samples.lock().unwrap().push((name.to_string(), millis));
    }
}

/// A layered router wired to recording sinks.
#[allow(dead_code)]
pub struct Harness {
    pub server: HttpServer,
    pub logs: Arc<RecordingLogSink>,
    pub metrics: Arc<RecordingMetricSink>,
}

#[allow(dead_code)]
impl Harness {
    pub fn new(routes: Router) -> Self {
        Self::with_config(&AppConfig::default(), routes)
    }

    pub fn with_config(config: &AppConfig, routes: Router) -> Self {
        let logs = Arc::new(RecordingLogSink::default());
        let metrics = Arc::new(RecordingMetricSink::default());
        let state = ServiceState::new("myservice", logs.clone(), Metrics::new(metrics.clone()))
            .with_trust_forwarded_headers(config.http.trust_forwarded_headers);
        let server = HttpServer::new(config, state, routes);
        Self {
            server,
            logs,
            metrics,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.server.router().oneshot(request).await.unwrap()
    }
}

#[allow(dead_code)]
pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
