//! Request completion hook.
//!
//! `RequestLogLayer` wraps every route. Per request it:
//! 1. inserts a fresh [`RequestScope`] and the shared [`ServiceState`];
//! 2. runs the handler;
//! 3. renders the error page for failed requests (which records `halt_reason`),
//!    otherwise applies headers the handler set;
//! 4. emits exactly one [`RequestRecord`] and one `requests.<status>` timing.
//!
//! The correlation ID layer must run outside this one so the ID is present
//! when the request enters.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::{Body, HttpBody};
use axum::extract::Request;
use axum::http::header::CONTENT_TYPE;
use axum::response::Response;
use tower::{Layer, Service};

use crate::http::context::{remote_ip, RequestScope};
use crate::http::error::{render_error, HttpError};
use crate::http::request::RequestIdExt;
use crate::http::server::ServiceState;
use crate::observability::RequestRecord;

/// Metric name prefix for per-request timings.
pub const REQUEST_METRIC_PREFIX: &str = "requests.";

/// Largest plain-text error body read back as the failure message.
const MAX_MESSAGE_BYTES: usize = 16 * 1024;

#[derive(Clone)]
pub struct RequestLogLayer {
    state: Arc<ServiceState>,
}

impl RequestLogLayer {
    pub fn new(state: Arc<ServiceState>) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for RequestLogLayer {
    type Service = RequestLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLogService {
            inner,
            state: self.state.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RequestLogService<S> {
    inner: S,
    state: Arc<ServiceState>,
}

impl<S> Service<Request> for RequestLogService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        let start = Instant::now();
        let state = self.state.clone();
        let scope = RequestScope::default();

        let pending = PendingRecord {
            method: request.method().to_string(),
            uri: request.uri().to_string(),
            remote_ip: remote_ip(&request, state.trust_forwarded_headers()),
            request_id: request.request_id().to_string(),
        };

        request.extensions_mut().insert(scope.clone());
        request.extensions_mut().insert(state.clone());

        // Take the service that was polled ready, leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let response = inner.call(request).await?;
            let response = finish_response(response, &scope).await;

            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
            emit(&state, pending, response.status().as_u16(), elapsed_ms, &scope);

            Ok(response)
        })
    }
}

/// Request fields captured on the way in.
struct PendingRecord {
    method: String,
    uri: String,
    remote_ip: String,
    request_id: String,
}

/// Render failures, or apply handler-set headers to successful responses.
///
/// Failures are:
/// - responses marked with [`HttpError`];
/// - bodiless 4xx/5xx responses (routing misses, method mismatches, timeouts);
/// - plain-text 4xx/5xx responses, which is how extractor rejections arrive.
///   The text becomes the message.
///
/// Error responses with any other body (JSON, HTML) pass through untouched.
async fn finish_response(mut response: Response, scope: &RequestScope) -> Response {
    if let Some(err) = response.extensions().get::<HttpError>().cloned() {
        return render_error(err.status(), err.message(), scope);
    }

    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        if is_empty(response.body()) {
            return render_error(status, None, scope);
        }
        if is_plain_text(&response) {
            let message = read_message(response.into_body()).await;
            return render_error(status, message.as_deref(), scope);
        }
    }

    for (name, value) in scope.take_headers() {
        if let Some(name) = name {
            response.headers_mut().insert(name, value);
        }
    }
    response
}

fn is_empty(body: &Body) -> bool {
    body.size_hint().exact() == Some(0)
}

fn is_plain_text(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/plain"))
}

/// `None` for oversized or unreadable bodies, so the reason phrase is used.
async fn read_message(body: Body) -> Option<String> {
    match axum::body::to_bytes(body, MAX_MESSAGE_BYTES).await {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).trim().to_string()),
        Err(e) => {
            tracing::debug!(error = %e, "Error body not readable");
            None
        }
    }
}

fn emit(state: &ServiceState, pending: PendingRecord, status: u16, elapsed_ms: f64, scope: &RequestScope) {
    let record = RequestRecord {
        method: pending.method,
        uri: pending.uri,
        remote_ip: pending.remote_ip,
        status,
        request_time_ms: elapsed_ms,
        service_id: state.service_id().to_string(),
        request_id: pending.request_id,
        extra: scope.take_log_values().unwrap_or_default(),
    };
    state.log_sink().emit(&record);

    let metric = format!("{REQUEST_METRIC_PREFIX}{status}");
    state.metrics().timing(&metric, elapsed_ms);
}
