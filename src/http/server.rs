//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Hold the process-wide service state (identity, sinks)
//! - Wrap the application's Axum router with the request lifecycle layers
//! - Bind server to listener and shut down gracefully
//!
//! # Layer order (outermost first)
//! ```text
//! SetRequestIdLayer        ensure X-Request-Id
//! PropagateRequestIdLayer  optional echo on the response
//! TraceLayer               diagnostic span with request_id
//! RequestLogLayer          error page, request record, requests.<status>
//! TimeoutLayer             408 on slow handlers
//! CatchPanicLayer          panic → 500
//! application routes
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{AppConfig, UNDEFINED};
use crate::http::error::panic_response;
use crate::http::lifecycle::RequestLogLayer;
use crate::http::request::{HexRequestId, RequestIdExt};
use crate::observability::{LogSink, Metrics};

/// Process-wide state shared by every request. Immutable after startup.
pub struct ServiceState {
    service_id: String,
    log_sink: Arc<dyn LogSink>,
    metrics: Metrics,
    trust_forwarded_headers: bool,
}

impl std::fmt::Debug for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceState")
            .field("service_id", &self.service_id)
            .field("trust_forwarded_headers", &self.trust_forwarded_headers)
            .finish_non_exhaustive()
    }
}

impl ServiceState {
    /// An empty `service_id` becomes `"undefined"`.
    pub fn new(service_id: &str, log_sink: Arc<dyn LogSink>, metrics: Metrics) -> Self {
        let service_id = match service_id.trim() {
            "" => UNDEFINED.to_string(),
            id => id.to_string(),
        };
        Self {
            service_id,
            log_sink,
            metrics,
            trust_forwarded_headers: false,
        }
    }

    pub fn with_trust_forwarded_headers(mut self, trust: bool) -> Self {
        self.trust_forwarded_headers = trust;
        self
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn log_sink(&self) -> &dyn LogSink {
        self.log_sink.as_ref()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn trust_forwarded_headers(&self) -> bool {
        self.trust_forwarded_headers
    }
}

/// HTTP server for a logging service.
pub struct HttpServer {
    router: Router,
    state: Arc<ServiceState>,
}

impl HttpServer {
    /// Wrap `routes` with the lifecycle layers.
    pub fn new(config: &AppConfig, state: ServiceState, routes: Router) -> Self {
        let state = Arc::new(state);
        let router = Self::build_router(config, state.clone(), routes);
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(config: &AppConfig, state: Arc<ServiceState>, routes: Router) -> Router {
        let router = routes
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(TimeoutLayer::new(Duration::from_secs(config.http.request_timeout_secs)))
            .layer(RequestLogLayer::new(state))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request.request_id(),
                )
            }));

        let router = if config.http.echo_request_id {
            router.layer(PropagateRequestIdLayer::x_request_id())
        } else {
            router
        };

        router.layer(SetRequestIdLayer::x_request_id(HexRequestId))
    }

    /// The fully layered router, e.g. for in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &Arc<ServiceState> {
        &self.state
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            service_id = %self.state.service_id(),
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
