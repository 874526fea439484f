//! Startup orchestration.
//!
//! Builds the sinks named by the configuration and the shared service state.
//! Fails fast: a sink that cannot be set up aborts startup.

use std::io;

use thiserror::Error;

use crate::config::AppConfig;
use crate::http::ServiceState;
use crate::observability::{logging, metrics};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("log sink setup failed: {0}")]
    LogSink(#[source] io::Error),

    #[error("metrics sink setup failed: {0}")]
    Metrics(#[source] io::Error),
}

/// Build the service state from configuration.
pub async fn build_state(config: &AppConfig) -> Result<ServiceState, StartupError> {
    let service_id = config.service.service_id();

    let log_sink = logging::build_log_sink(&config.observability)
        .await
        .map_err(StartupError::LogSink)?;
    let metrics = metrics::build_metrics(&config.observability, service_id)
        .await
        .map_err(StartupError::Metrics)?;

    tracing::info!(
        service_id = %service_id,
        log_sink = ?config.observability.log_sink,
        metrics_backend = ?config.observability.metrics_backend,
        "Service state initialized"
    );

    Ok(ServiceState::new(service_id, log_sink, metrics)
        .with_trust_forwarded_headers(config.http.trust_forwarded_headers))
}
