//! Timing metrics.
//!
//! # Metrics
//! - `requests.<status>` (timer, ms): one sample per completed request
//! - `<name>` (timer, ms): one sample per [`Metrics::timeit`] call
//!
//! # Design Decisions
//! - [`Metrics`] is an explicit handle built once at startup and cloned into
//!   request state; nothing here reads global configuration
//! - The sink applies the service namespace prefix
//! - Samples are recorded even when the timed code fails or panics

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::{MetricsBackend, ObservabilityConfig};
use crate::observability::datagram::DatagramSender;

/// Destination for timing samples.
pub trait MetricSink: Send + Sync {
    /// Record a duration in milliseconds under the unprefixed `name`.
    fn timing(&self, name: &str, millis: f64);
}

/// StatsD timers over UDP: `<prefix>.<name>:<ms>|ms`.
#[derive(Debug)]
pub struct StatsdSink {
    prefix: String,
    sender: DatagramSender,
}

impl StatsdSink {
    pub async fn connect(prefix: &str, address: &str) -> io::Result<Self> {
        Ok(Self {
            prefix: prefix.to_string(),
            sender: DatagramSender::connect(address).await?,
        })
    }

    fn line(&self, name: &str, millis: f64) -> String {
        format!("{}.{}:{:.3}|ms", self.prefix, name, millis)
    }
}

impl MetricSink for StatsdSink {
    fn timing(&self, name: &str, millis: f64) {
        self.sender.send(self.line(name, millis).as_bytes());
    }
}

/// Records into the `metrics` facade as a `service_timing_ms` histogram,
/// labelled with the service and the sample name.
#[derive(Debug, Clone)]
pub struct PrometheusSink {
    prefix: String,
}

impl PrometheusSink {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }
}

impl MetricSink for PrometheusSink {
    fn timing(&self, name: &str, millis: f64) {
        metrics::histogram!(
            "service_timing_ms",
            "service" => self.prefix.clone(),
            "metric" => name.to_string()
        )
        .record(millis);
    }
}

/// Discards every sample.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MetricSink for NullSink {
    fn timing(&self, _name: &str, _millis: f64) {}
}

/// Cloneable handle to the process-wide metric sink.
#[derive(Clone)]
pub struct Metrics {
    sink: Arc<dyn MetricSink>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    pub fn new(sink: Arc<dyn MetricSink>) -> Self {
        Self { sink }
    }

    /// A handle that drops everything.
    pub fn disabled() -> Self {
        Self::new(Arc::new(NullSink))
    }

    /// Record a timing sample in milliseconds.
    pub fn timing(&self, name: &str, millis: f64) {
        self.sink.timing(name, millis);
    }

    /// Start a timer that records under `name` when dropped.
    pub fn start_timer(&self, name: impl Into<String>) -> Timer {
        Timer {
            metrics: self.clone(),
            name: name.into(),
            start: Instant::now(),
        }
    }

    /// Run `f`, record its wall-clock duration under `name`, return its result.
    ///
    /// The sample is recorded whatever `f` returns, and also if it panics.
    pub fn timeit<R>(&self, name: &str, f: impl FnOnce() -> R) -> R {
        let _timer = self.start_timer(name);
        f()
    }

    /// Async counterpart of [`Metrics::timeit`]. A cancelled future still records.
    pub async fn timeit_async<F: Future>(&self, name: &str, fut: F) -> F::Output {
        let _timer = self.start_timer(name);
        fut.await
    }
}

/// Drop guard recording elapsed time.
#[must_use = "the timer records when dropped"]
pub struct Timer {
    metrics: Metrics,
    name: String,
    start: Instant,
}

impl Timer {
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.metrics.timing(&self.name, self.elapsed_ms());
    }
}

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install Prometheus exporter"),
    }
}

/// Build the configured metrics handle. `prefix` is the service identity.
pub async fn build_metrics(config: &ObservabilityConfig, prefix: &str) -> io::Result<Metrics> {
    let sink: Arc<dyn MetricSink> = match config.metrics_backend {
        MetricsBackend::Statsd => Arc::new(StatsdSink::connect(prefix, &config.statsd_address).await?),
        MetricsBackend::Prometheus => {
            let addr: SocketAddr = config
                .metrics_address
                .parse()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            init_metrics(addr);
            Arc::new(PrometheusSink::new(prefix))
        }
        MetricsBackend::None => Arc::new(NullSink),
    };
    Ok(Metrics::new(sink))
}
