//! Structured logging.
//!
//! Two separate streams leave the process:
//! - diagnostics, through `tracing` (pretty or JSON on stdout);
//! - one [`RequestRecord`] per completed request, through a [`LogSink`].

use std::io;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LogSinkKind, ObservabilityConfig};
use crate::observability::datagram::DatagramSender;

/// Initialize the diagnostic tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "logging_app={level},request_log={level},tower_http={level}",
            level = config.log_level
        )
        .into()
    });
    let json = config.log_format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

/// Summary of one completed request, as shipped to the log collector.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    pub method: String,
    pub uri: String,
    pub remote_ip: String,
    pub status: u16,
    pub request_time_ms: f64,
    pub service_id: String,
    pub request_id: String,
    /// Values accumulated by the handler. Merged last, so they win on key clashes.
    pub extra: Map<String, Value>,
}

impl RequestRecord {
    /// Flatten into the collector's JSON object.
    pub fn to_json(&self) -> Value {
        let mut packet = Map::new();
        packet.insert("method".into(), self.method.clone().into());
        packet.insert("uri".into(), self.uri.clone().into());
        packet.insert("remote_ip".into(), self.remote_ip.clone().into());
        packet.insert("status".into(), self.status.into());
        packet.insert("request_time_ms".into(), self.request_time_ms.into());
        packet.insert("service_id".into(), self.service_id.clone().into());
        packet.insert("request_id".into(), self.request_id.clone().into());
        for (key, value) in &self.extra {
            packet.insert(key.clone(), value.clone());
        }
        Value::Object(packet)
    }
}

/// Destination for request records.
///
/// Implementations must not block and must never fail the request: errors are
/// logged and dropped.
pub trait LogSink: Send + Sync {
    fn emit(&self, record: &RequestRecord);
}

/// Sends each record as a JSON datagram to a UDP log collector.
#[derive(Debug)]
pub struct UdpLogSink {
    sender: DatagramSender,
}

impl UdpLogSink {
    pub async fn connect(collector: &str) -> io::Result<Self> {
        Ok(Self {
            sender: DatagramSender::connect(collector).await?,
        })
    }
}

impl LogSink for UdpLogSink {
    fn emit(&self, record: &RequestRecord) {
        match serde_json::to_vec(&record.to_json()) {
            Ok(payload) => {
                self.sender.send(&payload);
            }
            Err(e) => {
                tracing::warn!(request_id = %record.request_id, error = %e, "Failed to encode request record");
            }
        }
    }
}

/// Writes each record as a single `tracing` event on target `request_log`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn emit(&self, record: &RequestRecord) {
        tracing::info!(
            target: "request_log",
            method = %record.method,
            uri = %record.uri,
            remote_ip = %record.remote_ip,
            status = record.status,
            request_time_ms = record.request_time_ms,
            service_id = %record.service_id,
            request_id = %record.request_id,
            extra = %serde_json::Value::Object(record.extra.clone()),
            "request completed"
        );
    }
}

/// Build the configured request record sink.
pub async fn build_log_sink(config: &ObservabilityConfig) -> io::Result<Arc<dyn LogSink>> {
    Ok(match config.log_sink {
        LogSinkKind::Udp => Arc::new(UdpLogSink::connect(&config.log_collector_address).await?),
        LogSinkKind::Tracing => Arc::new(TracingLogSink),
    })
}
