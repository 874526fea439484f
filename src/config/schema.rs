//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Sentinel used wherever an expected value is missing.
pub const UNDEFINED: &str = "undefined";

/// Root configuration for a logging service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Service identity (log field and metrics namespace).
    pub service: ServiceConfig,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Request handling settings.
    pub http: HttpConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service identifier. Empty means [`UNDEFINED`].
    pub id: String,
}

impl ServiceConfig {
    /// Resolved service identifier, never empty.
    pub fn service_id(&self) -> &str {
        let id = self.id.trim();
        if id.is_empty() {
            UNDEFINED
        } else {
            id
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Request handling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,

    /// Honour X-Real-Ip / X-Forwarded-For / X-Scheme / X-Forwarded-Proto.
    /// Only enable behind a proxy that overwrites these headers.
    pub trust_forwarded_headers: bool,

    /// Copy the request ID onto the response as `X-Request-Id`.
    pub echo_request_id: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            trust_forwarded_headers: false,
            echo_request_id: false,
        }
    }
}

/// Diagnostic log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Destination for structured request records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogSinkKind {
    /// JSON datagrams to a UDP log collector.
    #[default]
    Udp,
    /// Single `tracing` event per request on target `request_log`.
    Tracing,
}

/// Destination for timing samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MetricsBackend {
    /// StatsD timers over UDP.
    #[default]
    Statsd,
    /// `metrics` facade histograms scraped by Prometheus.
    Prometheus,
    /// Discard all samples.
    None,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Diagnostic log format.
    pub log_format: LogFormat,

    /// Request record destination.
    pub log_sink: LogSinkKind,

    /// UDP log collector address.
    pub log_collector_address: String,

    /// Timing sample destination.
    pub metrics_backend: MetricsBackend,

    /// StatsD daemon address.
    pub statsd_address: String,

    /// Prometheus scrape endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            log_sink: LogSinkKind::Udp,
            log_collector_address: "127.0.0.1:5140".to_string(),
            metrics_backend: MetricsBackend::Statsd,
            statsd_address: "127.0.0.1:8125".to_string(),
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_service_id_is_undefined() {
        let config = ServiceConfig { id: "  ".into() };
        assert_eq!(config.service_id(), "undefined");

        let config = ServiceConfig { id: "myservice".into() };
        assert_eq!(config.service_id(), "myservice");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [service]
            id = "orders"

            [observability]
            log_format = "json"
            metrics_backend = "none"
            "#,
        )
        .unwrap();

        assert_eq!(config.service.service_id(), "orders");
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.observability.log_sink, LogSinkKind::Udp);
        assert_eq!(config.observability.metrics_backend, MetricsBackend::None);
        assert!(!config.http.echo_request_id);
    }
}
