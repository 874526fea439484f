//! Configuration validation.
//!
//! Semantic checks run after serde has accepted the file. All problems are
//! collected so an operator sees every mistake at once.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{AppConfig, LogSinkKind, MetricsBackend};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("observability.log_level: unknown level {0:?}")]
    UnknownLogLevel(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);

    if config.http.request_timeout_secs == 0 {
        errors.push(ValidationError::NotPositive {
            field: "http.request_timeout_secs",
        });
    }

    let obs = &config.observability;
    if !matches!(
        obs.log_level.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        errors.push(ValidationError::UnknownLogLevel(obs.log_level.clone()));
    }

    // Collector addresses may be host names; only the port is checked here,
    // resolution happens when the sink is bound.
    if obs.log_sink == LogSinkKind::Udp {
        check_host_port(&mut errors, "observability.log_collector_address", &obs.log_collector_address);
    }
    match obs.metrics_backend {
        MetricsBackend::Statsd => {
            check_host_port(&mut errors, "observability.statsd_address", &obs.statsd_address)
        }
        MetricsBackend::Prometheus => {
            check_address(&mut errors, "observability.metrics_address", &obs.metrics_address)
        }
        MetricsBackend::None => {}
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_host_port(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    let valid = match value.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    };
    if !valid {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&AppConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = AppConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.http.request_timeout_secs = 0;
        config.observability.log_level = "loud".into();
        config.observability.statsd_address = "statsd".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::NotPositive {
            field: "http.request_timeout_secs"
        }));
    }

    #[test]
    fn test_collector_host_names_allowed() {
        let mut config = AppConfig::default();
        config.observability.log_collector_address = "logs.internal:5140".into();
        config.observability.statsd_address = "localhost:8125".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_unused_addresses_not_checked() {
        let mut config = AppConfig::default();
        config.observability.metrics_backend = MetricsBackend::None;
        config.observability.statsd_address = String::new();
        config.observability.metrics_address = String::new();
        assert!(validate_config(&config).is_ok());
    }
}
