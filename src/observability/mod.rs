//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request completion (http::lifecycle):
//!     → logging.rs (RequestRecord → LogSink: UDP collector or tracing)
//!     → metrics.rs (requests.<status> → MetricSink: StatsD, Prometheus, none)
//!
//! Handlers:
//!     → metrics.rs (timeit samples)
//!
//! Both UDP sinks share datagram.rs.
//! ```
//!
//! # Design Decisions
//! - Sinks are handles built at startup and passed in, not globals
//! - Emission never blocks and never fails a request

pub mod datagram;
pub mod logging;
pub mod metrics;

pub use logging::{LogSink, RequestRecord, TracingLogSink, UdpLogSink};
pub use metrics::{MetricSink, Metrics, NullSink, PrometheusSink, StatsdSink, Timer};
