//! Request lifecycle middleware for Axum services.
//!
//! Adds per-request correlation IDs, one structured log record and one
//! `requests.<status>` timing per request, handler helpers (caller identity,
//! app URL, log values, content-type checks, timing) and a uniform HTML
//! error page.

pub mod codec;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::AppConfig;
pub use http::{halt, HttpError, HttpServer, RequestContext, ServiceState};
pub use lifecycle::Shutdown;
