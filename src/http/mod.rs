//! HTTP request lifecycle.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → request.rs (ensure X-Request-Id)
//!     → lifecycle.rs (scope + service state into extensions)
//!     → handler, using context.rs (RequestContext helpers)
//!         → returns Ok(response) or Err(HttpError) (error.rs)
//!     → lifecycle.rs (error page, request record, requests.<status>)
//!     → client
//! ```

pub mod context;
pub mod error;
pub mod lifecycle;
pub mod request;
pub mod server;

pub use context::{RequestContext, RequestScope, X_AUTH_USER};
pub use error::{halt, HttpError, HALT_REASON};
pub use lifecycle::{RequestLogLayer, REQUEST_METRIC_PREFIX};
pub use request::{HexRequestId, RequestIdExt, X_REQUEST_ID};
pub use server::{HttpServer, ServiceState};
