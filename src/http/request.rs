//! Request correlation IDs.
//!
//! # Responsibilities
//! - Ensure every inbound request carries `X-Request-Id` before handlers run
//! - Generate a 128-bit random ID (32 hex chars) when the client sent none
//! - Read the current ID, falling back to the `"undefined"` sentinel
//!
//! # Design Decisions
//! - Generation goes through tower-http's `SetRequestIdLayer`, which leaves an
//!   existing header untouched
//! - Echoing the ID on the response is optional (`PropagateRequestIdLayer`)

use axum::http::{HeaderMap, HeaderName, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::config::UNDEFINED;

/// Correlation header (`X-Request-Id`; header names are case-insensitive).
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Generates random request IDs as lowercase hex without hyphens.
#[derive(Debug, Clone, Copy, Default)]
pub struct HexRequestId;

impl HexRequestId {
    pub fn generate() -> String {
        Uuid::new_v4().simple().to_string()
    }
}

impl MakeRequestId for HexRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Self::generate().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Read access to the correlation ID.
pub trait RequestIdExt {
    /// Current request ID, or `"undefined"` if absent or not valid UTF-8.
    fn request_id(&self) -> &str;
}

impl RequestIdExt for HeaderMap {
    fn request_id(&self) -> &str {
        self.get(&X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or(UNDEFINED)
    }
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> &str {
        self.headers().request_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_ids_are_unique_hex() {
        let ids: HashSet<String> = (0..1000).map(|_| HexRequestId::generate()).collect();
        assert_eq!(ids.len(), 1000);
        for id in &ids {
            assert_eq!(id.len(), 32);
            assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_make_request_id() {
        let request = Request::builder().body(()).unwrap();
        let mut maker = HexRequestId;
        let id = maker.make_request_id(&request).unwrap();
        assert_eq!(id.header_value().len(), 32);
    }

    #[test]
    fn test_request_id_sentinel() {
        let request = Request::builder().body(()).unwrap();
        assert_eq!(request.request_id(), "undefined");

        let request = Request::builder()
            .header("X-Request-Id", "abc123")
            .body(())
            .unwrap();
        assert_eq!(request.request_id(), "abc123");
    }
}
