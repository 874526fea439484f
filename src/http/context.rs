//! Per-request helpers available to handlers.
//!
//! # Responsibilities
//! - `RequestScope`: request-lifetime state shared between a handler and the
//!   completion layer (accumulated log values, pending response headers)
//! - `RequestContext`: extractor bundling the helpers a handler calls
//!   (caller identity, app URL, log values, content-type checks, timing)
//!
//! # Design Decisions
//! - Log values stay `None` until the first write, then merge into the
//!   request record at completion
//! - Values are converted to JSON at insertion so a bad value fails the
//!   handler call, not the log emission
//! - Scope is never shared across requests

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::{CONTENT_TYPE, HOST};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode, Uri};
use serde::Serialize;
use serde_json::Map;

use crate::codec::{self, EncodeError, Value};
use crate::config::UNDEFINED;
use crate::http::error::{halt, HttpError};
use crate::http::request::RequestIdExt;
use crate::http::server::ServiceState;
use crate::observability::Metrics;

/// Caller identity header, set by an upstream authenticating proxy.
pub static X_AUTH_USER: HeaderName = HeaderName::from_static("x-auth-user");

static X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
static X_SCHEME: HeaderName = HeaderName::from_static("x-scheme");
static X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Default)]
struct ScopeState {
    log_values: Option<Map<String, serde_json::Value>>,
    headers: HeaderMap,
}

/// Request-lifetime state, inserted into request extensions by the
/// completion layer.
#[derive(Debug, Clone, Default)]
pub struct RequestScope(Arc<Mutex<ScopeState>>);

impl RequestScope {
    fn lock(&self) -> MutexGuard<'_, ScopeState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite an accumulated log value.
    pub fn insert_log_value(&self, key: impl Into<String>, value: serde_json::Value) {
        self.lock()
            .log_values
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
    }

    /// Snapshot of accumulated log values, `None` if nothing was logged.
    pub fn log_values(&self) -> Option<Map<String, serde_json::Value>> {
        self.lock().log_values.clone()
    }

    pub(crate) fn take_log_values(&self) -> Option<Map<String, serde_json::Value>> {
        self.lock().log_values.take()
    }

    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        self.lock().headers.insert(name, value);
    }

    pub(crate) fn take_headers(&self) -> HeaderMap {
        std::mem::take(&mut self.lock().headers)
    }
}

/// Handler-side view of the current request.
///
/// ```ignore
/// async fn create(ctx: RequestContext, body: String) -> Result<String, HttpError> {
///     ctx.require_json_content_type()?;
///     ctx.logvalue("caller", ctx.caller())?;
///     Ok(ctx.json(&Value::object([("url", ctx.appurl())]))?)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    headers: HeaderMap,
    uri: Uri,
    scope: RequestScope,
    service: Arc<ServiceState>,
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let scope = parts.extensions.get::<RequestScope>().cloned();
        let service = parts.extensions.get::<Arc<ServiceState>>().cloned();

        match (scope, service) {
            (Some(scope), Some(service)) => Ok(Self {
                headers: parts.headers.clone(),
                uri: parts.uri.clone(),
                scope,
                service,
            }),
            _ => {
                tracing::error!("RequestContext extracted outside RequestLogLayer");
                Err(HttpError::internal())
            }
        }
    }
}

impl RequestContext {
    /// Scheme and host of the application, e.g. `https://example.com`.
    pub fn appurl(&self) -> String {
        format!("{}://{}", self.scheme(), self.host())
    }

    fn scheme(&self) -> &str {
        if self.service.trust_forwarded_headers() {
            let forwarded = header_str(&self.headers, &X_SCHEME)
                .or_else(|| header_str(&self.headers, &X_FORWARDED_PROTO))
                .and_then(|v| v.rsplit(',').next())
                .map(str::trim)
                .filter(|proto| matches!(*proto, "http" | "https"));
            if let Some(proto) = forwarded {
                return proto;
            }
        }
        self.uri.scheme_str().unwrap_or("http")
    }

    fn host(&self) -> &str {
        header_str(&self.headers, &HOST)
            .or_else(|| self.uri.authority().map(|a| a.as_str()))
            .unwrap_or("127.0.0.1")
    }

    /// Authenticated caller from `X-Auth-User`, or `"undefined"`.
    pub fn caller(&self) -> &str {
        header_str(&self.headers, &X_AUTH_USER).unwrap_or(UNDEFINED)
    }

    pub fn request_id(&self) -> &str {
        self.headers.request_id()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn service_id(&self) -> &str {
        self.service.service_id()
    }

    /// Add a key/value to this request's log record. Last write wins.
    pub fn logvalue(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), EncodeError> {
        let value = codec::to_json(&value.into())?;
        self.scope.insert_log_value(key, value);
        Ok(())
    }

    /// Fail with 400 unless `Content-Type` is exactly `expected`.
    pub fn require_content_type(&self, expected: &str) -> Result<(), HttpError> {
        let actual = self
            .headers
            .get(CONTENT_TYPE)
            .map(HeaderValue::as_bytes)
            .unwrap_or_default();
        if actual == expected.as_bytes() {
            Ok(())
        } else {
            Err(HttpError::bad_request(format!("Content type must be {expected}")))
        }
    }

    pub fn require_json_content_type(&self) -> Result<(), HttpError> {
        self.require_content_type(JSON_CONTENT_TYPE)
    }

    pub fn metrics(&self) -> &Metrics {
        self.service.metrics()
    }

    /// Run `f` and record its duration under `metric`.
    pub fn timeit<R>(&self, metric: &str, f: impl FnOnce() -> R) -> R {
        self.service.metrics().timeit(metric, f)
    }

    pub async fn timeit_async<F: Future>(&self, metric: &str, fut: F) -> F::Output {
        self.service.metrics().timeit_async(metric, fut).await
    }

    /// Set response headers. Discarded if the request ends in an error page.
    pub fn set_headers<I, K, V>(&self, headers: I) -> Result<(), HttpError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in headers {
            let (name, value) = (name.as_ref(), value.as_ref());
            let parsed = HeaderName::from_bytes(name.as_bytes())
                .ok()
                .zip(HeaderValue::from_str(value).ok());
            match parsed {
                Some((name, value)) => self.scope.set_header(name, value),
                None => {
                    tracing::warn!(header = %name, "Invalid response header");
                    return Err(HttpError::internal());
                }
            }
        }
        Ok(())
    }

    /// Build the error that aborts this handler.
    pub fn halt(&self, status: StatusCode, message: Option<&str>) -> HttpError {
        halt(status, message)
    }

    /// Encode with timestamp support.
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> Result<String, EncodeError> {
        codec::encode(value)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Client address for the request record.
///
/// With forwarded headers trusted, `X-Real-Ip` wins, then the last
/// `X-Forwarded-For` hop; either must parse as an IP address.
pub fn remote_ip<B>(request: &Request<B>, trust_forwarded: bool) -> String {
    if trust_forwarded {
        let headers = request.headers();
        let forwarded = header_str(headers, &X_REAL_IP)
            .or_else(|| header_str(headers, &X_FORWARDED_FOR).and_then(|v| v.rsplit(',').next()))
            .map(str::trim)
            .filter(|ip| ip.parse::<IpAddr>().is_ok());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNDEFINED.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::TracingLogSink;

    fn service(trust_forwarded: bool) -> Arc<ServiceState> {
        Arc::new(
            ServiceState::new("test", Arc::new(TracingLogSink), Metrics::disabled())
                .with_trust_forwarded_headers(trust_forwarded),
        )
    }

    async fn context(request: Request<()>, trust_forwarded: bool) -> RequestContext {
        let (mut parts, ()) = request.into_parts();
        parts.extensions.insert(RequestScope::default());
        parts.extensions.insert(service(trust_forwarded));
        RequestContext::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn test_appurl_from_absolute_uri() {
        let request = Request::builder()
            .uri("https://example.com/some/path?x=1")
            .body(())
            .unwrap();
        assert_eq!(context(request, false).await.appurl(), "https://example.com");
    }

    #[tokio::test]
    async fn test_appurl_from_host_header() {
        let request = Request::builder()
            .uri("/path")
            .header("host", "api.local:8080")
            .body(())
            .unwrap();
        assert_eq!(context(request, false).await.appurl(), "http://api.local:8080");
    }

    #[tokio::test]
    async fn test_appurl_forwarded_proto_needs_trust() {
        let build = || {
            Request::builder()
                .uri("/")
                .header("host", "example.com")
                .header("x-forwarded-proto", "https")
                .body(())
                .unwrap()
        };
        assert_eq!(context(build(), false).await.appurl(), "http://example.com");
        assert_eq!(context(build(), true).await.appurl(), "https://example.com");
    }

    #[tokio::test]
    async fn test_caller() {
        let request = Request::builder().body(()).unwrap();
        assert_eq!(context(request, false).await.caller(), "undefined");

        let request = Request::builder()
            .header("X-Auth-User", "alice")
            .body(())
            .unwrap();
        assert_eq!(context(request, false).await.caller(), "alice");
    }

    #[tokio::test]
    async fn test_require_content_type() {
        let request = Request::builder()
            .header("content-type", "text/plain")
            .body(())
            .unwrap();
        let err = context(request, false)
            .await
            .require_json_content_type()
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), Some("Content type must be application/json"));

        let request = Request::builder()
            .header("content-type", "application/json")
            .body(())
            .unwrap();
        assert!(context(request, false).await.require_json_content_type().is_ok());
    }

    #[tokio::test]
    async fn test_content_type_parameters_not_normalized() {
        let request = Request::builder()
            .header("content-type", "application/json; charset=utf-8")
            .body(())
            .unwrap();
        assert!(context(request, false).await.require_json_content_type().is_err());

        let request = Request::builder().body(()).unwrap();
        assert!(context(request, false).await.require_json_content_type().is_err());
    }

    #[tokio::test]
    async fn test_logvalue_last_write_wins() {
        let request = Request::builder().body(()).unwrap();
        let ctx = context(request, false).await;
        assert!(ctx.scope.log_values().is_none());

        ctx.logvalue("k", 1i64).unwrap();
        ctx.logvalue("k", "two").unwrap();
        ctx.logvalue("other", true).unwrap();

        let values = ctx.scope.log_values().unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values["k"], "two");
    }

    #[tokio::test]
    async fn test_logvalue_rejects_time_only() {
        let request = Request::builder().body(()).unwrap();
        let ctx = context(request, false).await;
        let time = chrono::NaiveTime::from_hms_opt(1, 2, 3).unwrap();
        assert!(matches!(
            ctx.logvalue("t", time),
            Err(EncodeError::Unsupported(_))
        ));
        assert!(ctx.scope.log_values().is_none());
    }

    #[tokio::test]
    async fn test_set_headers() {
        let request = Request::builder().body(()).unwrap();
        let ctx = context(request, false).await;

        ctx.set_headers([("X-One", "1"), ("X-Two", "2")]).unwrap();
        assert!(ctx.set_headers([("bad header", "x")]).is_err());

        let headers = ctx.scope.take_headers();
        assert_eq!(headers["x-one"], "1");
        assert_eq!(headers["x-two"], "2");
    }

    #[tokio::test]
    async fn test_missing_scope_is_rejected() {
        let (mut parts, ()) = Request::builder().body(()).unwrap().into_parts();
        let err = RequestContext::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_remote_ip() {
        let mut request = Request::builder()
            .header("x-forwarded-for", "10.0.0.1, 10.0.0.2")
            .body(())
            .unwrap();
        assert_eq!(remote_ip(&request, true), "10.0.0.2");
        assert_eq!(remote_ip(&request, false), "undefined");

        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 5], 4000))));
        assert_eq!(remote_ip(&request, false), "192.168.1.5");

        request
            .headers_mut()
            .insert("x-real-ip", HeaderValue::from_static("not-an-ip"));
        assert_eq!(remote_ip(&request, true), "192.168.1.5");
    }
}
