//! Request failures and the HTML error page.
//!
//! Handlers fail by returning [`HttpError`] (usually via `?` or [`halt`]).
//! Its `IntoResponse` impl only marks the response; the page itself is
//! rendered once, by the completion layer, through [`render_error`].
//!
//! # Escaping
//! The page body is `{code}: {message}`, with `< > & " '` HTML-escaped, so a
//! message echoing user input cannot inject markup. The `halt_reason` log
//! value keeps the message unescaped.

use std::any::Any;

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use thiserror::Error;

use crate::codec::EncodeError;
use crate::http::context::RequestScope;

/// Log value key carrying the resolved failure message.
pub const HALT_REASON: &str = "halt_reason";

/// A request aborted with an HTTP status and optional message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{status}: {}", .message.as_deref().unwrap_or_default())]
pub struct HttpError {
    status: StatusCode,
    message: Option<String>,
}

impl HttpError {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST).with_message(message)
    }

    /// 500 without a message, so the default phrase is shown.
    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// Abort the current handler: `return Err(halt(StatusCode::CONFLICT, Some("taken")))`.
pub fn halt(status: StatusCode, message: Option<&str>) -> HttpError {
    let err = HttpError::new(status);
    match message {
        Some(message) => err.with_message(message),
        None => err,
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = self.status.into_response();
        response.extensions_mut().insert(self);
        response
    }
}

impl From<EncodeError> for HttpError {
    fn from(err: EncodeError) -> Self {
        tracing::warn!(error = %err, "Response encoding failed");
        HttpError::internal()
    }
}

/// Render the error page for `status` and record `halt_reason` in `scope`.
///
/// An empty or missing `message` falls back to the status's reason phrase,
/// itself empty for codes without one.
pub fn render_error(status: StatusCode, message: Option<&str>, scope: &RequestScope) -> Response {
    let default_message = status.canonical_reason().unwrap_or("");
    let message = message.filter(|m| !m.is_empty()).unwrap_or(default_message);

    scope.insert_log_value(HALT_REASON, message.into());

    let code = status.as_u16();
    let page = format!(
        "<html><title>{code}: {}</title><body>{code}: {}</body></html>",
        escape_html(default_message),
        escape_html(message),
    );
    (status, Html(page)).into_response()
}

/// Completion hook for `CatchPanicLayer`: a panic becomes a plain 500.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic");
    tracing::error!(panic = %detail, "Handler panicked");
    HttpError::internal().into_response()
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
