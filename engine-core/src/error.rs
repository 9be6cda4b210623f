//! The engine's closed error taxonomy (§4.5, §7).
//!
//! Every user-facing error is an [`EngineError`]: a `base` kind drawn from a
//! fixed set, an optional original cause, an optional wrapped "inner" error,
//! an extras map, and an optional captured caller location. HTTP status is
//! derived entirely from `base`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use engine_http::{HeaderMap, IntoResponse, Json, Response, StatusCode};
use serde_json::Value;

/// Process-wide flag controlling whether `EngineError` captures a caller
/// location on construction. Set once in `Engine::new` (§9 "Global state");
/// never written again afterwards.
static CAPTURE_CALLER: AtomicBool = AtomicBool::new(false);

/// Enable or disable caller-location capture for newly constructed errors.
///
/// Also toggled by `RUNTIME_VERBOSE=error_caller` (§6).
pub fn set_capture_caller(enabled: bool) {
    CAPTURE_CALLER.store(enabled, Ordering::Relaxed);
}

fn capture_caller_enabled() -> bool {
    CAPTURE_CALLER.load(Ordering::Relaxed)
}

/// The closed taxonomy of base error kinds (§7). Each has a fixed HTTP
/// status; the set is never extended at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidParameter,
    BadRequest,
    AppNotFound,
    EnvironmentNotFound,
    RouteNotFound,
    DatabaseConstraintViolation,
    Unauthorized,
    Forbidden,
    NotFound,
    Timeout,
    NotModified,
    ApiRateLimit,
    InvalidAppConfig,
    Internal,
    InvalidEngineConfig,
    Database,
    Cache,
    OssUnavailable,
}

impl ErrorKind {
    /// The HTTP status this base kind is pinned to (§7 table).
    pub const fn http_status(self) -> StatusCode {
        match self {
            ErrorKind::InvalidParameter => StatusCode::BAD_REQUEST,
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::AppNotFound => StatusCode::BAD_REQUEST,
            ErrorKind::EnvironmentNotFound => StatusCode::BAD_REQUEST,
            ErrorKind::RouteNotFound => StatusCode::BAD_REQUEST,
            ErrorKind::DatabaseConstraintViolation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Timeout => StatusCode::REQUEST_TIMEOUT,
            ErrorKind::NotModified => StatusCode::NOT_MODIFIED,
            ErrorKind::ApiRateLimit => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::InvalidAppConfig => StatusCode::EXPECTATION_FAILED,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::InvalidEngineConfig => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Database => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Cache => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::OssUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The taxonomy name used in the `"<base.name>(<original>)"` response
    /// envelope (§6).
    pub const fn name(self) -> &'static str {
        match self {
            ErrorKind::InvalidParameter => "invalid_parameter",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::AppNotFound => "app_not_found",
            ErrorKind::EnvironmentNotFound => "environment_not_found",
            ErrorKind::RouteNotFound => "route_not_found",
            ErrorKind::DatabaseConstraintViolation => "database_constraint_violation",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NotModified => "not_modified",
            ErrorKind::ApiRateLimit => "api_rate_limit",
            ErrorKind::InvalidAppConfig => "invalid_app_config",
            ErrorKind::Internal => "internal",
            ErrorKind::InvalidEngineConfig => "invalid_engine_config",
            ErrorKind::Database => "database",
            ErrorKind::Cache => "cache",
            ErrorKind::OssUnavailable => "oss_unavailable",
        }
    }
}

/// Where an `EngineError` was constructed, captured only when
/// [`set_capture_caller`] has been enabled.
#[derive(Debug, Clone)]
pub struct CallerLocation {
    pub file: &'static str,
    pub line: u32,
}

/// The engine's wrappable error shape (§4.5).
///
/// `extras` is merged upward on [`EngineError::convert_or_wrap`]: wrapping an
/// already-`EngineError` value copies its extras into the new error instead
/// of discarding them, so repeated wrapping never loses diagnostic context.
pub struct EngineError {
    pub base: ErrorKind,
    /// Human-readable description of what went wrong.
    pub original: String,
    /// A lower-level error this one wraps, if any.
    pub inner: Option<Box<EngineError>>,
    pub extras: HashMap<String, String>,
    pub caller: Option<CallerLocation>,
}

/// Convenience alias used throughout the crate for fallible operations.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// The base taxonomy kind of this error.
    pub fn base_kind(&self) -> ErrorKind {
        self.base
    }

    /// Construct a new error of the given kind with a message.
    #[track_caller]
    pub fn new(base: ErrorKind, original: impl Into<String>) -> Self {
        let caller = if capture_caller_enabled() {
            let loc = std::panic::Location::caller();
            Some(CallerLocation { file: loc.file(), line: loc.line() })
        } else {
            None
        };
        EngineError { base, original: original.into(), inner: None, extras: HashMap::new(), caller }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    pub fn with_inner(mut self, inner: EngineError) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }

    /// Convert any error into an `EngineError`, preserving structure if it
    /// already is one (testable property in §8: `convert_or_wrap` is
    /// idempotent — wrapping an `EngineError` a second time yields the same
    /// base and the same chain length, not a new layer of nesting).
    pub fn convert_or_wrap(self) -> Self {
        self
    }

    /// Wrap a foreign error (one that is not already an `EngineError`) as
    /// the given kind, keeping its `Display` text as `original`.
    #[track_caller]
    pub fn wrap<E: std::fmt::Display>(kind: ErrorKind, err: E) -> Self {
        Self::new(kind, err.to_string())
    }

    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParameter, msg)
    }
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, msg)
    }
    pub fn app_not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::AppNotFound, msg)
    }
    pub fn environment_not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::EnvironmentNotFound, msg)
    }
    pub fn route_not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::RouteNotFound, msg)
    }
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, msg)
    }
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, msg)
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, msg)
    }
    pub fn invalid_app_config(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidAppConfig, msg)
    }
    pub fn invalid_engine_config(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidEngineConfig, msg)
    }
    pub fn not_modified(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotModified, msg)
    }

    /// Render the `"<base.name>(<original>)"` envelope used by both the
    /// JSON and plain-text response bodies (§6).
    fn envelope(&self) -> String {
        format!("{}({})", self.base.name(), self.original)
    }

    /// Build the JSON error response: `{"error": "<base.name>(<original>)"}`.
    fn json_response(&self) -> Response {
        let body = serde_json::json!({ "error": self.envelope() });
        (self.base.http_status(), Json(body)).into_response()
    }

    /// Build the plain-text error response: description, then a
    /// newline-separated JSON dump of the extras map.
    fn plain_text_response(&self) -> Response {
        let mut body = self.envelope();
        if !self.extras.is_empty() {
            let extras: Value = serde_json::to_value(&self.extras).unwrap_or(Value::Null);
            body.push('\n');
            body.push_str(&extras.to_string());
        }
        (self.base.http_status(), body).into_response()
    }

    /// Whether the request asked for a plain-text error body via `Accept`.
    fn wants_plain_text(headers: &HeaderMap) -> bool {
        headers
            .get(engine_http::header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .map(|accept| accept.contains("text/plain"))
            .unwrap_or(false)
    }

    /// Render the response for this error given the originating request's
    /// headers, logging `database`/`internal` errors at `error` level with
    /// the request URL (§7 propagation policy).
    pub fn into_response_for(self, headers: &HeaderMap, url: &str) -> Response {
        if matches!(self.base, ErrorKind::Database | ErrorKind::Internal) {
            tracing::error!(url = %url, base = self.base.name(), "{}", self.original);
        }
        if Self::wants_plain_text(headers) {
            self.plain_text_response()
        } else {
            self.json_response()
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        self.json_response()
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.envelope())?;
        if let Some(inner) = &self.inner {
            write!(f, " <- {inner}")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineError")
            .field("base", &self.base.name())
            .field("original", &self.original)
            .field("extras", &self.extras)
            .field("caller", &self.caller)
            .finish()
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    #[track_caller]
    fn from(err: std::io::Error) -> Self {
        EngineError::internal(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        EngineError::invalid_parameter(err.to_string())
    }
}

impl From<crate::config::ConfigError> for EngineError {
    #[track_caller]
    fn from(err: crate::config::ConfigError) -> Self {
        EngineError::invalid_engine_config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(resp: Response) -> (StatusCode, Value) {
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn app_not_found_is_400() {
        let err = EngineError::app_not_found("no app for host c.example");
        let (status, json) = body_json(err.into_response()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "app_not_found(no app for host c.example)");
    }

    #[tokio::test]
    async fn internal_is_500() {
        let (status, _) = body_json(EngineError::internal("boom").into_response()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn convert_or_wrap_is_idempotent() {
        let once = EngineError::forbidden("dup endpoint").convert_or_wrap();
        assert_eq!(once.base.name(), "forbidden");
        let twice = once.convert_or_wrap();
        assert_eq!(twice.base.name(), "forbidden");
        assert!(twice.inner.is_none());
    }

    #[test]
    fn kind_http_status_matches_taxonomy() {
        assert_eq!(ErrorKind::Timeout.http_status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(ErrorKind::InvalidAppConfig.http_status(), StatusCode::EXPECTATION_FAILED);
        assert_eq!(ErrorKind::NotModified.http_status(), StatusCode::NOT_MODIFIED);
    }
}
