//! Request Context & Dispatch (§2 component G, §4.3).
//!
//! Unlike the teacher's `Interceptor<R, S>::around(ctx, next)` — where each
//! interceptor wraps the next as a nested call — dispatch here is driven by
//! a cooperative cursor the context itself owns (§9 "Coroutine flow"). A
//! middleware calls [`Context::next`] instead of invoking a continuation
//! closure, which keeps the call stack flat regardless of chain length.

use std::sync::Arc;

use engine_http::{HeaderMap, Response};

use crate::app_config::AppConfig;
use crate::error::{EngineError, EngineResult};
use crate::typed_store::TypedStore;

/// A request body processor, installed at most once per app (§4.3).
#[async_trait::async_trait]
pub trait RequestProcessor: Send + Sync {
    async fn prepare(&self, _app: &AppConfig) -> EngineResult<()> {
        Ok(())
    }

    /// Transform the raw request body. The result replaces the cached body
    /// so subsequent reads within the same request are cheap.
    async fn process_request(&self, body: Vec<u8>) -> EngineResult<Vec<u8>> {
        Ok(body)
    }

    async fn process_response(&self, response: Response) -> EngineResult<Response> {
        Ok(response)
    }
}

/// Content-type-aware body decode contract (§4.3 "Decode contract").
pub trait Decode: Sized {
    fn decode(content_type: Option<&str>, body: &[u8]) -> EngineResult<Self>;
}

impl<T: serde::de::DeserializeOwned> Decode for T {
    fn decode(content_type: Option<&str>, body: &[u8]) -> EngineResult<Self> {
        let content_type = content_type.ok_or_else(|| EngineError::bad_request("missing content-type"))?;
        if body.is_empty() {
            return Err(EngineError::bad_request("missing request body"));
        }
        if !content_type.starts_with("application/json") {
            return Err(EngineError::bad_request(format!("unsupported content-type: {content_type}")));
        }
        serde_json::from_slice(body).map_err(|e| EngineError::invalid_parameter(e.to_string()))
    }
}

/// The per-request dispatch context threaded through every middleware and
/// endpoint invocation (§2 component G, §4.3).
pub struct Context {
    pub request: engine_http::Request,
    pub endpoint_name: String,
    pub app: Arc<AppConfig>,
    pub environment: Option<String>,
    /// `<appID>.request.<traceID>`; `traceID` is a freshly-generated
    /// Snowflake rendered base-36.
    pub logger_label: String,
    pub trace_id: String,
    /// Now, adjusted by the app's `time_offset_secs` (§4.3).
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub user_id: Option<String>,
    pub store: TypedStore,

    middlewares: Vec<Arc<dyn super::middleware::Middleware>>,
    endpoint: Arc<dyn super::middleware::RequestHandler>,
    cursor: i64,
    last_response: Option<Response>,
}

impl Context {
    pub fn new(
        request: engine_http::Request,
        endpoint_name: impl Into<String>,
        app: Arc<AppConfig>,
        environment: Option<String>,
        trace_id: String,
        middlewares: Vec<Arc<dyn super::middleware::Middleware>>,
        endpoint: Arc<dyn super::middleware::RequestHandler>,
    ) -> Self {
        let app_id = app.app_id.clone();
        let start_time = chrono::Utc::now() + chrono::Duration::seconds(app.time_offset_secs);
        Self {
            request,
            endpoint_name: endpoint_name.into(),
            app,
            environment,
            logger_label: format!("{app_id}.request.{trace_id}"),
            trace_id,
            start_time,
            user_id: None,
            store: TypedStore::new(),
            middlewares,
            endpoint,
            cursor: -1,
            last_response: None,
        }
    }

    /// Advance the cursor and invoke the next link in the chain (§4.3
    /// "Middleware cursor"). Each middleware must call this exactly once.
    ///
    /// Calling `next()` a second time within the same middleware is a
    /// programming error (§9 Open Questions decision): in debug builds this
    /// panics with a descriptive message; in release builds it clamps,
    /// returning the previously recorded response as a no-op.
    pub async fn next(&mut self) -> Response {
        self.cursor += 1;
        let i = self.cursor;
        let count = self.middlewares.len() as i64;

        if i > count {
            if cfg!(debug_assertions) {
                panic!("Context::next called more than once past the end of the middleware chain (endpoint `{}`)", self.endpoint_name);
            }
            return self.last_response.clone().unwrap_or_else(|| {
                EngineError::internal("next() called with no recorded response").into_response_for(&HeaderMap::new(), "")
            });
        }

        let response = if i < count {
            let middleware = self.middlewares[i as usize].clone();
            middleware.call(self).await
        } else {
            self.endpoint.clone().call(self).await
        };

        self.last_response = Some(clone_response_for_recording(&response));
        response
    }

    pub fn is_done(&self) -> bool {
        self.cursor >= self.middlewares.len() as i64
    }
}

/// `Response` bodies aren't `Clone`; we only need the status/headers for the
/// clamped double-`next()` fallback, so record a lightweight echo rather than
/// attempting a true clone.
fn clone_response_for_recording(response: &Response) -> Response {
    use engine_http::IntoResponse;
    response.status().into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{Middleware, RequestHandler};
    use async_trait::async_trait;
    use engine_http::{Body, IntoResponse, StatusCode};

    struct Echo;

    #[async_trait]
    impl RequestHandler for Echo {
        async fn call(&self, _ctx: &mut Context) -> Response {
            StatusCode::OK.into_response()
        }
    }

    struct PassThrough;

    #[async_trait]
    impl Middleware for PassThrough {
        async fn call(&self, ctx: &mut Context) -> Response {
            ctx.next().await
        }
    }

    fn fixture_request() -> engine_http::Request {
        engine_http::Request::builder().uri("/").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn next_reaches_endpoint_after_all_middlewares() {
        let app = Arc::new(AppConfig::new("acme"));
        let middlewares: Vec<Arc<dyn Middleware>> = vec![Arc::new(PassThrough), Arc::new(PassThrough)];
        let mut ctx = Context::new(fixture_request(), "hello", app, None, "abc".into(), middlewares, Arc::new(Echo));

        let response = ctx.next().await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(ctx.is_done());
    }

    #[tokio::test]
    async fn logger_label_embeds_app_and_trace_id() {
        let app = Arc::new(AppConfig::new("acme"));
        let ctx = Context::new(fixture_request(), "hello", app, None, "xyz".into(), Vec::new(), Arc::new(Echo));
        assert_eq!(ctx.logger_label, "acme.request.xyz");
    }

    #[tokio::test]
    async fn start_time_is_adjusted_by_the_app_time_offset() {
        let app = Arc::new(AppConfig { time_offset_secs: 3600, ..AppConfig::new("acme") });
        let before = chrono::Utc::now() + chrono::Duration::seconds(3600);
        let ctx = Context::new(fixture_request(), "hello", app, None, "xyz".into(), Vec::new(), Arc::new(Echo));
        let after = chrono::Utc::now() + chrono::Duration::seconds(3600);

        assert!(ctx.start_time >= before && ctx.start_time <= after);
    }
}
