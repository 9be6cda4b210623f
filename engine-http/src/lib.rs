//! Thin re-export layer over `axum`/`http`.
//!
//! The rest of the workspace talks only to the types re-exported here; this
//! crate is the sole place that names `axum` directly, so an HTTP-stack swap
//! stays a one-crate change.

pub mod response;
#[cfg(feature = "ws")]
pub mod ws;

pub use axum::extract::ws::Message as WsMessage;
pub use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
pub use axum::{
    body::{to_bytes, Body},
    extract::{Path, Query, State},
    Json, Router,
};
pub use bytes::Bytes;

pub use self::response::{IntoResponse, Response};

/// Method and header constants used throughout the dispatch path.
pub mod header {
    pub use axum::http::header::{
        ACCEPT, CONTENT_TYPE, HOST,
    };
}

/// The inbound request type threaded through the middleware chain.
pub type Request = axum::http::Request<axum::body::Body>;

/// Default request body size limit (100 MiB), overridable per Engine Config.
pub const DEFAULT_BODY_LIMIT: usize = 100 * 1024 * 1024;

pub use axum::serve;

/// Wrap a dispatch closure (the Engine's own `dispatch`) into an
/// `axum::Router` whose sole route is a catch-all fallback. Routing itself
/// happens inside the closure; this just gets a tower `Service` out of it so
/// `axum::serve` can drive a listener.
pub fn fallback_router<F, Fut>(dispatch: F) -> Router
where
    F: Fn(Request) -> Fut + Clone + Send + Sync + 'static,
    Fut: std::future::Future<Output = Response> + Send + 'static,
{
    Router::new().fallback(move |request: Request| {
        let dispatch = dispatch.clone();
        async move { dispatch(request).await }
    })
}
