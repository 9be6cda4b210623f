//! Routing: trie storage, route compilation, and dispatch (§3, §4.2).

mod ok_invocation;
mod path_params;
mod trie;

pub use path_params::PathParams;
pub use trie::{CachedRoute, Component, Endpoint, Matched, Route, Router};

use engine_http::{Body, IntoResponse, Method, Response};

use crate::app_config::AppConfig;
use crate::context::{Context, RequestProcessor};
use crate::error::EngineError;
use crate::middleware::Invocation;
use std::sync::Arc;

/// Resolve a method+path against `router`, returning `route_not_found` when
/// nothing matches (§3 invariant: unmatched requests never fall through
/// silently).
pub fn resolve<'a>(router: &'a Router, method: &Method, path: &str) -> Result<Matched<'a>, EngineError> {
    router
        .find(method, path)
        .ok_or_else(|| EngineError::route_not_found(format!("no route for {method} {path}")))
}

/// Build the `Context` for a matched route and drive it to a response,
/// applying HEAD→GET body discarding when the match came from the
/// HEAD→GET fallback rather than a synthesized HEAD shadow route (§4.2), and
/// running the app's `RequestProcessor` (if any and not bypassed) around the
/// middleware chain (§4.3 "Body pre/post-processing").
pub async fn dispatch(
    matched: Matched<'_>,
    request: engine_http::Request,
    app: Arc<AppConfig>,
    environment: Option<String>,
    trace_id: String,
    processor: Option<Arc<dyn RequestProcessor>>,
    bypass_body_processing: bool,
) -> Response {
    let is_head_fallback = matched.via_head_fallback;
    let processor = processor.filter(|_| !bypass_body_processing);

    let handler = match &matched.route.invocation {
        Invocation::Request(handler) => handler.clone(),
        Invocation::WebSocket(handler) => {
            return dispatch_websocket(&matched, request, app, environment, trace_id, handler.clone()).await;
        }
    };

    let request = match preprocess_body(request, processor.as_deref()).await {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };

    let mut ctx = Context::new(
        request,
        matched.route.endpoint_name.to_string(),
        app,
        environment,
        trace_id,
        matched.route.middlewares.clone(),
        handler,
    );

    let response = ctx.next().await;

    let response = match postprocess_response(response, processor.as_deref()).await {
        Ok(response) => response,
        Err(err) => return err.into_response(),
    };

    if is_head_fallback {
        let (parts, _) = response.into_parts();
        return Response::from_parts(parts, Body::empty());
    }
    response
}

async fn preprocess_body(
    request: engine_http::Request,
    processor: Option<&dyn RequestProcessor>,
) -> Result<engine_http::Request, EngineError> {
    let Some(processor) = processor else {
        return Ok(request);
    };

    let (parts, body) = request.into_parts();
    let bytes = engine_http::to_bytes(body, engine_http::DEFAULT_BODY_LIMIT)
        .await
        .map_err(|err| EngineError::bad_request(format!("failed to buffer request body: {err}")))?;
    let processed = processor.process_request(bytes.to_vec()).await?;
    Ok(engine_http::Request::from_parts(parts, Body::from(processed)))
}

async fn postprocess_response(response: Response, processor: Option<&dyn RequestProcessor>) -> Result<Response, EngineError> {
    match processor {
        Some(processor) => processor.process_response(response).await,
        None => Ok(response),
    }
}

/// WebSocket path (§4.3 "WebSocket path"): extract the upgrade, run the
/// route's middleware chain against a sentinel endpoint, then either
/// install the lifecycle loop or reject the freshly-upgraded socket
/// depending on whether the chain short-circuited with an error response.
#[cfg(feature = "ws")]
async fn dispatch_websocket(
    matched: &Matched<'_>,
    request: engine_http::Request,
    app: Arc<AppConfig>,
    environment: Option<String>,
    trace_id: String,
    handler: Arc<dyn crate::middleware::WebSocketHandler>,
) -> Response {
    let (parts, body) = request.into_parts();
    let mut ctx_request_builder = engine_http::Request::builder().method(parts.method.clone()).uri(parts.uri.clone()).version(parts.version);
    for (name, value) in parts.headers.iter() {
        ctx_request_builder = ctx_request_builder.header(name, value);
    }
    let ctx_request = match ctx_request_builder.body(Body::empty()) {
        Ok(request) => request,
        Err(err) => return EngineError::bad_request(format!("malformed websocket handshake request: {err}")).into_response(),
    };
    let upgrade_request = engine_http::Request::from_parts(parts, body);

    let upgrade = match engine_http::ws::try_upgrade(upgrade_request).await {
        Ok(upgrade) => upgrade,
        Err(response) => return response,
    };

    let mut ctx = Context::new(
        ctx_request,
        matched.route.endpoint_name.to_string(),
        app,
        environment,
        trace_id,
        matched.route.middlewares.clone(),
        Arc::new(ok_invocation::OkInvocation),
    );

    let chain_result = ctx.next().await;
    if chain_result.status().is_client_error() || chain_result.status().is_server_error() {
        let error = EngineError::forbidden(format!("websocket middleware rejected the connection (status {})", chain_result.status()));
        return upgrade.on_upgrade(move |socket| async move {
            crate::ws::reject(socket, error).await;
        });
    }

    upgrade.on_upgrade(move |socket| async move {
        crate::ws::run(socket, ctx, handler).await;
    })
}

#[cfg(not(feature = "ws"))]
async fn dispatch_websocket(
    _matched: &Matched<'_>,
    _request: engine_http::Request,
    _app: Arc<AppConfig>,
    _environment: Option<String>,
    _trace_id: String,
    _handler: Arc<dyn crate::middleware::WebSocketHandler>,
) -> Response {
    EngineError::internal("websocket support is not compiled into this build (enable the `ws` feature)").into_response()
}
