//! Middleware & endpoint invocation (§2 component F, §4.2, §4.3, §9).
//!
//! `Invocation` is the tagged union the spec calls for in place of the
//! source's separate "outputer"/"invocation" class hierarchy (§9 "Inheritance
//! elimination"): an endpoint is either a plain request handler or a
//! WebSocket handler, and [`crate::context::Context`] dispatches on the tag.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use engine_http::Response;

use crate::context::Context;

/// A single link in an endpoint's middleware chain.
///
/// Grounded in the teacher's `Interceptor<R, S>` (`r2e-core::interceptors`),
/// but `call` drives the chain via [`Context::next`] rather than a passed-in
/// continuation closure (§9 "Coroutine flow").
#[async_trait]
#[diagnostic::on_unimplemented(
    message = "`{Self}` does not implement `Middleware`",
    label = "this type cannot be installed on a route",
    note = "implement `async fn call(&self, ctx: &mut Context) -> Response` and call `ctx.next().await` exactly once"
)]
pub trait Middleware: Send + Sync {
    async fn call(&self, ctx: &mut Context) -> Response;

    /// Extra HTTP methods this middleware wants synthesized as shadow
    /// routes wherever it is installed (§4.2 "Shadow routes").
    fn shadow_route_methods(&self) -> Vec<engine_http::Method> {
        Vec::new()
    }

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// A plain HTTP endpoint invocation.
#[async_trait]
#[diagnostic::on_unimplemented(
    message = "`{Self}` does not implement `RequestHandler`",
    label = "this type cannot be used as an endpoint invocation",
    note = "implement `async fn call(&self, ctx: &mut Context) -> Response`"
)]
pub trait RequestHandler: Send + Sync {
    async fn call(&self, ctx: &mut Context) -> Response;
}

/// A WebSocket endpoint invocation (§4.3 "WebSocket path").
///
/// The framework owns the message loop; each lifecycle event dispatches to
/// one of these callbacks with the request [`Context`]. Every method has a
/// no-op default except the ones an endpoint actually cares about.
#[async_trait]
#[allow(unused_variables)]
pub trait WebSocketHandler: Send + Sync {
    async fn on_text(&self, ctx: &mut Context, text: String) {}
    async fn on_binary(&self, ctx: &mut Context, data: Vec<u8>) {}
    async fn on_ping(&self, ctx: &mut Context, payload: Vec<u8>) {}
    async fn on_pong(&self, ctx: &mut Context, payload: Vec<u8>) {}
    async fn on_close(&self, ctx: &mut Context) {}
}

/// The tagged union an [`crate::router::Endpoint`] carries (§3 "Route" /
/// §9 "Inheritance elimination").
#[derive(Clone)]
pub enum Invocation {
    Request(std::sync::Arc<dyn RequestHandler>),
    WebSocket(std::sync::Arc<dyn WebSocketHandler>),
}

impl Invocation {
    pub fn is_websocket(&self) -> bool {
        matches!(self, Invocation::WebSocket(_))
    }
}

/// A boxed future shorthand used where `async_trait`'s expansion would be
/// overkill (closure-based handlers, e.g. in tests and the `ClosureUpdater`
/// sibling pattern).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
