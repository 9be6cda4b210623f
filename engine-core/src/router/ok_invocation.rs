//! The synthesized handler behind shadow routes (§4.2 "Shadow routes").

use async_trait::async_trait;
use engine_http::{IntoResponse, Response, StatusCode};

use crate::context::Context;
use crate::middleware::RequestHandler;

/// A no-body 200 OK, used as the terminal invocation for synthesized
/// GET→HEAD and middleware-declared shadow routes. The request still
/// traverses the full middleware chain; only the terminal body is empty.
pub struct OkInvocation;

#[async_trait]
impl RequestHandler for OkInvocation {
    async fn call(&self, _ctx: &mut Context) -> Response {
        StatusCode::OK.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn responds_with_empty_ok() {
        let app = std::sync::Arc::new(crate::app_config::AppConfig::new("acme"));
        let request = engine_http::Request::builder()
            .uri("/")
            .body(engine_http::Body::empty())
            .unwrap();
        let mut ctx = Context::new(request, "shadow", app, None, "t1".into(), Vec::new(), std::sync::Arc::new(OkInvocation));
        let response = OkInvocation.call(&mut ctx).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
