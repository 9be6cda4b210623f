//! Per-app CORS middleware (§6 "CORS").

use async_trait::async_trait;
use engine_http::{HeaderValue, IntoResponse, Method, Response, StatusCode};

use crate::app_config::{AllowedOrigin, CorsOptions};
use crate::context::Context;
use crate::middleware::Middleware;

/// Installed on an app's middleware chain whenever `AppConfig::cors_options`
/// is present and `enabled` (§6). Honors `allowed_origin`, `allowed_methods`,
/// `allowed_headers`, `allow_credentials`, `cache_expiration`,
/// `exposed_headers`.
pub struct CorsMiddleware {
    options: CorsOptions,
}

impl CorsMiddleware {
    pub fn new(options: CorsOptions) -> Self {
        Self { options }
    }

    fn allow_origin_header(&self, request_origin: Option<&str>) -> Option<String> {
        match &self.options.allowed_origin {
            AllowedOrigin::All => Some("*".to_string()),
            AllowedOrigin::None => None,
            AllowedOrigin::OriginBased => request_origin.map(|o| o.to_string()),
            AllowedOrigin::Any(list) => request_origin.filter(|o| list.iter().any(|allowed| allowed == o)).map(|o| o.to_string()),
            AllowedOrigin::Custom(value) => Some(value.clone()),
        }
    }

    /// OPTIONS preflight is synthesized as a shadow route (§4.2): an app
    /// with CORS enabled gets an OPTIONS terminal for every registered path.
    fn preflight_response(&self, request_origin: Option<&str>) -> Response {
        let mut response = StatusCode::NO_CONTENT.into_response();
        self.apply_headers(&mut response, request_origin);
        if let Ok(value) = HeaderValue::from_str(&self.options.allowed_methods.join(", ")) {
            response.headers_mut().insert("access-control-allow-methods", value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.options.allowed_headers.join(", ")) {
            response.headers_mut().insert("access-control-allow-headers", value);
        }
        if let Some(seconds) = self.options.cache_expiration {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert("access-control-max-age", value);
            }
        }
        response
    }

    fn apply_headers(&self, response: &mut Response, request_origin: Option<&str>) {
        if let Some(origin) = self.allow_origin_header(request_origin) {
            if let Ok(value) = HeaderValue::from_str(&origin) {
                response.headers_mut().insert("access-control-allow-origin", value);
            }
        }
        if self.options.allow_credentials {
            response.headers_mut().insert("access-control-allow-credentials", HeaderValue::from_static("true"));
        }
        if !self.options.exposed_headers.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&self.options.exposed_headers.join(", ")) {
                response.headers_mut().insert("access-control-expose-headers", value);
            }
        }
    }
}

#[async_trait]
impl Middleware for CorsMiddleware {
    async fn call(&self, ctx: &mut Context) -> Response {
        let origin = ctx
            .request
            .headers()
            .get("origin")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        if ctx.request.method() == Method::OPTIONS {
            return self.preflight_response(origin.as_deref());
        }

        let mut response = ctx.next().await;
        self.apply_headers(&mut response, origin.as_deref());
        response
    }

    fn shadow_route_methods(&self) -> Vec<Method> {
        vec![Method::OPTIONS]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::AppConfig;
    use crate::middleware::RequestHandler;
    use engine_http::{Body, Request};
    use std::sync::Arc;

    struct Ok200;

    #[async_trait]
    impl RequestHandler for Ok200 {
        async fn call(&self, _ctx: &mut Context) -> Response {
            StatusCode::OK.into_response()
        }
    }

    fn ctx_for(request: Request, cors: Arc<dyn Middleware>) -> Context {
        let app = Arc::new(AppConfig::new("acme"));
        Context::new(request, "ep", app, None, "t1".into(), vec![cors], Arc::new(Ok200))
    }

    #[tokio::test]
    async fn origin_based_echoes_request_origin() {
        let cors = Arc::new(CorsMiddleware::new(CorsOptions { enabled: true, ..CorsOptions::default() }));
        let request = Request::builder().method(Method::GET).uri("/").header("origin", "https://a.com").body(Body::empty()).unwrap();
        let mut ctx = ctx_for(request, cors);
        let response = ctx.next().await;
        assert_eq!(response.headers().get("access-control-allow-origin").unwrap(), "https://a.com");
    }

    #[tokio::test]
    async fn any_list_rejects_origin_not_in_list() {
        let cors = Arc::new(CorsMiddleware::new(CorsOptions {
            enabled: true,
            allowed_origin: AllowedOrigin::Any(vec!["https://a.com".to_string()]),
            ..CorsOptions::default()
        }));
        let request = Request::builder().method(Method::GET).uri("/").header("origin", "https://evil.com").body(Body::empty()).unwrap();
        let mut ctx = ctx_for(request, cors);
        let response = ctx.next().await;
        assert!(response.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn options_request_short_circuits_as_preflight() {
        let cors = Arc::new(CorsMiddleware::new(CorsOptions { enabled: true, ..CorsOptions::default() }));
        let request = Request::builder().method(Method::OPTIONS).uri("/").body(Body::empty()).unwrap();
        let mut ctx = ctx_for(request, cors);
        let response = ctx.next().await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
