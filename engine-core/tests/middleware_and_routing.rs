//! Black-box coverage of middleware ordering and HEAD shadow synthesis
//! against a real `Engine`, complementing the inline unit tests in
//! `src/router/mod.rs` and `src/engine.rs`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use engine_core::prelude::*;
use engine_http::{Body, Method, StatusCode};

struct Ok200;

#[async_trait]
impl RequestHandler for Ok200 {
    async fn call(&self, _ctx: &mut Context) -> Response {
        StatusCode::OK.into_response()
    }
}

/// Appends its tag to `x-chain` and counts invocations, proving both
/// ordering and whether a given route's chain ran at all.
struct TaggingMiddleware {
    tag: &'static str,
    counter: Arc<AtomicUsize>,
}

#[async_trait]
impl Middleware for TaggingMiddleware {
    async fn call(&self, ctx: &mut Context) -> Response {
        self.counter.fetch_add(1, Ordering::SeqCst);
        let mut response = ctx.next().await;
        let existing = response.headers().get("x-chain").and_then(|v| v.to_str().ok()).unwrap_or("").to_string();
        let combined = if existing.is_empty() { self.tag.to_string() } else { format!("{existing},{}", self.tag) };
        response.headers_mut().insert("x-chain", combined.parse().unwrap());
        response
    }
}

/// Short-circuits before calling `next()`, so nothing downstream ever runs.
struct RejectingMiddleware {
    counter: Arc<AtomicUsize>,
}

#[async_trait]
impl Middleware for RejectingMiddleware {
    async fn call(&self, _ctx: &mut Context) -> Response {
        self.counter.fetch_add(1, Ordering::SeqCst);
        EngineError::forbidden("rejected before reaching the endpoint").into_response()
    }
}

struct Registrar {
    outer_counter: Arc<AtomicUsize>,
    inner_counter: Arc<AtomicUsize>,
    reject_counter: Arc<AtomicUsize>,
    param_counter: Arc<AtomicUsize>,
}

impl RouteRegistrar for Registrar {
    fn endpoints(&self, _app_id: &str, _config: &AppConfigSet) -> EngineResult<Vec<Endpoint>> {
        Ok(vec![
            Endpoint {
                name: "ordered".to_string(),
                routes: vec![Route::compile(Method::GET, &["ordered"]).unwrap()],
                invocation: Invocation::Request(Arc::new(Ok200)),
                middlewares: vec![
                    Arc::new(TaggingMiddleware { tag: "outer", counter: self.outer_counter.clone() }),
                    Arc::new(TaggingMiddleware { tag: "inner", counter: self.inner_counter.clone() }),
                ],
            },
            Endpoint {
                name: "guarded".to_string(),
                routes: vec![Route::compile(Method::GET, &["guarded"]).unwrap()],
                invocation: Invocation::Request(Arc::new(Ok200)),
                middlewares: vec![Arc::new(RejectingMiddleware { counter: self.reject_counter.clone() })],
            },
            Endpoint {
                name: "user".to_string(),
                routes: vec![Route::compile(Method::GET, &["users", ":id"]).unwrap()],
                invocation: Invocation::Request(Arc::new(Ok200)),
                middlewares: vec![Arc::new(TaggingMiddleware { tag: "user", counter: self.param_counter.clone() })],
            },
        ])
    }
}

async fn build_engine(registrar: Registrar) -> Engine {
    let updater = Arc::new(ClosureUpdater::new(|_input| async {
        let mut result = UpdateResult::default();
        let app = AppConfig::new("acme").with_host(AppHost::routed("acme.example"));
        result.updated_app_configs.insert("acme".to_string(), AppConfigSet::new(app));
        result.updated_apps.insert("acme".to_string(), chrono::Utc::now());
        Ok(result)
    }));

    let config = EngineConfig {
        service_name: "test".to_string(),
        working_dir: ".".to_string(),
        debug_features: Default::default(),
        include_app_ids: Vec::new(),
        server: ServerConfig { host: "0.0.0.0".into(), port: 0, shutdown_timeout_secs: 0, reuse_address: true },
        app_source: AppSource::LocalFs { directory: "/unused".into() },
        apps_pull_interval_secs: 30,
        timezone: "UTC".into(),
        logger_sinks: Vec::new(),
        metric_endpoint: None,
    };

    let engine = Engine::new(&config, updater, Arc::new(ModuleChain::new()), Arc::new(registrar), false);
    engine.update().await.unwrap();
    engine
}

fn request(method: Method, path: &str) -> engine_http::Request {
    engine_http::Request::builder().method(method).uri(path).header("host", "acme.example").body(Body::empty()).unwrap()
}

#[tokio::test]
async fn middlewares_run_in_declared_order_and_both_see_the_request() {
    let outer_counter = Arc::new(AtomicUsize::new(0));
    let inner_counter = Arc::new(AtomicUsize::new(0));
    let engine = build_engine(Registrar {
        outer_counter: outer_counter.clone(),
        inner_counter: inner_counter.clone(),
        reject_counter: Arc::new(AtomicUsize::new(0)),
        param_counter: Arc::new(AtomicUsize::new(0)),
    })
    .await;

    let response = engine.dispatch(request(Method::GET, "/ordered")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-chain").unwrap(), "outer,inner");
    assert_eq!(outer_counter.load(Ordering::SeqCst), 1);
    assert_eq!(inner_counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn a_middleware_that_short_circuits_never_reaches_the_endpoint() {
    let reject_counter = Arc::new(AtomicUsize::new(0));
    let engine = build_engine(Registrar {
        outer_counter: Arc::new(AtomicUsize::new(0)),
        inner_counter: Arc::new(AtomicUsize::new(0)),
        reject_counter: reject_counter.clone(),
        param_counter: Arc::new(AtomicUsize::new(0)),
    })
    .await;

    let response = engine.dispatch(request(Method::GET, "/guarded")).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(reject_counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn head_on_a_param_path_falls_back_to_get_and_still_runs_its_middleware() {
    let param_counter = Arc::new(AtomicUsize::new(0));
    let engine = build_engine(Registrar {
        outer_counter: Arc::new(AtomicUsize::new(0)),
        inner_counter: Arc::new(AtomicUsize::new(0)),
        reject_counter: Arc::new(AtomicUsize::new(0)),
        param_counter: param_counter.clone(),
    })
    .await;

    // No shadow HEAD route exists for a param path, so this falls back to
    // the GET terminal, running its middleware chain in full.
    let response = engine.dispatch(request(Method::HEAD, "/users/42")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(param_counter.load(Ordering::SeqCst), 1);

    let (_, body) = response.into_parts();
    let bytes = engine_http::to_bytes(body, engine_http::DEFAULT_BODY_LIMIT).await.unwrap();
    assert!(bytes.is_empty(), "HEAD response body must be discarded");
}

#[tokio::test]
async fn head_on_an_all_literal_get_path_hits_the_synthesized_shadow_and_skips_its_middleware() {
    let outer_counter = Arc::new(AtomicUsize::new(0));
    let inner_counter = Arc::new(AtomicUsize::new(0));
    let engine = build_engine(Registrar {
        outer_counter: outer_counter.clone(),
        inner_counter: inner_counter.clone(),
        reject_counter: Arc::new(AtomicUsize::new(0)),
        param_counter: Arc::new(AtomicUsize::new(0)),
    })
    .await;

    // `/ordered` is an all-literal GET path, so a HEAD terminal was
    // synthesized at registration time and never reaches the endpoint's
    // own middlewares.
    let response = engine.dispatch(request(Method::HEAD, "/ordered")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(outer_counter.load(Ordering::SeqCst), 0);
    assert_eq!(inner_counter.load(Ordering::SeqCst), 0);
}
