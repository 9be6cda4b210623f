//! End-to-end hot reload: editing an app's `config.json` on disk and
//! re-running `Engine::update` picks up the change without a restart
//! (§4.1, §4.7).

use std::sync::Arc;
use std::time::Duration;

use engine_core::prelude::*;
use engine_http::{Body, Method, StatusCode};

struct Ok200;

#[async_trait::async_trait]
impl RequestHandler for Ok200 {
    async fn call(&self, _ctx: &mut Context) -> Response {
        StatusCode::OK.into_response()
    }
}

struct SingleEndpointRegistrar;

impl RouteRegistrar for SingleEndpointRegistrar {
    fn endpoints(&self, _app_id: &str, _config: &AppConfigSet) -> EngineResult<Vec<Endpoint>> {
        Ok(vec![Endpoint {
            name: "ping".to_string(),
            routes: vec![Route::compile(Method::GET, &["ping"]).unwrap()],
            invocation: Invocation::Request(Arc::new(Ok200)),
            middlewares: Vec::new(),
        }])
    }
}

fn write_config(root: &std::path::Path, app_id: &str, host: &str) {
    let app_dir = root.join(app_id);
    std::fs::create_dir_all(&app_dir).unwrap();
    let json = format!(r#"{{"app_id": "{app_id}", "hosts": ["{host}"]}}"#);
    std::fs::write(app_dir.join("config.json"), json).unwrap();
}

fn test_config(working_dir: &str) -> EngineConfig {
    EngineConfig {
        service_name: "test".to_string(),
        working_dir: working_dir.to_string(),
        debug_features: Default::default(),
        include_app_ids: Vec::new(),
        server: ServerConfig { host: "0.0.0.0".into(), port: 0, shutdown_timeout_secs: 0, reuse_address: true },
        app_source: AppSource::LocalFs { directory: "/unused".into() },
        apps_pull_interval_secs: 30,
        timezone: "UTC".into(),
        logger_sinks: Vec::new(),
        metric_endpoint: None,
    }
}

#[tokio::test]
async fn editing_config_json_and_re_running_update_moves_the_host_binding() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), "acme", "old.example");

    let updater = Arc::new(LocalFsUpdater::new());
    let config = test_config(&dir.path().to_string_lossy());
    let engine = Engine::new(&config, updater, Arc::new(ModuleChain::new()), Arc::new(SingleEndpointRegistrar), false);
    engine.update().await.unwrap();

    let request = |host: &str| engine_http::Request::builder().uri("/ping").header("host", host).body(Body::empty()).unwrap();

    assert_eq!(engine.dispatch(request("old.example")).await.status(), StatusCode::OK);
    assert_eq!(engine.dispatch(request("new.example")).await.status(), StatusCode::BAD_REQUEST);

    // mtime-based change detection needs a visible mtime delta on coarse
    // filesystem clocks.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    write_config(dir.path(), "acme", "new.example");
    engine.update().await.unwrap();

    assert_eq!(engine.dispatch(request("new.example")).await.status(), StatusCode::OK);
    assert_eq!(engine.dispatch(request("old.example")).await.status(), StatusCode::BAD_REQUEST);
}
