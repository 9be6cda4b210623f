//! The Engine (§2, §9 "Ownership / cycles", "Global state").
//!
//! Owns the Resource Groups, the App Config Provider, and the live `apps`
//! map (a whole-map-swap behind the provider's own lock — `Engine` just
//! reads through it). Initializes the two process-wide knobs exactly once:
//! the error caller-capture flag and the logging bootstrap.

use std::sync::Arc;

use engine_http::{IntoResponse, Response};

use crate::app_config::AppConfigSet;
use crate::app_config_provider::{AppBuilder, AppConfigProvider, PreparedApp};
use crate::context::RequestProcessor;
use crate::detector::{AppDetector, DetectorRequest, HostAppDetector};
use crate::engine_config::EngineConfig;
use crate::error::{self, EngineError, EngineResult};
use crate::hooks::ModuleChain;
use crate::middleware::Middleware;
use crate::resource_group::ResourceGroups;
use crate::router::{self, Endpoint, Router};
use crate::service_register::ServiceRegister;
use crate::updater::ConfigUpdater;

/// Request header that, together with the `engine_ignoreBodyProcess` Engine
/// Config debug feature, skips the app's [`RequestProcessor`] for a single
/// request (§6 "Debug features": "A debug feature bit + a special header
/// may bypass body processing on that request").
pub const BYPASS_PROCESSING_HEADER: &str = "x-engine-bypass-processing";

/// Host override header honored only when the `engine_extractDebugHost`
/// debug feature is enabled (§6 "Debug features").
pub const DEBUG_HOST_HEADER: &str = "x-debug-host";

/// A live app: its compiled router, app-wide middlewares, config set, and
/// optional request/response body processor.
pub struct App {
    pub router: Router,
    pub middlewares: Vec<Arc<dyn Middleware>>,
    pub config: AppConfigSet,
    pub processor: Option<Arc<dyn RequestProcessor>>,
}

/// Registers an app's endpoints; supplied by the host application, since
/// endpoint declarations are programmatic and not part of `config.json`
/// (§4.1 step 2: "construct the App ... prepare router/middleware").
pub trait RouteRegistrar: Send + Sync {
    fn endpoints(&self, app_id: &str, config: &AppConfigSet) -> EngineResult<Vec<Endpoint>>;

    /// App-wide middlewares installed ahead of every endpoint's own chain,
    /// in declared order.
    fn global_middlewares(&self, _app_id: &str, _config: &AppConfigSet) -> Vec<Arc<dyn Middleware>> {
        Vec::new()
    }

    /// Optional per-app request/response body processor (§4.3 "Body
    /// pre/post-processing"). At most one per app.
    fn request_processor(&self, _app_id: &str, _config: &AppConfigSet) -> Option<Arc<dyn RequestProcessor>> {
        None
    }
}

struct EngineAppBuilder {
    registrar: Arc<dyn RouteRegistrar>,
}

#[async_trait::async_trait]
impl AppBuilder for EngineAppBuilder {
    async fn build(&self, app_id: &str, config: AppConfigSet, update_time: chrono::DateTime<chrono::Utc>) -> EngineResult<PreparedApp> {
        let mut middlewares = self.registrar.global_middlewares(app_id, &config);
        if let Some(cors) = config.main.cors_options.clone().filter(|c| c.enabled) {
            middlewares.push(Arc::new(crate::cors::CorsMiddleware::new(cors)));
        }

        let mut compiled = Router::new();
        for endpoint in self.registrar.endpoints(app_id, &config)? {
            let mut endpoint = endpoint;
            let mut full = middlewares.clone();
            full.extend(endpoint.middlewares.drain(..));
            endpoint.middlewares = full;
            compiled.register_endpoint(&endpoint)?;
        }

        let processor = self.registrar.request_processor(app_id, &config);
        if let Some(processor) = &processor {
            processor.prepare(&config.main).await?;
        }

        let app = App { router: compiled, middlewares, config, processor };
        Ok(PreparedApp { app_id: app_id.to_string(), config: app.config.clone(), update_time, payload: Box::new(app) })
    }
}

/// Top-level dispatcher: app detection, route resolution, and Context
/// construction/invocation (§4.1–§4.3).
pub struct Engine {
    pub resource_groups: ResourceGroups,
    pub service_register: Option<ServiceRegister>,
    pub detector: Arc<HostAppDetector>,
    provider: Arc<AppConfigProvider>,
    builder: EngineAppBuilder,
    bypass_processing_enabled: bool,
    extract_debug_host_enabled: bool,
    _logging_guard: crate::logging::LoggingGuard,
}

impl Engine {
    /// Construct the Engine, setting the two process-wide knobs exactly
    /// once (§9 "Global state").
    pub fn new(
        config: &EngineConfig,
        updater: Arc<dyn ConfigUpdater>,
        modules: Arc<ModuleChain>,
        registrar: Arc<dyn RouteRegistrar>,
        capture_caller: bool,
    ) -> Self {
        let verbose = crate::logging::VerboseFlags::from_env();
        error::set_capture_caller(capture_caller || verbose.error_caller);
        let logging_guard = crate::logging::init(&config.logger_sinks, verbose);

        let root = match &config.app_source {
            crate::engine_config::AppSource::LocalFs { directory } => directory.clone(),
            crate::engine_config::AppSource::ZippedObjectStorage { .. } => config.working_dir.clone(),
        };

        Self {
            resource_groups: ResourceGroups::new(),
            service_register: None,
            detector: Arc::new(HostAppDetector::new()),
            provider: Arc::new(AppConfigProvider::new(
                updater,
                modules,
                root,
                config.working_dir.clone(),
                config.include_app_ids.clone(),
            )),
            builder: EngineAppBuilder { registrar },
            bypass_processing_enabled: config.debug_feature("engine_ignoreBodyProcess"),
            extract_debug_host_enabled: config.debug_feature("engine_extractDebugHost"),
            _logging_guard: logging_guard,
        }
    }

    /// Run one update cycle and republish the detector's host index (§4.1
    /// step 5: "notify listeners").
    pub async fn update(&self) -> EngineResult<()> {
        self.provider.run_update(&self.builder).await?;
        let apps = self.provider.apps();
        let hosts: Vec<(String, Vec<crate::app_config::AppHost>)> =
            apps.values().map(|app| (app.app_id.clone(), app.config.main.hosts.clone())).collect();
        self.detector.rebuild(hosts.iter().map(|(id, hosts)| (id.as_str(), hosts.as_slice())));
        Ok(())
    }

    fn apps(&self) -> Arc<std::collections::HashMap<String, Arc<PreparedApp>>> {
        self.provider.apps()
    }

    /// Dispatch a single request end to end (§4.1 "A request reads the
    /// `apps` map at dispatch time; the map reference is immutable for the
    /// duration of that request").
    pub async fn dispatch(&self, request: engine_http::Request) -> Response {
        let apps = self.apps();

        let debug_host = if self.extract_debug_host_enabled {
            request.headers().get(DEBUG_HOST_HEADER).and_then(|v| v.to_str().ok())
        } else {
            None
        };
        let host = debug_host.or_else(|| request.headers().get(engine_http::header::HOST).and_then(|v| v.to_str().ok()));
        let path = request.uri().path().to_string();
        let detected = match self.detector.detect(&DetectorRequest { host, path: &path }) {
            Some(detected) => detected,
            None => return EngineError::app_not_found(format!("no app bound to host {host:?}")).into_response(),
        };

        let Some(prepared) = apps.get(&detected.app_id) else {
            return EngineError::app_not_found(format!("app `{}` not currently live", detected.app_id)).into_response();
        };
        let Some(app) = prepared.payload_as::<App>() else {
            return EngineError::internal("app payload was not built by EngineAppBuilder").into_response();
        };

        let Some(app_config) = app.config.variant(detected.env.as_deref()) else {
            return EngineError::environment_not_found(format!("environment `{:?}` not found for app `{}`", detected.env, detected.app_id))
                .into_response();
        };

        let trace_id = self.service_register.as_ref().map(|r| r.generator.generate_base36()).unwrap_or_else(|| "0".to_string());

        let method = request.method().clone();
        let matched = match router::resolve(&app.router, &method, &path) {
            Ok(matched) => matched,
            Err(err) => return err.into_response(),
        };

        let bypass = self.bypass_processing_enabled && request.headers().get(BYPASS_PROCESSING_HEADER).is_some();

        router::dispatch(matched, request, Arc::new(app_config.clone()), detected.env, trace_id, app.processor.clone(), bypass).await
    }
}
