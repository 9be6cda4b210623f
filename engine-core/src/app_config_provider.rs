//! App Config Provider: the hot-reload pipeline around a [`ConfigUpdater`]
//! (§4.1).

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::app_config::AppConfigSet;
use crate::error::EngineResult;
use crate::hooks::ModuleChain;
use crate::updater::{ConfigUpdater, UpdateInput};

/// One live, fully-prepared app: its parsed config plus an opaque payload
/// the caller builds alongside it. `Engine` stashes its `router` +
/// middleware chain here, type-erased the same way `TypedStore` and
/// `ResourceGroups` erase their values, so the provider itself stays
/// ignorant of routing.
pub struct PreparedApp {
    pub app_id: String,
    pub config: AppConfigSet,
    pub update_time: chrono::DateTime<chrono::Utc>,
    pub payload: Box<dyn std::any::Any + Send + Sync>,
}

impl PreparedApp {
    pub fn payload_as<T: 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

/// Builds a [`PreparedApp`] from a freshly parsed [`AppConfigSet`]. The
/// Engine supplies this so the provider stays decoupled from router/
/// middleware construction (§4.1 step 2: "construct the App, run the
/// app-will-prepare hook, prepare router/middleware").
#[async_trait::async_trait]
pub trait AppBuilder: Send + Sync {
    async fn build(&self, app_id: &str, config: AppConfigSet, update_time: chrono::DateTime<chrono::Utc>) -> EngineResult<PreparedApp>;
}

/// Drives the update cycle described in §4.1: pull from the updater,
/// rebuild changed apps, carry over untouched ones, publish atomically.
pub struct AppConfigProvider {
    updater: Arc<dyn ConfigUpdater>,
    modules: Arc<ModuleChain>,
    root: String,
    /// `debug.appConfig_includesAppIDs` (§6): restricts every update cycle
    /// to these app IDs; empty means "all".
    include_app_ids: Vec<String>,
    apps: RwLock<Arc<HashMap<String, Arc<PreparedApp>>>>,
    is_updating: AtomicBool,
    warnings_dir: String,
}

impl AppConfigProvider {
    pub fn new(
        updater: Arc<dyn ConfigUpdater>,
        modules: Arc<ModuleChain>,
        root: impl Into<String>,
        working_dir: impl Into<String>,
        include_app_ids: Vec<String>,
    ) -> Self {
        let working_dir = working_dir.into();
        Self {
            updater,
            modules,
            root: root.into(),
            include_app_ids,
            apps: RwLock::new(Arc::new(HashMap::new())),
            is_updating: AtomicBool::new(false),
            warnings_dir: format!("{working_dir}/apps_warning"),
        }
    }

    pub fn apps(&self) -> Arc<HashMap<String, Arc<PreparedApp>>> {
        self.apps.read().expect("apps map lock poisoned").clone()
    }

    /// Run one update cycle (§4.1 steps 1-5). Serialized via `is_updating`:
    /// a concurrent call observes the latch and returns immediately without
    /// running a second cycle (§5 "Config updates are serialized").
    pub async fn run_update(&self, builder: &dyn AppBuilder) -> EngineResult<()> {
        if self.is_updating.swap(true, Ordering::SeqCst) {
            tracing::debug!("update already in progress, skipping");
            return Ok(());
        }
        let outcome = self.run_update_inner(builder).await;
        self.is_updating.store(false, Ordering::SeqCst);
        outcome
    }

    async fn run_update_inner(&self, builder: &dyn AppBuilder) -> EngineResult<()> {
        let prior = self.apps();
        let known_update_times = prior.iter().map(|(id, app)| (id.clone(), app.update_time)).collect();

        let mut input = UpdateInput::new(self.root.clone());
        input.known_update_times = known_update_times;
        input.skip_if_no_change = true;
        input.include_app_ids = self.include_app_ids.clone();

        let result = match self.updater.update(input).await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(%err, "config updater failed, keeping previous app map live");
                return Err(err);
            }
        };

        let mut next: HashMap<String, Arc<PreparedApp>> = HashMap::new();

        for (app_id, config) in result.updated_app_configs {
            if let Err(err) = self.modules.run_app_will_prepare(&config) {
                tracing::error!(app_id, %err, "app-will-prepare hook rejected app, prior version stays live");
                self.write_warning(&app_id, &[err.to_string()]);
                if let Some(existing) = prior.get(&app_id) {
                    next.insert(app_id, existing.clone());
                }
                continue;
            }

            let update_time = result.updated_apps.get(&app_id).copied().unwrap_or_else(chrono::Utc::now);
            match builder.build(&app_id, config, update_time).await {
                Ok(prepared) => {
                    self.modules.run_app_ready(&app_id);
                    self.write_warning(&app_id, &[]);
                    next.insert(app_id, Arc::new(prepared));
                }
                Err(err) => {
                    tracing::error!(app_id, %err, "failed to build app, prior version stays live");
                    self.write_warning(&app_id, &[err.to_string()]);
                    if let Some(existing) = prior.get(&app_id) {
                        next.insert(app_id, existing.clone());
                    }
                }
            }
        }

        // Carry over apps absent from both updated and skipped/removed sets
        // (§4.1 step 3).
        for (app_id, app) in prior.iter() {
            if next.contains_key(app_id) || result.skipped_apps.contains_key(app_id) {
                continue;
            }
            if result.updated_apps.contains_key(app_id) {
                continue;
            }
            next.insert(app_id.clone(), app.clone());
        }

        *self.apps.write().expect("apps map lock poisoned") = Arc::new(next);
        Ok(())
    }

    fn write_warning(&self, app_id: &str, warnings: &[String]) {
        let path = Path::new(&self.warnings_dir).join(format!("{app_id}.json"));
        if warnings.is_empty() {
            let _ = std::fs::remove_file(&path);
            return;
        }
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(json) = serde_json::to_vec_pretty(warnings) {
            let _ = std::fs::write(&path, json);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::AppConfig;
    use crate::updater::closure::ClosureUpdater;
    use crate::updater::UpdateResult;

    struct PassthroughBuilder;

    #[async_trait::async_trait]
    impl AppBuilder for PassthroughBuilder {
        async fn build(&self, app_id: &str, config: AppConfigSet, update_time: chrono::DateTime<chrono::Utc>) -> EngineResult<PreparedApp> {
            Ok(PreparedApp { app_id: app_id.to_string(), config, update_time, payload: Box::new(()) })
        }
    }

    #[tokio::test]
    async fn publishes_parsed_apps() {
        let updater = Arc::new(ClosureUpdater::new(|_input| async {
            let mut result = UpdateResult::default();
            result.updated_app_configs.insert("acme".to_string(), AppConfigSet::new(AppConfig::new("acme")));
            result.updated_apps.insert("acme".to_string(), chrono::Utc::now());
            Ok(result)
        }));

        let dir = tempfile::tempdir().unwrap();
        let provider = AppConfigProvider::new(updater, Arc::new(ModuleChain::new()), "/unused", dir.path().to_string_lossy(), Vec::new());
        provider.run_update(&PassthroughBuilder).await.unwrap();

        assert!(provider.apps().contains_key("acme"));
    }

    #[tokio::test]
    async fn include_app_ids_is_forwarded_to_the_updater() {
        let seen: Arc<std::sync::Mutex<Vec<String>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let updater = Arc::new(ClosureUpdater::new(move |input| {
            let seen = seen_clone.clone();
            async move {
                *seen.lock().unwrap() = input.include_app_ids;
                Ok(UpdateResult::default())
            }
        }));

        let dir = tempfile::tempdir().unwrap();
        let provider = AppConfigProvider::new(
            updater,
            Arc::new(ModuleChain::new()),
            "/unused",
            dir.path().to_string_lossy(),
            vec!["acme".to_string()],
        );
        provider.run_update(&PassthroughBuilder).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["acme".to_string()]);
    }

    #[tokio::test]
    async fn carries_over_apps_absent_from_the_new_pull() {
        let call_count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let call_count_clone = call_count.clone();
        let updater = Arc::new(ClosureUpdater::new(move |_input| {
            let call_count = call_count_clone.clone();
            async move {
                let n = call_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                let mut result = UpdateResult::default();
                if n == 0 {
                    result.updated_app_configs.insert("acme".to_string(), AppConfigSet::new(AppConfig::new("acme")));
                    result.updated_apps.insert("acme".to_string(), chrono::Utc::now());
                }
                Ok(result)
            }
        }));

        let dir = tempfile::tempdir().unwrap();
        let provider = AppConfigProvider::new(updater, Arc::new(ModuleChain::new()), "/unused", dir.path().to_string_lossy(), Vec::new());
        provider.run_update(&PassthroughBuilder).await.unwrap();
        provider.run_update(&PassthroughBuilder).await.unwrap();

        assert!(provider.apps().contains_key("acme"));
    }
}
