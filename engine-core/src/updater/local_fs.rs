//! `LocalFsUpdater`: walks `root/<appID>/config.json` (§4.7).

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::app_config::AppConfigSet;
use crate::error::{EngineError, EngineResult};
use crate::updater::{ConfigUpdater, UpdateInput, UpdateResult};

/// Reads each app's `config.json` from `<root>/<appID>/config.json`, using
/// the file's mtime as the update-time clock.
pub struct LocalFsUpdater;

impl LocalFsUpdater {
    pub fn new() -> Self {
        Self
    }

    fn mtime(path: &Path) -> EngineResult<DateTime<Utc>> {
        let metadata = std::fs::metadata(path).map_err(|e| EngineError::internal(format!("stat {}: {e}", path.display())))?;
        let modified = metadata.modified().map_err(|e| EngineError::internal(format!("mtime {}: {e}", path.display())))?;
        Ok(DateTime::<Utc>::from(modified))
    }
}

impl Default for LocalFsUpdater {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigUpdater for LocalFsUpdater {
    async fn update(&self, input: UpdateInput) -> EngineResult<UpdateResult> {
        let root = Path::new(&input.root);
        let mut result = UpdateResult::default();

        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => return Err(EngineError::internal(format!("reading apps root {}: {e}", root.display()))),
        };

        for entry in entries {
            let entry = entry.map_err(|e| EngineError::internal(e.to_string()))?;
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let app_id = entry.file_name().to_string_lossy().to_string();
            if !input.includes(&app_id) {
                continue;
            }

            let config_path = entry.path().join("config.json");
            let update_time = match Self::mtime(&config_path) {
                Ok(t) => t,
                Err(err) => {
                    result.skipped_apps.insert(app_id, err);
                    continue;
                }
            };

            if input.should_skip(&app_id, update_time) {
                result.skipped_apps.insert(app_id, EngineError::not_modified("config unchanged since last pull"));
                continue;
            }

            match std::fs::read(&config_path) {
                Ok(bytes) => match AppConfigSet::from_json(&bytes) {
                    Ok(set) => {
                        result.updated_apps.insert(app_id.clone(), update_time);
                        result.updated_app_configs.insert(app_id, set);
                    }
                    Err(err) => {
                        result.skipped_apps.insert(app_id, err);
                    }
                },
                Err(e) => {
                    result.skipped_apps.insert(app_id, EngineError::invalid_app_config(format!("reading config.json: {e}")));
                }
            }
        }

        Ok(result)
    }
}
