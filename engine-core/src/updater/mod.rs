//! Config Updater: pulls app descriptors from an external source into
//! parsed [`AppConfigSet`]s (§4.1, §4.7).

pub mod closure;
pub mod local_fs;
pub mod zipped_oss;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::app_config::AppConfigSet;
use crate::error::EngineResult;

/// What the updater needs to decide what to (re)parse (§4.1 "Updater
/// contract").
pub struct UpdateInput {
    pub root: String,
    /// Restrict the update to these app IDs; empty means "all".
    pub include_app_ids: Vec<String>,
    /// appID → last-known-update-time, used for `skip_if_no_change`.
    pub known_update_times: HashMap<String, chrono::DateTime<chrono::Utc>>,
    pub skip_if_no_change: bool,
}

impl UpdateInput {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into(), include_app_ids: Vec::new(), known_update_times: HashMap::new(), skip_if_no_change: false }
    }

    /// True if `app_id` is within scope given `include_app_ids` (§4.1 edge
    /// case: "empty ⇒ all; non-empty ⇒ restrict strictly").
    pub fn includes(&self, app_id: &str) -> bool {
        self.include_app_ids.is_empty() || self.include_app_ids.iter().any(|id| id == app_id)
    }

    /// Whether `app_id`, last updated at `candidate_time`, should be skipped
    /// (§4.1 edge case: known `updateTime ≤ current` ⇒ skip; unknown ⇒
    /// update).
    pub fn should_skip(&self, app_id: &str, candidate_time: chrono::DateTime<chrono::Utc>) -> bool {
        self.skip_if_no_change
            && self
                .known_update_times
                .get(app_id)
                .map(|known| candidate_time <= *known)
                .unwrap_or(false)
    }
}

/// What an update cycle produced (§4.1 "Updater contract").
#[derive(Default)]
pub struct UpdateResult {
    pub updated_apps: HashMap<String, chrono::DateTime<chrono::Utc>>,
    pub updated_app_configs: HashMap<String, AppConfigSet>,
    pub skipped_apps: HashMap<String, crate::error::EngineError>,
}

/// Pulls the current set of app descriptors from wherever they live (§4.7).
#[async_trait]
pub trait ConfigUpdater: Send + Sync {
    async fn update(&self, input: UpdateInput) -> EngineResult<UpdateResult>;
}
