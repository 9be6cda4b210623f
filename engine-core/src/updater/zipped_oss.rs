//! `ZippedObjectStorageUpdater`: lists `<prefix>/<appID>.zip` objects and
//! expands each under `root/<appID>/` (§4.7, §6 "Zipped-updater wire
//! contract"). The concrete object-storage client is out of scope; only the
//! listing/get-object boundary is defined here.

use std::io::Read;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::app_config::AppConfigSet;
use crate::error::{EngineError, EngineResult};
use crate::updater::{ConfigUpdater, UpdateInput, UpdateResult};

/// One listed object: its key and the store's last-modified timestamp,
/// which doubles as the update clock (§6).
pub struct ListedObject {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

/// A page of a (possibly paginated) object listing.
pub struct ListPage {
    pub objects: Vec<ListedObject>,
    pub continuation_token: Option<String>,
}

/// The narrow boundary this updater needs from an object store: paginated
/// listing under a prefix, and fetching a single object's bytes.
#[async_trait]
pub trait ObjectStoreLister: Send + Sync {
    async fn list(&self, prefix: &str, continuation_token: Option<&str>) -> EngineResult<ListPage>;
    async fn get_object(&self, key: &str) -> EngineResult<Vec<u8>>;
}

pub struct ZippedObjectStorageUpdater {
    lister: Box<dyn ObjectStoreLister>,
    prefix: String,
}

impl ZippedObjectStorageUpdater {
    pub fn new(lister: impl ObjectStoreLister + 'static, prefix: impl Into<String>) -> Self {
        Self { lister: Box::new(lister), prefix: prefix.into() }
    }

    async fn list_all(&self) -> EngineResult<Vec<ListedObject>> {
        let mut objects = Vec::new();
        let mut token = None;
        loop {
            let page = self.lister.list(&self.prefix, token.as_deref()).await?;
            objects.extend(page.objects);
            token = page.continuation_token;
            if token.is_none() {
                break;
            }
        }
        Ok(objects)
    }

    fn app_id_of(&self, key: &str) -> Option<String> {
        let file_name = key.rsplit('/').next()?;
        file_name.strip_suffix(".zip").map(|s| s.to_string())
    }

    fn expand_zip(root: &str, app_id: &str, bytes: &[u8]) -> EngineResult<()> {
        let app_dir = Path::new(root).join(app_id);
        std::fs::create_dir_all(&app_dir).map_err(|e| EngineError::internal(format!("creating {}: {e}", app_dir.display())))?;

        let cursor = std::io::Cursor::new(bytes);
        let mut archive = zip::ZipArchive::new(cursor).map_err(|e| EngineError::invalid_app_config(format!("bad zip for {app_id}: {e}")))?;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| EngineError::invalid_app_config(format!("reading zip entry: {e}")))?;
            let Some(entry_path) = entry.enclosed_name() else { continue };
            let dest = app_dir.join(entry_path);

            if entry.is_dir() {
                std::fs::create_dir_all(&dest).map_err(|e| EngineError::internal(e.to_string()))?;
                continue;
            }
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(|e| EngineError::internal(e.to_string()))?;
            }
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents).map_err(|e| EngineError::internal(e.to_string()))?;
            std::fs::write(&dest, contents).map_err(|e| EngineError::internal(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigUpdater for ZippedObjectStorageUpdater {
    async fn update(&self, input: UpdateInput) -> EngineResult<UpdateResult> {
        let mut result = UpdateResult::default();

        for object in self.list_all().await? {
            let Some(app_id) = self.app_id_of(&object.key) else { continue };
            if !input.includes(&app_id) {
                continue;
            }
            if input.should_skip(&app_id, object.last_modified) {
                result.skipped_apps.insert(app_id, EngineError::not_modified("object unchanged since last pull"));
                continue;
            }

            let bytes = match self.lister.get_object(&object.key).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    result.skipped_apps.insert(app_id, err);
                    continue;
                }
            };

            if let Err(err) = Self::expand_zip(&input.root, &app_id, &bytes) {
                result.skipped_apps.insert(app_id, err);
                continue;
            }

            let config_path = Path::new(&input.root).join(&app_id).join("config.json");
            match std::fs::read(&config_path) {
                Ok(config_bytes) => match AppConfigSet::from_json(&config_bytes) {
                    Ok(set) => {
                        result.updated_apps.insert(app_id.clone(), object.last_modified);
                        result.updated_app_configs.insert(app_id, set);
                    }
                    Err(err) => {
                        result.skipped_apps.insert(app_id, err);
                    }
                },
                Err(e) => {
                    result.skipped_apps.insert(app_id, EngineError::invalid_app_config(format!("zip missing config.json: {e}")));
                }
            }
        }

        Ok(result)
    }
}
