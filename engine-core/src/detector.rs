//! App Detector (§4.7 ambient addition, §6 host-based routing scenario).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Minimal view of an inbound request a detector needs to make its decision.
pub struct DetectorRequest<'a> {
    pub host: Option<&'a str>,
    pub path: &'a str,
}

/// A resolved app + optional environment variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detected {
    pub app_id: String,
    pub env: Option<String>,
}

/// Resolve an inbound request to the app (and optional environment) that
/// should serve it.
pub trait AppDetector: Send + Sync {
    fn detect(&self, req: &DetectorRequest<'_>) -> Option<Detected>;
}

/// Default detector (§6): routes purely on the `Host` header, via an index
/// rebuilt every time the app map is republished (§4.1 step 5).
#[derive(Clone, Default)]
pub struct HostAppDetector {
    index: Arc<RwLock<HashMap<String, String>>>,
}

impl HostAppDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the host→appID index from the current `AppHost` entries
    /// tagged `"request"` across every live app.
    pub fn rebuild<'a>(&self, apps: impl Iterator<Item = (&'a str, &'a [crate::app_config::AppHost])>) {
        let mut index = HashMap::new();
        for (app_id, hosts) in apps {
            for host in hosts {
                if host.is_routed() {
                    index.insert(host.host.clone(), app_id.to_string());
                }
            }
        }
        *self.index.write().unwrap() = index;
    }
}

impl AppDetector for HostAppDetector {
    fn detect(&self, req: &DetectorRequest<'_>) -> Option<Detected> {
        let host = req.host?;
        let index = self.index.read().unwrap();
        index.get(host).map(|app_id| Detected { app_id: app_id.clone(), env: None })
    }
}
