//! Service Register storage schema (§4.4, §6 "Service-register storage
//! schema").

use std::collections::HashMap;

/// One row of the service-register table: a lease on a single Snowflake
/// node ID held by one process.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub node_id: i16,
    pub name: String,
    pub ip: String,
    pub worker: String,
    pub startup_time: chrono::DateTime<chrono::Utc>,
    pub last_rent_time: chrono::DateTime<chrono::Utc>,
    pub extra: HashMap<String, serde_json::Value>,
}

impl Model {
    pub fn new(node_id: i16, name: impl Into<String>, ip: impl Into<String>, worker: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            node_id,
            name: name.into(),
            ip: ip.into(),
            worker: worker.into(),
            startup_time: now,
            last_rent_time: now,
            extra: HashMap::new(),
        }
    }

    /// True when this lease has gone stale enough to be taken over by
    /// another process (§4.4 step 4: `now - lastRentTime ≥ rentThreshold`).
    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>, rent_threshold: chrono::Duration) -> bool {
        now - self.last_rent_time >= rent_threshold
    }
}
