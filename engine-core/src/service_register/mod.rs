//! Service Register: cluster-unique Snowflake node-ID assignment (§4.4).

pub mod model;
pub mod snowflake;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::error::EngineResult;
use crate::service_register::model::Model;
use crate::service_register::snowflake::SnowflakeGenerator;
use crate::service_register::store::ServiceRegisterStore;

const NODE_SPACE: i16 = 1024;
const MAX_RETRIES: u32 = 50;
const RETRY_DELAY: Duration = Duration::from_millis(10);
const DEFAULT_RENT_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_RENT_THRESHOLD_MINUTES: i64 = 10;

/// Discover this process's outbound LAN IP without sending any traffic (no
/// packets leave the host — `connect` on a UDP socket just resolves the
/// route and binds the local address).
pub fn discover_lan_ip() -> String {
    std::net::UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| "127.0.0.1".to_string())
}

/// Deterministic, collision-possible node ID computed from LAN IP + PID,
/// used when no data source is configured or as the last-resort fallback
/// (§4.4 steps 1, 5, 7).
pub fn deterministic_node_id(ip: &str, pid: u32) -> i16 {
    let mut hash: u64 = 1469598103934665603; // FNV-1a offset basis
    for byte in ip.bytes().chain(pid.to_le_bytes()) {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    (hash % NODE_SPACE as u64) as i16
}

/// Owns the node-ID lease and the Snowflake generator seeded from it.
pub struct ServiceRegister {
    pub generator: Arc<SnowflakeGenerator>,
    store: Option<Arc<dyn ServiceRegisterStore>>,
    name: String,
    ip: String,
    worker: String,
    rent_interval: Duration,
    rent_threshold: chrono::Duration,
}

impl ServiceRegister {
    /// Build a register with no data source: the generator is seeded
    /// immediately from the deterministic fallback (§4.4 step 1).
    pub fn without_store(name: impl Into<String>, worker: impl Into<String>) -> Self {
        let ip = discover_lan_ip();
        let node = deterministic_node_id(&ip, std::process::id());
        Self {
            generator: Arc::new(SnowflakeGenerator::new(node)),
            store: None,
            name: name.into(),
            ip,
            worker: worker.into(),
            rent_interval: DEFAULT_RENT_INTERVAL,
            rent_threshold: chrono::Duration::minutes(DEFAULT_RENT_THRESHOLD_MINUTES),
        }
    }

    /// Build a register backed by a store and run the full registration
    /// algorithm (§4.4 steps 2-8).
    pub async fn with_store(
        name: impl Into<String>,
        worker: impl Into<String>,
        store: Arc<dyn ServiceRegisterStore>,
    ) -> EngineResult<Self> {
        let ip = discover_lan_ip();
        let name = name.into();
        let worker = worker.into();

        let node = register_with_retry(&store, &name, &ip, &worker).await?;

        Ok(Self {
            generator: Arc::new(SnowflakeGenerator::new(node)),
            store: Some(store),
            name,
            ip,
            worker,
            rent_interval: DEFAULT_RENT_INTERVAL,
            rent_threshold: chrono::Duration::minutes(DEFAULT_RENT_THRESHOLD_MINUTES),
        })
    }

    /// Spawn the background lease-renewal loop (§4.4 step 8, §5 "lease
    /// renewer"). Renewing a lease that affects zero rows re-runs the whole
    /// registration procedure.
    pub fn spawn_renewal_loop(&self, shutdown: tokio_util::sync::CancellationToken) -> Option<tokio::task::JoinHandle<()>> {
        let store = self.store.clone()?;
        let node = self.generator.node();
        let name = self.name.clone();
        let ip = self.ip.clone();
        let worker = self.worker.clone();
        let interval = self.rent_interval;

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        match store.renew(node, Utc::now()).await {
                            Ok(true) => {}
                            Ok(false) => {
                                tracing::warn!(node_id = node, "lease renewal affected zero rows, re-registering");
                                if let Err(err) = register_with_retry(&store, &name, &ip, &worker).await {
                                    tracing::error!(%err, "service register re-registration failed");
                                }
                            }
                            Err(err) => tracing::error!(%err, "lease renewal failed"),
                        }
                    }
                }
            }
        }))
    }
}

/// The registration algorithm (§4.4 steps 2-7), retried up to [`MAX_RETRIES`]
/// times with a [`RETRY_DELAY`] between attempts before falling back to the
/// deterministic node ID.
async fn register_with_retry(store: &Arc<dyn ServiceRegisterStore>, name: &str, ip: &str, worker: &str) -> EngineResult<i16> {
    for _ in 0..MAX_RETRIES {
        match try_register_once(store, name, ip, worker).await {
            Ok(Some(node)) => return Ok(node),
            Ok(None) => tokio::time::sleep(RETRY_DELAY).await,
            Err(err) => return Err(err),
        }
    }
    tracing::warn!("service register retries exhausted, falling back to deterministic node id");
    Ok(deterministic_node_id(ip, std::process::id()))
}

/// One attempt at steps 3-6. Returns `Ok(None)` when the `affectCount == 0`
/// race was hit and the caller should retry (§4.4 step 7).
async fn try_register_once(store: &Arc<dyn ServiceRegisterStore>, name: &str, ip: &str, worker: &str) -> EngineResult<Option<i16>> {
    if let Some(existing) = store.find_by_ip_worker(ip, worker).await? {
        let refreshed = Model { startup_time: Utc::now(), last_rent_time: Utc::now(), ..existing.clone() };
        if store.update_conditional(existing.node_id, existing.startup_time, refreshed).await? {
            return Ok(Some(existing.node_id));
        }
        return Ok(None);
    }

    let rows = store.list().await?;
    let occupied: std::collections::HashSet<i16> = rows.iter().map(|r| r.node_id).collect();

    if let Some(free_node) = (0..NODE_SPACE).find(|n| !occupied.contains(n)) {
        let model = Model::new(free_node, name, ip, worker);
        if store.insert(model).await? {
            return Ok(Some(free_node));
        }
        return Ok(None);
    }

    let now = Utc::now();
    let rent_threshold = chrono::Duration::minutes(DEFAULT_RENT_THRESHOLD_MINUTES);
    if let Some(stale) = rows.iter().find(|r| r.is_expired(now, rent_threshold)) {
        let taken_over = Model::new(stale.node_id, name, ip, worker);
        if store.update_conditional(stale.node_id, stale.startup_time, taken_over).await? {
            return Ok(Some(stale.node_id));
        }
        return Ok(None);
    }

    // Full and nothing stale to take over: fall back to the deterministic
    // method rather than erroring (§4.4 step 5).
    tracing::warn!("service register node space exhausted with no stale leases, falling back to deterministic node id");
    Ok(Some(deterministic_node_id(ip, std::process::id())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service_register::store::InMemoryServiceRegisterStore;

    #[test]
    fn deterministic_node_id_is_stable_for_same_inputs() {
        let a = deterministic_node_id("10.0.0.5", 42);
        let b = deterministic_node_id("10.0.0.5", 42);
        assert_eq!(a, b);
        assert!((0..NODE_SPACE).contains(&a));
    }

    #[tokio::test]
    async fn reusing_ip_and_worker_reuses_node_id() {
        let store: Arc<dyn ServiceRegisterStore> = Arc::new(InMemoryServiceRegisterStore::new());
        let first = register_with_retry(&store, "svc", "10.0.0.5", "worker-a").await.unwrap();
        let second = register_with_retry(&store, "svc", "10.0.0.5", "worker-a").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn different_ip_worker_gets_a_different_node() {
        let store: Arc<dyn ServiceRegisterStore> = Arc::new(InMemoryServiceRegisterStore::new());
        let first = register_with_retry(&store, "svc", "10.0.0.5", "worker-a").await.unwrap();
        let second = register_with_retry(&store, "svc", "10.0.0.6", "worker-b").await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn takes_over_stale_lease_once_node_space_is_full() {
        let mut rows: Vec<Model> = (0..NODE_SPACE)
            .map(|n| Model::new(n, "svc", format!("10.0.{}.1", n), format!("worker-{n}")))
            .collect();
        rows[3].last_rent_time = Utc::now() - chrono::Duration::minutes(11);
        let store: Arc<dyn ServiceRegisterStore> = Arc::new(InMemoryServiceRegisterStore::seeded(rows));

        let node = register_with_retry(&store, "svc", "10.0.9.9", "worker-new").await.unwrap();
        assert_eq!(node, 3);
    }

    #[tokio::test]
    async fn falls_back_to_deterministic_node_id_when_full_with_no_stale_leases() {
        let rows: Vec<Model> = (0..NODE_SPACE)
            .map(|n| Model::new(n, "svc", format!("10.0.{}.1", n), format!("worker-{n}")))
            .collect();
        let store: Arc<dyn ServiceRegisterStore> = Arc::new(InMemoryServiceRegisterStore::seeded(rows));

        let node = register_with_retry(&store, "svc", "10.0.9.9", "worker-new").await.unwrap();
        assert_eq!(node, deterministic_node_id("10.0.9.9", std::process::id()));
    }
}
