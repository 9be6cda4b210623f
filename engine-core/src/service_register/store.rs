//! Service Register persistence boundary (§4.6 ambient addition).
//!
//! Grounded in the teacher's pattern of defining a narrow trait at the
//! storage boundary (`ManagedResource`) and letting the concrete backend
//! live outside the crate: SQL/NoSQL driver integration is explicitly out of
//! scope, so this crate ships only the trait plus an in-memory
//! implementation that exercises the same state machine a real store would.

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::service_register::model::Model;

/// CRUD shape a Service Register backend must implement (§4.4 steps 2-7).
#[async_trait]
pub trait ServiceRegisterStore: Send + Sync {
    async fn list(&self) -> EngineResult<Vec<Model>>;

    async fn find_by_ip_worker(&self, ip: &str, worker: &str) -> EngineResult<Option<Model>>;

    async fn insert(&self, model: Model) -> EngineResult<bool>;

    /// Update conditioned on `(node_id, prev_startup_time)` to guard
    /// concurrent takeover races (§4.4 step 6). Returns whether the
    /// condition matched and the row was updated.
    async fn update_conditional(&self, node_id: i16, prev_startup_time: chrono::DateTime<chrono::Utc>, model: Model) -> EngineResult<bool>;

    /// Refresh `last_rent_time` for `node_id`. Returns whether a row matched.
    async fn renew(&self, node_id: i16, now: chrono::DateTime<chrono::Utc>) -> EngineResult<bool>;
}

/// In-memory `ServiceRegisterStore`, used when no external data source is
/// configured and in tests (§4.6).
#[derive(Default)]
pub struct InMemoryServiceRegisterStore {
    rows: tokio::sync::Mutex<Vec<Model>>,
}

impl InMemoryServiceRegisterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(rows: Vec<Model>) -> Self {
        Self { rows: tokio::sync::Mutex::new(rows) }
    }
}

#[async_trait]
impl ServiceRegisterStore for InMemoryServiceRegisterStore {
    async fn list(&self) -> EngineResult<Vec<Model>> {
        Ok(self.rows.lock().await.clone())
    }

    async fn find_by_ip_worker(&self, ip: &str, worker: &str) -> EngineResult<Option<Model>> {
        Ok(self.rows.lock().await.iter().find(|r| r.ip == ip && r.worker == worker).cloned())
    }

    async fn insert(&self, model: Model) -> EngineResult<bool> {
        let mut rows = self.rows.lock().await;
        if rows.iter().any(|r| r.node_id == model.node_id) {
            return Ok(false);
        }
        rows.push(model);
        Ok(true)
    }

    async fn update_conditional(&self, node_id: i16, prev_startup_time: chrono::DateTime<chrono::Utc>, model: Model) -> EngineResult<bool> {
        let mut rows = self.rows.lock().await;
        if let Some(row) = rows.iter_mut().find(|r| r.node_id == node_id && r.startup_time == prev_startup_time) {
            *row = model;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn renew(&self, node_id: i16, now: chrono::DateTime<chrono::Utc>) -> EngineResult<bool> {
        let mut rows = self.rows.lock().await;
        if let Some(row) = rows.iter_mut().find(|r| r.node_id == node_id) {
            row.last_rent_time = now;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_rejects_duplicate_node_id() {
        let store = InMemoryServiceRegisterStore::new();
        assert!(store.insert(Model::new(3, "svc", "10.0.0.1", "w1")).await.unwrap());
        assert!(!store.insert(Model::new(3, "svc", "10.0.0.2", "w2")).await.unwrap());
    }

    #[tokio::test]
    async fn find_by_ip_worker_matches_both_fields() {
        let store = InMemoryServiceRegisterStore::new();
        store.insert(Model::new(1, "svc", "10.0.0.1", "w1")).await.unwrap();
        assert!(store.find_by_ip_worker("10.0.0.1", "w1").await.unwrap().is_some());
        assert!(store.find_by_ip_worker("10.0.0.1", "w2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_conditional_fails_on_startup_time_mismatch() {
        let store = InMemoryServiceRegisterStore::new();
        let model = Model::new(3, "svc", "10.0.0.1", "w1");
        store.insert(model.clone()).await.unwrap();

        let wrong_time = model.startup_time - chrono::Duration::seconds(1);
        let updated = Model { worker: "w2".to_string(), ..model.clone() };
        assert!(!store.update_conditional(3, wrong_time, updated.clone()).await.unwrap());
        assert!(store.update_conditional(3, model.startup_time, updated).await.unwrap());
    }

    #[tokio::test]
    async fn renew_updates_last_rent_time() {
        let store = InMemoryServiceRegisterStore::new();
        let model = Model::new(5, "svc", "10.0.0.1", "w1");
        let original_rent = model.last_rent_time;
        store.insert(model).await.unwrap();

        let later = original_rent + chrono::Duration::minutes(1);
        assert!(store.renew(5, later).await.unwrap());
        let row = store.find_by_ip_worker("10.0.0.1", "w1").await.unwrap().unwrap();
        assert_eq!(row.last_rent_time, later);
    }
}
