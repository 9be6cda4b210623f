//! Resource Groups (§2 component B, §3): named pools of driver/client handles
//! shared by every app. Built once at startup; Resource Groups only own typed
//! *getters* over opaque handles, analogous to the teacher's `BeanContext`
//! type-erased storage (`r2e-core::beans`), but keyed by `(group, name)`
//! rather than by type alone since multiple databases can share a type.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_GROUP: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct HandleKey {
    group: String,
    name: String,
    type_id: TypeId,
}

/// A single kind of pool (database, cache, or object storage).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Database,
    Cache,
    Storage,
}

/// Named pools of opaque driver handles, partitioned by group ID
/// (default `"default"`). Handles are registered once at construction time
/// and never removed; concurrent readers only ever see fully-built state
/// because `ResourceGroups` is assembled before the Engine starts serving.
#[derive(Default)]
pub struct ResourceGroups {
    handles: HashMap<(Kind, HandleKey), Arc<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for ResourceGroups {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceGroups").field("handle_count", &self.handles.len()).finish()
    }
}

impl ResourceGroups {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert<T: Any + Send + Sync>(&mut self, kind: Kind, group: &str, name: &str, handle: T) {
        let key = HandleKey { group: group.to_string(), name: name.to_string(), type_id: TypeId::of::<T>() };
        self.handles.insert((kind, key), Arc::new(handle));
    }

    fn lookup<T: Any + Send + Sync>(&self, kind: Kind, group: &str, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        let key = HandleKey { group: group.to_string(), name: name.to_string(), type_id: TypeId::of::<T>() };
        self.handles.get(&(kind, key)).cloned()
    }

    pub fn register_database<T: Any + Send + Sync>(&mut self, group: &str, name: &str, handle: T) {
        self.insert(Kind::Database, group, name, handle);
    }

    pub fn register_cache<T: Any + Send + Sync>(&mut self, group: &str, name: &str, handle: T) {
        self.insert(Kind::Cache, group, name, handle);
    }

    pub fn register_storage<T: Any + Send + Sync>(&mut self, group: &str, name: &str, handle: T) {
        self.insert(Kind::Storage, group, name, handle);
    }

    /// Fetch a database driver handle, erased as `Arc<dyn Any + Send + Sync>`.
    /// Downcast with [`Self::get_database_as`] when the concrete type is known.
    pub fn get_database(&self, group: &str, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.lookup_any(Kind::Database, group, name)
    }

    pub fn get_cache(&self, group: &str, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.lookup_any(Kind::Cache, group, name)
    }

    pub fn get_storage(&self, group: &str, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.lookup_any(Kind::Storage, group, name)
    }

    fn lookup_any(&self, kind: Kind, group: &str, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.handles.iter().find(|((k, key), _)| *k == kind && key.group == group && key.name == name).map(|(_, v)| v.clone())
    }

    /// Typed database getter. Panics with a descriptive message if the
    /// handle exists under a different concrete type than `T` (a
    /// configuration error, not a runtime one, so a loud failure is correct
    /// per the teacher's `BeanContext::get` posture).
    pub fn get_database_as<T: Any + Send + Sync>(&self, group: &str, name: &str) -> Option<Arc<T>> {
        downcast(self.lookup::<T>(Kind::Database, group, name))
    }

    pub fn get_cache_as<T: Any + Send + Sync>(&self, group: &str, name: &str) -> Option<Arc<T>> {
        downcast(self.lookup::<T>(Kind::Cache, group, name))
    }

    pub fn get_storage_as<T: Any + Send + Sync>(&self, group: &str, name: &str) -> Option<Arc<T>> {
        downcast(self.lookup::<T>(Kind::Storage, group, name))
    }
}

fn downcast<T: Any + Send + Sync>(handle: Option<Arc<dyn Any + Send + Sync>>) -> Option<Arc<T>> {
    handle.map(|arc| {
        arc.downcast::<T>().unwrap_or_else(|_| {
            panic!("resource group handle registered under a different type than `{}`", type_name::<T>())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct FakePool(String);

    #[test]
    fn registers_and_fetches_by_group_and_name() {
        let mut groups = ResourceGroups::new();
        groups.register_database(DEFAULT_GROUP, "main", FakePool("postgres://main".into()));
        groups.register_database("billing", "main", FakePool("postgres://billing".into()));

        let main = groups.get_database_as::<FakePool>(DEFAULT_GROUP, "main").unwrap();
        let billing = groups.get_database_as::<FakePool>("billing", "main").unwrap();
        assert_eq!(main.0, "postgres://main");
        assert_eq!(billing.0, "postgres://billing");
    }

    #[test]
    fn missing_handle_is_none() {
        let groups = ResourceGroups::new();
        assert!(groups.get_database_as::<FakePool>(DEFAULT_GROUP, "main").is_none());
    }

    #[test]
    fn kinds_do_not_collide_on_same_name() {
        let mut groups = ResourceGroups::new();
        groups.register_database(DEFAULT_GROUP, "x", FakePool("db".into()));
        groups.register_cache(DEFAULT_GROUP, "x", FakePool("cache".into()));

        assert_eq!(groups.get_database_as::<FakePool>(DEFAULT_GROUP, "x").unwrap().0, "db");
        assert_eq!(groups.get_cache_as::<FakePool>(DEFAULT_GROUP, "x").unwrap().0, "cache");
    }
}
