//! App Config & App Config Set (§2 component C, §3, §6).
//!
//! `AppConfig` is the immutable per-app record parsed from each app
//! directory's `config.json`. `AppConfigSet` bundles the main config with its
//! named environment variants, each of which shares the main config's
//! immutable fields and only overrides the typed-object store (§9 Open
//! Questions: single canonical constructor, no second legacy path).

use crate::error::{EngineError, EngineResult};
use crate::typed_store::TypedStore;
use serde::Deserialize;
use std::collections::HashMap;

/// A host bound to this app, with its usage tag (§6: `"request"` for routed
/// traffic; any other tag is carried but not used for routing decisions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppHost {
    pub host: String,
    pub usage: String,
}

impl AppHost {
    pub fn routed(host: impl Into<String>) -> Self {
        Self { host: host.into(), usage: "request".to_string() }
    }

    pub fn is_routed(&self) -> bool {
        self.usage == "request"
    }
}

/// Per-app CORS policy (§6). `allowed_origin` encodes the five-way union
/// described in the spec as a plain enum rather than a stringly-typed field.
#[derive(Debug, Clone)]
pub struct CorsOptions {
    pub enabled: bool,
    pub allowed_origin: AllowedOrigin,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub cache_expiration: Option<u64>,
    pub exposed_headers: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum AllowedOrigin {
    OriginBased,
    All,
    None,
    Any(Vec<String>),
    Custom(String),
}

impl Default for CorsOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_origin: AllowedOrigin::OriginBased,
            allowed_methods: vec!["GET".into(), "POST".into(), "PUT".into(), "DELETE".into(), "OPTIONS".into()],
            allowed_headers: vec!["*".into()],
            allow_credentials: false,
            cache_expiration: None,
            exposed_headers: Vec::new(),
        }
    }
}

/// A named encryption key (§3, §6).
#[derive(Debug, Clone)]
pub struct EncryptionKey {
    pub id: String,
    pub secret: String,
    pub name: Option<String>,
}

/// Immutable per-app record (§3). The `environment` field is `None` for the
/// main config; variants produced by [`AppConfigSet`] share the same base and
/// differ only in their `modules` store.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_id: String,
    pub app_name: Option<String>,
    pub app_group: Option<String>,
    pub hosts: Vec<AppHost>,
    pub time_offset_secs: i64,
    pub cors_options: Option<CorsOptions>,
    pub encryptions: HashMap<String, EncryptionKey>,
    pub environment: Option<String>,
    /// Recursive typed-object store for module-specific parsed config (§3,
    /// §9 "Dynamic typing / typed stores").
    pub modules: TypedStore,
}

impl AppConfig {
    /// Canonical constructor (§9 Open Questions decision: a single
    /// constructor, no second legacy path).
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_name: None,
            app_group: None,
            hosts: Vec::new(),
            time_offset_secs: 0,
            cors_options: None,
            encryptions: HashMap::new(),
            environment: None,
            modules: TypedStore::new(),
        }
    }

    pub fn with_host(mut self, host: AppHost) -> Self {
        self.hosts.push(host);
        self
    }

    /// Parse a `config.json` document (§6) into the main `AppConfig`. Use
    /// [`AppConfigSet::from_json`] to additionally pull out `environments`.
    pub fn from_json(bytes: &[u8]) -> EngineResult<Self> {
        let raw: RawAppConfig = serde_json::from_slice(bytes)
            .map_err(|e| EngineError::invalid_app_config(format!("config.json parse error: {e}")))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawAppConfig) -> EngineResult<Self> {
        if raw.app_id.trim().is_empty() {
            return Err(EngineError::invalid_app_config("config.json missing required field `app_id`"));
        }

        let hosts = raw
            .hosts
            .into_iter()
            .map(|h| match h {
                RawHost::Plain(host) => AppHost { host, usage: "request".to_string() },
                RawHost::Tagged { host, usage } => AppHost { host, usage },
            })
            .collect();

        let encryptions = raw
            .encryptions
            .into_iter()
            .map(|e| (e.id.clone(), EncryptionKey { id: e.id, secret: e.secret, name: e.name }))
            .collect();

        let cors_options = raw.cors_options.map(parse_cors);

        Ok(Self {
            app_id: raw.app_id,
            app_name: raw.app_name,
            app_group: raw.app_group,
            hosts,
            time_offset_secs: raw.time_offset.unwrap_or(0),
            cors_options,
            encryptions,
            environment: None,
            modules: TypedStore::new(),
        })
    }

    /// Apply an environment variant's overrides on top of a clone of this
    /// base config: the base fields are untouched, only `environment` and
    /// `modules` change (§3: "share the immutable base and override only the
    /// typed-object store").
    fn as_variant(&self, name: &str) -> Self {
        Self { environment: Some(name.to_string()), modules: TypedStore::new(), ..self.clone() }
    }
}

fn parse_cors(raw: RawCorsOptions) -> CorsOptions {
    let allowed_origin = match raw.allowed_origin.as_deref() {
        Some("all") => AllowedOrigin::All,
        Some("none") => AllowedOrigin::None,
        Some(custom) if custom.starts_with("custom:") => AllowedOrigin::Custom(custom["custom:".len()..].to_string()),
        Some(_) | None => AllowedOrigin::OriginBased,
    };
    let allowed_origin = if let Some(list) = raw.allowed_origin_list {
        AllowedOrigin::Any(list)
    } else {
        allowed_origin
    };

    let defaults = CorsOptions::default();
    CorsOptions {
        enabled: raw.enabled,
        allowed_origin,
        allowed_methods: raw.allowed_methods.unwrap_or(defaults.allowed_methods),
        allowed_headers: raw.allowed_headers.unwrap_or(defaults.allowed_headers),
        allow_credentials: raw.allow_credentials.unwrap_or(false),
        cache_expiration: raw.cache_expiration,
        exposed_headers: raw.exposed_headers.unwrap_or_default(),
    }
}

/// Main config plus named environment variants (§3).
#[derive(Debug, Clone)]
pub struct AppConfigSet {
    pub main: AppConfig,
    pub environments: HashMap<String, AppConfig>,
    /// module-name → warnings, per environment (empty string key = main).
    pub warnings: HashMap<String, Vec<String>>,
}

impl AppConfigSet {
    pub fn new(main: AppConfig) -> Self {
        Self { main, environments: HashMap::new(), warnings: HashMap::new() }
    }

    /// Parse a full `config.json` document, including `environments`
    /// (object keyed by environment name; each value follows the same shape
    /// as the top-level document and is layered on the main config per
    /// [`AppConfig::as_variant`]).
    pub fn from_json(bytes: &[u8]) -> EngineResult<Self> {
        let raw: RawAppConfig = serde_json::from_slice(bytes)
            .map_err(|e| EngineError::invalid_app_config(format!("config.json parse error: {e}")))?;
        let env_raw = raw.environments.clone();
        let main = AppConfig::from_raw(raw)?;
        let mut set = Self::new(main);

        for name in env_raw.names() {
            set.environments.insert(name.clone(), set.main.as_variant(&name));
        }

        Ok(set)
    }

    pub fn variant(&self, env: Option<&str>) -> Option<&AppConfig> {
        match env {
            None => Some(&self.main),
            Some(name) => self.environments.get(name),
        }
    }

    pub fn warnings_for(&self, module: &str) -> &[String] {
        self.warnings.get(module).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn has_warnings(&self) -> bool {
        self.warnings.values().any(|v| !v.is_empty())
    }
}

// --- wire format (§6) -------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawAppConfig {
    app_id: String,
    app_name: Option<String>,
    app_group: Option<String>,
    #[serde(default)]
    hosts: Vec<RawHost>,
    time_offset: Option<i64>,
    cors_options: Option<RawCorsOptions>,
    #[serde(default)]
    encryptions: Vec<RawEncryption>,
    #[serde(default)]
    environments: RawEnvironments,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawHost {
    Plain(String),
    Tagged { host: String, usage: String },
}

#[derive(Debug, Deserialize)]
struct RawCorsOptions {
    enabled: bool,
    allowed_origin: Option<String>,
    #[serde(rename = "allowed_origin_list")]
    allowed_origin_list: Option<Vec<String>>,
    allowed_methods: Option<Vec<String>>,
    allowed_headers: Option<Vec<String>>,
    allow_credentials: Option<bool>,
    cache_expiration: Option<u64>,
    exposed_headers: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawEncryption {
    id: String,
    secret: String,
    name: Option<String>,
}

/// `environments` may be a JSON object (name → descriptor) or an array of
/// `{name: ...}` descriptors (§6: "object or array").
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(untagged)]
enum RawEnvironments {
    #[default]
    Empty,
    Object(HashMap<String, serde_json::Value>),
    Array(Vec<RawEnvironmentEntry>),
}

#[derive(Debug, Clone, Deserialize)]
struct RawEnvironmentEntry {
    name: String,
}

impl RawEnvironments {
    fn names(&self) -> Vec<String> {
        match self {
            RawEnvironments::Empty => Vec::new(),
            RawEnvironments::Object(map) => map.keys().cloned().collect(),
            RawEnvironments::Array(entries) => entries.iter().map(|e| e.name.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let json = br#"{"app_id": "acme"}"#;
        let config = AppConfig::from_json(json).unwrap();
        assert_eq!(config.app_id, "acme");
        assert!(config.hosts.is_empty());
        assert!(config.environment.is_none());
    }

    #[test]
    fn missing_app_id_is_invalid_app_config() {
        let json = br#"{"app_name": "no id"}"#;
        let err = AppConfig::from_json(json).unwrap_err();
        assert_eq!(err.base_kind().http_status().as_u16(), 417);
    }

    #[test]
    fn parses_hosts_plain_and_tagged() {
        let json = br#"{
            "app_id": "acme",
            "hosts": ["acme.example.com", {"host": "internal.acme.local", "usage": "metrics"}]
        }"#;
        let config = AppConfig::from_json(json).unwrap();
        assert_eq!(config.hosts.len(), 2);
        assert!(config.hosts[0].is_routed());
        assert!(!config.hosts[1].is_routed());
    }

    #[test]
    fn parses_environments_object_into_variants() {
        let json = br#"{
            "app_id": "acme",
            "environments": {"staging": {}, "canary": {}}
        }"#;
        let set = AppConfigSet::from_json(json).unwrap();
        assert_eq!(set.environments.len(), 2);
        let staging = set.variant(Some("staging")).unwrap();
        assert_eq!(staging.app_id, "acme");
        assert_eq!(staging.environment.as_deref(), Some("staging"));
        assert!(set.variant(Some("missing")).is_none());
    }

    #[test]
    fn cors_any_list_overrides_named_variant() {
        let json = br#"{
            "app_id": "acme",
            "cors_options": {
                "enabled": true,
                "allowed_origin_list": ["https://a.com", "https://b.com"]
            }
        }"#;
        let config = AppConfig::from_json(json).unwrap();
        let cors = config.cors_options.unwrap();
        assert!(matches!(cors.allowed_origin, AllowedOrigin::Any(ref v) if v.len() == 2));
    }
}
