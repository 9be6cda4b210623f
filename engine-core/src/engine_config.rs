//! Engine Config (§2 component A, §3, §9): immutable bootstrap settings read
//! once at startup. Unlike [`crate::app_config::AppConfig`], nothing here is
//! hot-reloaded — changing any of it requires a process restart.

use crate::config::{ConfigError, ConfigProperties, ConfigStore, PropertyMeta};
use std::collections::HashMap;

/// TCP binding and listener tuning (§3).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Grace period for in-flight requests during shutdown, in seconds.
    pub shutdown_timeout_secs: u64,
    pub reuse_address: bool,
}

impl ConfigProperties for ServerConfig {
    fn prefix() -> &'static str {
        "server"
    }

    fn properties_metadata() -> Vec<PropertyMeta> {
        vec![
            PropertyMeta::leaf("host", "server.host", "String", false),
            PropertyMeta::leaf("port", "server.port", "u16", false),
            PropertyMeta::leaf("shutdown_timeout_secs", "server.shutdown_timeout_secs", "u64", false),
            PropertyMeta::leaf("reuse_address", "server.reuse_address", "bool", false),
        ]
    }

    fn from_config(config: &ConfigStore) -> Result<Self, ConfigError> {
        Ok(Self {
            host: config.get_or("server.host", "0.0.0.0".to_string()),
            port: config.get_or("server.port", 8080u16),
            shutdown_timeout_secs: config.get_or("server.shutdown_timeout_secs", 30u64),
            reuse_address: config.get_or("server.reuse_address", true),
        })
    }
}

/// Where the App Config Provider should look for app descriptors at startup
/// (§4.1, §4.7). Mirrors the `ConfigUpdater` variants without depending on
/// `crate::updater` directly, since this is just the bootstrap pointer.
#[derive(Debug, Clone)]
pub enum AppSource {
    LocalFs { directory: String },
    ZippedObjectStorage { bucket: String, prefix: String },
}

impl ConfigProperties for AppSource {
    fn prefix() -> &'static str {
        "apps.source"
    }

    fn properties_metadata() -> Vec<PropertyMeta> {
        vec![
            PropertyMeta::leaf("kind", "apps.source.kind", "String", true),
            PropertyMeta::leaf("directory", "apps.source.directory", "String", false),
            PropertyMeta::leaf("bucket", "apps.source.bucket", "String", false),
            PropertyMeta::leaf("prefix", "apps.source.prefix", "String", false),
        ]
    }

    fn from_config(config: &ConfigStore) -> Result<Self, ConfigError> {
        let kind: String = config.get_or("apps.source.kind", "local_fs".to_string());
        match kind.as_str() {
            "local_fs" => Ok(AppSource::LocalFs {
                directory: config.get_or("apps.source.directory", "./apps".to_string()),
            }),
            "zipped_object_storage" => Ok(AppSource::ZippedObjectStorage {
                bucket: config.get("apps.source.bucket")?,
                prefix: config.get_or("apps.source.prefix", String::new()),
            }),
            other => Err(ConfigError::TypeMismatch {
                key: format!("apps.source.kind = {other}"),
                expected: "local_fs | zipped_object_storage",
            }),
        }
    }
}

/// Named logging sink (§2 component I, §9). Each role (`"access"`,
/// `"app"`, `"audit"`, ...) points at its own sink so the teacher's TCP
/// reconnect-loop sink and stdout can coexist.
#[derive(Debug, Clone)]
pub struct LoggerSinkConfig {
    pub role: String,
    pub target: LoggerTarget,
    pub level: String,
}

#[derive(Debug, Clone)]
pub enum LoggerTarget {
    Stdout,
    Tcp { host: String, port: u16 },
}

/// Top-level, process-wide engine configuration (§2 component A).
///
/// Constructed once via [`EngineConfig::load`] and never replaced; everything
/// that can change without a restart lives in [`crate::app_config::AppConfig`]
/// or the resource groups instead.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub service_name: String,
    pub working_dir: String,
    /// Boolean debug-feature switches (§6 "Debug features"). Known keys:
    /// `engine_ignoreBodyProcess` (skip body pre/post-processing when the
    /// bypass header is also present) and `engine_extractDebugHost` (honor
    /// an `x-debug-host` header override during app detection).
    pub debug_features: HashMap<String, bool>,
    /// `debug.appConfig_includesAppIDs` (§6): restricts the App Config
    /// Provider to these app IDs; empty means "all".
    pub include_app_ids: Vec<String>,
    pub server: ServerConfig,
    pub app_source: AppSource,
    /// How often the App Config Provider re-pulls from `app_source` (§2
    /// component A: "app-source descriptor ... pull interval").
    pub apps_pull_interval_secs: u64,
    /// IANA timezone name used to compute each request's local start time.
    pub timezone: String,
    pub logger_sinks: Vec<LoggerSinkConfig>,
    pub metric_endpoint: Option<String>,
}

impl EngineConfig {
    /// Load from the layered `ConfigStore` for the given profile (§1A).
    pub fn load(profile: &str) -> Result<Self, ConfigError> {
        let config = ConfigStore::load(profile)?;
        Self::from_config(&config)
    }

    fn from_config(config: &ConfigStore) -> Result<Self, ConfigError> {
        let server = ServerConfig::from_config(config)?;
        let app_source = AppSource::from_config(config)?;

        let mut debug_features = HashMap::new();
        for key in ["engine_ignoreBodyProcess", "engine_extractDebugHost"] {
            let full_key = format!("debug.{key}");
            if config.contains_key(&full_key) {
                debug_features.insert(key.to_string(), config.get_or(&full_key, false));
            }
        }
        let include_app_ids = config.get_or("debug.appConfig_includesAppIDs", Vec::new());

        let logger_sinks = load_logger_sinks(config);

        Ok(Self {
            service_name: config.get_or("service.name", "engine".to_string()),
            working_dir: config.get_or("service.working_dir", ".".to_string()),
            debug_features,
            include_app_ids,
            server,
            app_source,
            apps_pull_interval_secs: config.get_or("apps.pull_interval_secs", 30u64),
            timezone: config.get_or("service.timezone", "UTC".to_string()),
            logger_sinks,
            metric_endpoint: config.get("metrics.endpoint").ok(),
        })
    }

    pub fn debug_feature(&self, name: &str) -> bool {
        self.debug_features.get(name).copied().unwrap_or(false)
    }
}

fn load_logger_sinks(config: &ConfigStore) -> Vec<LoggerSinkConfig> {
    let roles: Vec<String> = config.get("logging.roles").unwrap_or_default();
    if roles.is_empty() {
        return vec![LoggerSinkConfig { role: "app".to_string(), target: LoggerTarget::Stdout, level: "info".to_string() }];
    }

    roles
        .into_iter()
        .map(|role| {
            let prefix = format!("logging.sinks.{role}");
            let kind: String = config.get_or(&format!("{prefix}.kind"), "stdout".to_string());
            let target = match kind.as_str() {
                "tcp" => LoggerTarget::Tcp {
                    host: config.get_or(&format!("{prefix}.host"), "127.0.0.1".to_string()),
                    port: config.get_or(&format!("{prefix}.port"), 5170u16),
                },
                _ => LoggerTarget::Stdout,
            };
            LoggerSinkConfig {
                level: config.get_or(&format!("{prefix}.level"), "info".to_string()),
                role,
                target,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unconfigured() {
        let config = ConfigStore::empty();
        let engine_config = EngineConfig::from_config(&config).unwrap();
        assert_eq!(engine_config.server.host, "0.0.0.0");
        assert_eq!(engine_config.server.port, 8080);
        assert!(matches!(engine_config.app_source, AppSource::LocalFs { .. }));
        assert_eq!(engine_config.logger_sinks.len(), 1);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let yaml = r#"
service:
  name: "acme-engine"
  timezone: "America/New_York"
server:
  port: 9090
apps:
  source:
    kind: "zipped_object_storage"
    bucket: "apps-bucket"
    prefix: "prod/"
"#;
        let config = ConfigStore::from_yaml_str(yaml, "test").unwrap();
        let engine_config = EngineConfig::from_config(&config).unwrap();
        assert_eq!(engine_config.service_name, "acme-engine");
        assert_eq!(engine_config.server.port, 9090);
        match engine_config.app_source {
            AppSource::ZippedObjectStorage { bucket, prefix } => {
                assert_eq!(bucket, "apps-bucket");
                assert_eq!(prefix, "prod/");
            }
            _ => panic!("expected zipped object storage app source"),
        }
    }

    #[test]
    fn zipped_object_storage_without_bucket_is_an_error() {
        let yaml = "apps:\n  source:\n    kind: \"zipped_object_storage\"\n";
        let config = ConfigStore::from_yaml_str(yaml, "test").unwrap();
        assert!(EngineConfig::from_config(&config).is_err());
    }

    #[test]
    fn debug_features_and_app_id_allowlist_are_read_from_config() {
        let yaml = r#"
debug:
  engine_ignoreBodyProcess: true
  appConfig_includesAppIDs:
    - "acme"
    - "widgets"
"#;
        let config = ConfigStore::from_yaml_str(yaml, "test").unwrap();
        let engine_config = EngineConfig::from_config(&config).unwrap();
        assert!(engine_config.debug_feature("engine_ignoreBodyProcess"));
        assert!(!engine_config.debug_feature("engine_extractDebugHost"));
        assert_eq!(engine_config.include_app_ids, vec!["acme".to_string(), "widgets".to_string()]);
    }
}
