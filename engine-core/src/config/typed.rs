use super::{ConfigError, ConfigStore};

/// Metadata about a single configuration property.
#[derive(Debug, Clone)]
pub struct PropertyMeta {
    /// Relative key (e.g., `"pool_size"`).
    pub key: String,
    /// Absolute key (e.g., `"server.port"`).
    pub full_key: String,
    /// Rust type name (e.g., `"i64"`).
    pub type_name: &'static str,
    /// Whether the property is required (no default and not `Option`).
    pub required: bool,
    /// Default value as a string, if any.
    pub default_value: Option<String>,
    /// Description, surfaced in validation diagnostics.
    pub description: Option<String>,
    /// Whether this entry describes a nested section rather than a leaf value.
    pub is_section: bool,
    /// Explicit environment-variable override name, if different from the
    /// `FULL_KEY_UPPERCASED` convention.
    pub env_var: Option<String>,
}

impl PropertyMeta {
    pub fn leaf(key: &str, full_key: &str, type_name: &'static str, required: bool) -> Self {
        Self {
            key: key.to_string(),
            full_key: full_key.to_string(),
            type_name,
            required,
            default_value: None,
            description: None,
            is_section: false,
            env_var: None,
        }
    }
}

/// Trait for strongly-typed configuration sections, hand-implemented for the
/// handful of sections the engine itself needs (server binding, app source,
/// resource groups, logging). There is no derive macro in this crate; each
/// section writes its own `from_config` the way a one-off `ConfigProperties`
/// impl would look if expanded by hand.
pub trait ConfigProperties: Sized {
    /// The configuration key prefix (e.g., `"server"`).
    fn prefix() -> &'static str;

    /// Metadata about all expected properties, used by [`super::validate_section`].
    fn properties_metadata() -> Vec<PropertyMeta>;

    /// Construct from a [`ConfigStore`] instance.
    fn from_config(config: &ConfigStore) -> Result<Self, ConfigError>;
}
