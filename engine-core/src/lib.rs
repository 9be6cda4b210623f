//! Core runtime for a multi-tenant, hot-reloaded HTTP application server
//! (§1-§9): per-app routing and middleware, Config Updater-driven hot
//! reload, a Service Register seeding cluster-unique Snowflake node IDs, and
//! a closed error taxonomy shared by every layer above.

pub mod app_config;
pub mod app_config_provider;
pub mod background;
pub mod config;
pub mod context;
pub mod cors;
pub mod detector;
pub mod engine;
pub mod engine_config;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod middleware;
pub mod resource_group;
pub mod router;
pub mod server;
pub mod service_register;
pub mod typed_store;
pub mod updater;
#[cfg(feature = "ws")]
pub mod ws;

pub mod prelude;
