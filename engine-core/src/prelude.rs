//! Import everything you need with a single `use`.
//!
//! ```ignore
//! use engine_core::prelude::*;
//! ```

pub use crate::app_config::{AllowedOrigin, AppConfig, AppConfigSet, AppHost, CorsOptions, EncryptionKey};
pub use crate::app_config_provider::{AppBuilder, AppConfigProvider, PreparedApp};
pub use crate::context::{Context, Decode, RequestProcessor};
pub use crate::cors::CorsMiddleware;
pub use crate::detector::{AppDetector, Detected, DetectorRequest, HostAppDetector};
pub use crate::engine::{App, Engine, RouteRegistrar, BYPASS_PROCESSING_HEADER};
pub use crate::engine_config::{AppSource, EngineConfig, LoggerSinkConfig, LoggerTarget, ServerConfig};
pub use crate::error::{EngineError, EngineResult, ErrorKind};
pub use crate::hooks::{AppModule, ModuleChain};
pub use crate::logging::{LoggingGuard, VerboseFlags};
pub use crate::middleware::{Invocation, Middleware, RequestHandler, WebSocketHandler};
pub use crate::resource_group::ResourceGroups;
pub use crate::router::{CachedRoute, Component, Endpoint, PathParams, Route, Router};
pub use crate::server;
pub use crate::service_register::model::Model as ServiceRegisterModel;
pub use crate::service_register::snowflake::SnowflakeGenerator;
pub use crate::service_register::store::{InMemoryServiceRegisterStore, ServiceRegisterStore};
pub use crate::service_register::ServiceRegister;
pub use crate::typed_store::TypedStore;
pub use crate::updater::closure::ClosureUpdater;
pub use crate::updater::local_fs::LocalFsUpdater;
pub use crate::updater::zipped_oss::{ObjectStoreLister, ZippedObjectStorageUpdater};
pub use crate::updater::{ConfigUpdater, UpdateInput, UpdateResult};

#[cfg(feature = "ws")]
pub use crate::ws;

pub use engine_http::{Body, HeaderMap, IntoResponse, Method, Request, Response, StatusCode};
