//! The module protocol (§9 "Inheritance elimination"): a single interface
//! with optional hooks and no-op defaults, replacing the source's handful of
//! abstract module roles. Grounded in the teacher's two-phase `Plugin` /
//! `PreStatePlugin` traits (`r2e-core::plugin`), simplified to one trait
//! since this crate has no pre-state bean-provisioning phase to split out.

use crate::app_config::AppConfigSet;
use crate::error::EngineResult;

/// A unit of cross-cutting functionality installed into the [`crate::engine::Engine`].
///
/// Every method has a no-op default; implementors override only the hooks
/// they need. `on_app_will_prepare` runs once per app during the update
/// cycle (§4.1 step 2), before the router and middleware chain are built, so
/// a module can validate or enrich the parsed config ahead of route
/// compilation.
pub trait AppModule: Send + Sync + 'static {
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Called once per app, right after its `AppConfigSet` is parsed and
    /// before the router is compiled. Returning an error fails that single
    /// app's build (§4.1 failure policy: the prior version stays live).
    fn on_app_will_prepare(&self, _app: &AppConfigSet) -> EngineResult<()> {
        Ok(())
    }

    /// Called once an app has been published and is live.
    fn on_app_ready(&self, _app_id: &str) {}

    /// Called once, during Engine shutdown, after the listener stops
    /// accepting new connections.
    fn on_engine_shutdown(&self) {}
}

/// Ordered collection of installed modules, invoked in registration order.
#[derive(Default)]
pub struct ModuleChain {
    modules: Vec<Box<dyn AppModule>>,
}

impl ModuleChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: impl AppModule) {
        self.modules.push(Box::new(module));
    }

    pub fn run_app_will_prepare(&self, app: &AppConfigSet) -> EngineResult<()> {
        for module in &self.modules {
            module.on_app_will_prepare(app)?;
        }
        Ok(())
    }

    pub fn run_app_ready(&self, app_id: &str) {
        for module in &self.modules {
            module.on_app_ready(app_id);
        }
    }

    pub fn run_engine_shutdown(&self) {
        for module in &self.modules {
            module.on_engine_shutdown();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
