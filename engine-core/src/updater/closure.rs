//! `ClosureUpdater`: wraps a user-supplied async closure (§4.7, the
//! "programmatic source" named in the ambient stack overview).

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::middleware::BoxFuture;
use crate::updater::{ConfigUpdater, UpdateInput, UpdateResult};

type UpdateFn = dyn Fn(UpdateInput) -> BoxFuture<'static, EngineResult<UpdateResult>> + Send + Sync;

/// Useful for embedding the engine in a host application or for tests that
/// want full control over what an update cycle returns without touching the
/// filesystem.
pub struct ClosureUpdater {
    f: Box<UpdateFn>,
}

impl ClosureUpdater {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(UpdateInput) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = EngineResult<UpdateResult>> + Send + 'static,
    {
        Self { f: Box::new(move |input| Box::pin(f(input))) }
    }
}

#[async_trait]
impl ConfigUpdater for ClosureUpdater {
    async fn update(&self, input: UpdateInput) -> EngineResult<UpdateResult> {
        (self.f)(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::{AppConfig, AppConfigSet};

    #[tokio::test]
    async fn delegates_to_the_wrapped_closure() {
        let updater = ClosureUpdater::new(|_input| async {
            let mut result = UpdateResult::default();
            result.updated_app_configs.insert("acme".to_string(), AppConfigSet::new(AppConfig::new("acme")));
            Ok(result)
        });

        let result = updater.update(UpdateInput::new("/unused")).await.unwrap();
        assert!(result.updated_app_configs.contains_key("acme"));
    }
}
