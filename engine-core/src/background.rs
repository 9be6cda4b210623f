//! Background task protocol, grounded in the teacher's `ServiceComponent<S>`
//! (`r2e-core::service`): a long-running component that runs until a shared
//! shutdown token is cancelled. Used by the update scheduler and the
//! Service Register lease renewer (§5 "Background tasks ... run on their own
//! recurring timers").

use std::future::Future;

use tokio_util::sync::CancellationToken;

/// A process-lifetime background task driven from `Engine`.
pub trait BackgroundTask: Send + 'static {
    /// Run until `shutdown` is cancelled (§5 "The lease renewal loop ignores
    /// cancellation signals until the next natural iteration boundary" —
    /// implementations should check `shutdown` only between iterations, not
    /// mid-operation).
    fn run(self, shutdown: CancellationToken) -> impl Future<Output = ()> + Send;
}

/// Periodically invokes `tick` until shutdown, used by the config update
/// scheduler (§4.1 "Scheduling"): reschedule after each completion
/// regardless of outcome; `pullInterval <= 0` means manual-only (never
/// spawned at all).
pub struct IntervalTask<F> {
    interval: std::time::Duration,
    tick: F,
}

impl<F, Fut> IntervalTask<F>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    pub fn new(interval: std::time::Duration, tick: F) -> Self {
        Self { interval, tick }
    }
}

impl<F, Fut> BackgroundTask for IntervalTask<F>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => (self.tick)().await,
            }
        }
    }
}
