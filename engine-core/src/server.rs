//! HTTP server bootstrap (§6 "HTTP server").
//!
//! Binds the configured host:port, runs an initial config pull so the first
//! request has an app map to dispatch into, then spawns the periodic update
//! scheduler and serves until a shutdown signal arrives. Graceful shutdown
//! waits out `shutdown_timeout_secs` for in-flight requests before the
//! process hooks run, the same split the teacher's `AppBuilder::serve` makes
//! between "stop accepting" and "drain".

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::background::{BackgroundTask, IntervalTask};
use crate::engine::Engine;
use crate::engine_config::EngineConfig;
use crate::error::{EngineError, EngineResult};

/// Bind, run one synchronous update so the app map isn't empty at the first
/// request, spawn the pull-interval scheduler, and serve until a shutdown
/// signal arrives (Ctrl-C or SIGTERM).
pub async fn serve(engine: Arc<Engine>, config: &EngineConfig) -> EngineResult<()> {
    engine.update().await?;

    let listener = bind(&config.server.host, config.server.port, config.server.reuse_address)?;
    tracing::info!(host = %config.server.host, port = config.server.port, "engine server listening");

    let shutdown = CancellationToken::new();
    let scheduler = (config.apps_pull_interval_secs > 0)
        .then(|| spawn_update_scheduler(engine.clone(), Duration::from_secs(config.apps_pull_interval_secs), shutdown.clone()));

    let dispatch_engine = engine.clone();
    let router = engine_http::fallback_router(move |request| {
        let engine = dispatch_engine.clone();
        async move { engine.dispatch(request).await }
    });

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_secs);
    let serve_shutdown = shutdown.clone();
    let result = engine_http::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            wait_for_signal().await;
            tracing::info!("shutdown signal received, starting graceful shutdown");
            serve_shutdown.cancel();
        })
        .await;

    // Give the scheduler loop a bounded window to notice cancellation before
    // we drop it; it never holds up an in-flight request, so this is a
    // courtesy, not a correctness requirement.
    if let Some(scheduler) = scheduler {
        let _ = tokio::time::timeout(shutdown_timeout, scheduler).await;
    }

    result.map_err(|err| EngineError::internal(err.to_string()))?;
    tracing::info!("engine server stopped");
    Ok(())
}

fn bind(host: &str, port: u16, reuse_address: bool) -> EngineResult<TcpListener> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|err| EngineError::internal(format!("invalid server address {host}:{port}: {err}")))?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(|err| EngineError::internal(format!("failed to create listening socket: {err}")))?;
    socket
        .set_reuse_address(reuse_address)
        .map_err(|err| EngineError::internal(format!("failed to set SO_REUSEADDR: {err}")))?;
    socket
        .bind(&addr.into())
        .map_err(|err| EngineError::internal(format!("failed to bind {addr}: {err}")))?;
    socket
        .listen(1024)
        .map_err(|err| EngineError::internal(format!("failed to listen on {addr}: {err}")))?;
    socket
        .set_nonblocking(true)
        .map_err(|err| EngineError::internal(format!("failed to set non-blocking: {err}")))?;

    TcpListener::from_std(socket.into())
        .map_err(|err| EngineError::internal(format!("failed to hand listener to tokio: {err}")))
}

fn spawn_update_scheduler(engine: Arc<Engine>, interval: Duration, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
    let task = IntervalTask::new(interval, move || {
        let engine = engine.clone();
        async move {
            if let Err(err) = engine.update().await {
                tracing::error!(%err, "scheduled app config update failed");
            }
        }
    });
    tokio::spawn(task.run(shutdown))
}

async fn wait_for_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
