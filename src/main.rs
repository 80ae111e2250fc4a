//! chaos-posts server entry point.
//!
//! Loads configuration, wires the store, tracer and fault injector, and
//! serves until Ctrl-C or SIGTERM. The connection pool is closed once,
//! after in-flight requests have drained.

use std::sync::Arc;

use anyhow::Context;

use chaos_posts::api;
use chaos_posts::app_state::AppState;
use chaos_posts::config::{SecretSource, ServiceConfig, StoreBackend};
use chaos_posts::middleware::FaultInjector;
use chaos_posts::persistence::{
    EnvSecretStore, FileSecretStore, InMemoryPostStore, LazyPool, PostStore, PostgresPostStore,
    SecretStore,
};
use chaos_posts::telemetry::{self, DaemonSink, LogSink, SegmentSink, Tracer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ServiceConfig::from_env()?;
    telemetry::init_logging(config.log_format);
    tracing::info!(addr = %config.listen_addr, backend = ?config.store_backend, "starting chaos-posts");

    // Build persistence layer
    let store: Arc<dyn PostStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let secrets: Arc<dyn SecretStore> = match &config.secret_source {
                SecretSource::Env => Arc::new(EnvSecretStore),
                SecretSource::File(dir) => Arc::new(FileSecretStore::new(dir)),
            };
            let pool = LazyPool::new(config.pool.clone(), secrets);
            Arc::new(PostgresPostStore::new(pool, config.statement_timeout))
        }
        StoreBackend::Memory => Arc::new(InMemoryPostStore::new(
            usize::try_from(config.pool.max_connections).unwrap_or(usize::MAX),
            config.pool.acquire_timeout,
        )),
    };

    // Build tracing backend
    let sink: Arc<dyn SegmentSink> = match config.trace_daemon_addr {
        Some(daemon) => Arc::new(
            DaemonSink::connect(daemon).context("binding trace daemon socket failed")?,
        ),
        None => Arc::new(LogSink),
    };
    let tracer = Tracer::new(&config.trace_service_name, sink);

    let fault_injector = Arc::new(FaultInjector::new(config.chaos.clone()));
    tracing::info!(
        enabled = config.chaos.enabled,
        threshold = config.chaos.threshold,
        exempt = %config.chaos.exempt_marker,
        seeded = config.chaos.seed.is_some(),
        "fault injection configured"
    );

    // Build application state and router
    let app_state = AppState {
        store: Arc::clone(&store),
        tracer,
        fault_injector,
    };
    let app = api::build_router(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {} failed", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().await;
    tracing::info!("shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::warn!("received Ctrl-C, shutting down"),
        () = terminate => tracing::warn!("received SIGTERM, shutting down"),
    }
}
