//! SOAR execution core bootstrap: wires the durable event stream, trigger
//! engine, job queue/worker pool and playbook executor behind a health +
//! metrics HTTP surface and the live progress WebSocket (spec §2, §6).
//!
//! Exit codes (spec §6): `0` on a clean SIGTERM/SIGINT-drained shutdown,
//! `1` on an unexpected fatal error, `2` on startup misconfiguration.

mod live;
mod metrics;

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use soar_actions::builtin;
use soar_actions::mock::MockActionRegistry;
use soar_actions::registry::{ActionRegistry, RegistryError};
use soar_core::config::Config;
use soar_core::telemetry::{init_telemetry, TelemetryConfig};
use soar_engine::bus::{EventBus, LiveChannel, StreamPublisher};
use soar_engine::executor::{ExecutorConfig, PlaybookExecutor};
use soar_engine::queue::{JobQueue, WorkerPool, WorkerPoolConfig};
use soar_engine::trigger::{TriggerEngine, TriggerEngineConfig};
use soar_storage::memory::InMemoryRelationalStore;
use soar_storage::stream::{DurableEventStream, InMemoryEventStream};
use soar_storage::store::RelationalStore;
use tower_http::trace::TraceLayer;

use live::{live_ws_handler, LiveAuthConfig, LiveAuthenticator, LiveState};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(BootstrapError::Misconfiguration(err)) => {
            eprintln!("soar-server: misconfiguration: {err}");
            ExitCode::from(2)
        }
        Err(BootstrapError::Fatal(err)) => {
            eprintln!("soar-server: fatal error: {err}");
            ExitCode::from(1)
        }
    }
}

enum BootstrapError {
    Misconfiguration(anyhow::Error),
    Fatal(anyhow::Error),
}

async fn run() -> Result<(), BootstrapError> {
    let config = Config::from_env().map_err(|err| BootstrapError::Misconfiguration(err.into()))?;

    let mut telemetry_config = TelemetryConfig::from_env();
    if telemetry_config.service_name == "soar-core" {
        telemetry_config.service_name = "soar-server".to_string();
    }
    if telemetry_config.log_filter.is_none() {
        telemetry_config.log_filter = Some("soar=info,tower_http=info".to_string());
    }
    init_telemetry(telemetry_config);

    tracing::info!("soar-server starting");

    let prometheus_handle = metrics::install_recorder().map_err(BootstrapError::Fatal)?;

    let store = build_store().await.map_err(BootstrapError::Fatal)?;
    let stream: Arc<dyn DurableEventStream> = Arc::new(InMemoryEventStream::default());

    if config.event_stream_address.is_some() {
        tracing::warn!(
            "EVENT_STREAM_ADDRESS is set but no external stream backend is wired up; using the in-process stream"
        );
    }

    let action_registry = Arc::new(ActionRegistry::new());
    builtin::register_builtins(&action_registry).map_err(registry_error_to_fatal)?;
    let mock_actions = Arc::new(MockActionRegistry::new());

    let live_channel = LiveChannel::new();
    let event_bus = EventBus::new();
    let publisher = Arc::new(StreamPublisher::new(stream.clone(), event_bus));

    let executor = Arc::new(PlaybookExecutor::new(
        store.clone(),
        action_registry,
        mock_actions,
        live_channel.clone(),
        ExecutorConfig {
            checkpoint_retention: config.checkpoint_retention,
            step_backoff_initial: config.job_backoff_initial,
            step_backoff_max: config.step_retry_cap,
        },
    ));

    let job_queue = Arc::new(JobQueue::new());
    let worker_pool = Arc::new(WorkerPool::new(
        job_queue.clone(),
        executor,
        WorkerPoolConfig {
            concurrency: config.executor_concurrency,
            job_attempts: config.job_attempts,
            backoff_initial: config.job_backoff_initial,
        },
    ));

    let trigger_engine = Arc::new(TriggerEngine::new(
        stream,
        store.clone(),
        job_queue,
        TriggerEngineConfig::default(),
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let mut worker_handles = worker_pool.spawn(shutdown_rx.clone());
    for t in 0..config.trigger_concurrency {
        let engine = trigger_engine.clone();
        let shutdown_rx = shutdown_rx.clone();
        worker_handles.push(tokio::spawn(async move {
            tracing::debug!(trigger_worker = t, "trigger engine consumer started");
            engine.run(shutdown_rx).await;
        }));
    }

    let live_authenticator = Arc::new(LiveAuthenticator::new(&LiveAuthConfig::from_env()));
    let live_state = LiveState {
        channel: live_channel,
        store,
        authenticator: live_authenticator,
        ping_interval: config.live_channel_ping,
        idle_timeout: config.live_channel_timeout,
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics::metrics_handler).with_state(prometheus_handle))
        .route("/soar/live", get(live_ws_handler).with_state(live_state))
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| BootstrapError::Fatal(err.into()))?;
    tracing::info!(%addr, "HTTP server listening");

    let _ = publisher; // held so the bus/stream stay alive for the server's lifetime

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
        .map_err(|err| BootstrapError::Fatal(err.into()))?;

    tracing::info!("shutdown signal received, draining workers");
    let _ = shutdown_tx.send(true);
    for handle in worker_handles {
        let _ = handle.await;
    }
    tracing::info!("soar-server shutdown complete");

    Ok(())
}

async fn build_store() -> anyhow::Result<Arc<dyn RelationalStore>> {
    match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pool = sqlx::PgPool::connect(&url).await?;
            tracing::info!("connected to the relational store");
            Ok(Arc::new(soar_storage::postgres::PostgresRelationalStore::new(pool)))
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set; using the in-memory relational store");
            Ok(Arc::new(InMemoryRelationalStore::new()))
        }
    }
}

fn registry_error_to_fatal(err: RegistryError) -> BootstrapError {
    BootstrapError::Fatal(err.into())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", version: env!("CARGO_PKG_VERSION") })
}

/// Waits for SIGTERM (or Ctrl+C locally) so `axum::serve` can drain
/// in-flight requests before the worker pool and trigger engine are told to
/// stop (spec §6 exit code 0 "clean shutdown").
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
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
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let app = Router::new().route("/health", get(health));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
