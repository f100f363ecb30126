//! CORTEX's entry point: parses CLI flags, opens the embedded store,
//! assembles every collaborator crate into one `GatewayState`, starts the
//! background health poller and usage writer pool, and serves the router
//! built by `cortex-gateway` (spec.md §5, §6).
//!
//! Grounded on the teacher's `server/src/main.rs` `#[tokio::main]` shape
//! (tracing init, clap parse, then state construction); this server has no
//! mode dispatch (native-messaging/WebRTC) since spec.md's surface is HTTP
//! only, and no port-killing helper since a self-hosted gateway process
//! shouldn't ever clobber another process on its configured port.

mod config;

use std::sync::Arc;

use clap::Parser;
use cortex_auth::rate_limit::{RateLimitConfig, RateLimitStore};
use cortex_auth::session::InMemorySessionStore;
use cortex_common::clock::SystemClock;
use cortex_common::config_env::EnvConfig;
use cortex_controller::container::ContainerDriver;
use cortex_controller::controller::ContainerController;
use cortex_deploy::JobRunner;
use cortex_gateway::state::GatewayState;
use cortex_health::poller::{HealthPoller, PollerConfig};
use cortex_health::snapshots::SnapshotStore;
use cortex_registry::{ApiKeyStore, ModelRegistry, OrganizationDirectory, Store, UserDirectory};
use cortex_selector::breaker::{BreakerConfig, BreakerRegistry};
use cortex_selector::selector::UpstreamSelector;
use cortex_usage::queue::UsageQueue;
use cortex_usage::recorder::{UsageRecorder, WorkerPool};
use cortex_registry::UsageStore;
use tokio_util::sync::CancellationToken;

use crate::config::CliArgs;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    cortex_common::logging::init_tracing(&args.log_filter);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting cortex-server");

    let env = Arc::new(EnvConfig::from_env());
    let clock = Arc::new(SystemClock);
    let http = reqwest::Client::new();

    std::fs::create_dir_all(&args.db_path)?;
    let store = Arc::new(Store::open(&args.db_path)?);

    let registry = Arc::new(ModelRegistry::new(store.clone()));
    let api_keys = Arc::new(ApiKeyStore::new(store.clone()));
    let users = Arc::new(UserDirectory::new(store.clone()));
    let organizations = Arc::new(OrganizationDirectory::new(store.clone()));
    let usage_store = Arc::new(UsageStore::new(store.clone()));

    let driver = Arc::new(ContainerDriver::connect()?);
    let controller = Arc::new(ContainerController::new(
        registry.clone(),
        driver,
        http.clone(),
        clock.clone() as Arc<dyn cortex_common::clock::Clock>,
        env.offline_mode,
    ));

    let breaker = Arc::new(BreakerRegistry::new(BreakerConfig::default(), clock.clone() as Arc<dyn cortex_common::clock::Clock>));
    let selector = Arc::new(UpstreamSelector::new(registry.clone(), breaker.clone()));
    let health = Arc::new(SnapshotStore::new());

    let rate_limiter = Arc::new(RateLimitStore::new(RateLimitConfig::default(), clock.clone() as Arc<dyn cortex_common::clock::Clock>));
    let sessions: Arc<dyn cortex_auth::SessionStore> = Arc::new(InMemorySessionStore::new());

    let usage_queue = UsageQueue::new(args.usage_queue_capacity);
    let usage = UsageRecorder::new(usage_queue.clone());
    let usage_workers = Arc::new(WorkerPool::new(usage_queue, usage_store, args.usage_workers));

    let jobs = Arc::new(JobRunner::new(store.clone()));
    let metrics_handle = cortex_metrics::install_recorder();

    let state = Arc::new(GatewayState {
        store,
        registry: registry.clone(),
        controller,
        selector,
        breaker: breaker.clone(),
        health: health.clone(),
        api_keys,
        users,
        organizations,
        sessions,
        rate_limiter,
        usage,
        jobs,
        http: http.clone(),
        metrics_handle,
        clock: clock.clone() as Arc<dyn cortex_common::clock::Clock>,
        env,
    });

    let shutdown = CancellationToken::new();

    let poller = Arc::new(HealthPoller::new(registry, breaker, health, http, PollerConfig::default()));
    let poller_handle = tokio::spawn(poller.run(shutdown.clone()));
    let usage_handles = usage_workers.spawn(shutdown.clone());

    let router = cortex_gateway::build_router(state);
    let addr = format!("0.0.0.0:{}", args.port);
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutting down background tasks");
    shutdown.cancel();
    let _ = poller_handle.await;
    for handle in usage_handles {
        let _ = handle.await;
    }

    Ok(())
}

/// Waits for Ctrl-C or, on Unix, SIGTERM — mirrors the teacher's own
/// graceful-shutdown wiring in `appstate`'s orchestrator shutdown path.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl-C handler");
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
