mod config;
mod dispatcher;
mod error;
mod handlers;
mod jobs;
mod monitor;
mod orchestrator;
mod registry;
mod shuffle;
mod split;
mod state;
mod store;
mod strategy;
mod worker_client;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::MasterConfig;
use crate::dispatcher::Dispatcher;
use crate::jobs::JobTable;
use crate::orchestrator::Orchestrator;
use crate::registry::Registry;
use crate::state::AppState;
use crate::store::FileJobStore;
use crate::worker_client::HttpWorkerClient;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gridmr_master=debug,tower_http=info")),
        )
        .init();

    let config = MasterConfig::from_env();
    info!("configuración: {:?}", config);

    let store = FileJobStore::open(config.data_dir.join("jobs")).await?;
    let registry = Arc::new(Registry::new());
    let dispatcher = Dispatcher::new(
        registry.clone(),
        Arc::new(HttpWorkerClient::new()),
        config.retry.clone(),
        config.max_inflight_maps,
    );
    let orchestrator = Orchestrator::new(
        &config,
        dispatcher,
        Arc::new(JobTable::new()),
        Arc::new(store),
    );

    let state = AppState {
        registry: registry.clone(),
        orchestrator,
    };

    // router HTTP
    let app = handlers::build_router(state);

    // monitor de heartbeats en segundo plano
    let cancel = CancellationToken::new();
    let monitor = tokio::spawn(monitor::monitor_workers(
        registry,
        config.monitor_interval,
        config.worker_ttl,
        cancel.clone(),
    ));

    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("no se pudo escuchar en {}", config.bind))?;
    info!("master escuchando en {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    monitor.await?;
    info!("master detenido");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("no se pudo escuchar ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("señal de apagado recibida");
}
