mod config;
mod heartbeat;
mod service;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::WorkerConfig;
use crate::service::WorkerState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gridmr_worker=debug")),
        )
        .init();

    let cfg = WorkerConfig::from_env();
    tokio::fs::create_dir_all(&cfg.data_dir)
        .await
        .with_context(|| format!("creando {}", cfg.data_dir.display()))?;

    let state = WorkerState::new(cfg.name.clone(), cfg.data_dir.clone());
    let app = service::build_router(state.clone());

    // registro + heartbeats en segundo plano
    let cancel = CancellationToken::new();
    let hb = tokio::spawn(heartbeat::run_heartbeat(
        cfg.clone(),
        state.in_flight.clone(),
        cancel.clone(),
    ));

    let listener = TcpListener::bind(&cfg.bind)
        .await
        .with_context(|| format!("no se pudo escuchar en {}", cfg.bind))?;
    info!(
        "worker {} escuchando en {} (anunciado como {}, capacity={})",
        cfg.name,
        listener.local_addr()?,
        cfg.address,
        cfg.capacity
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("señal de apagado recibida");
        })
        .await?;

    cancel.cancel();
    hb.await?;
    info!("worker detenido");
    Ok(())
}
