use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use common::{WorkerHeartbeatRequest, WorkerRegisterRequest, WorkerRegisterResponse};
use reqwest::Client;
use sysinfo::{CpuExt, System, SystemExt};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;

const MAX_REGISTER_BACKOFF: Duration = Duration::from_secs(30);

async fn register(client: &Client, cfg: &WorkerConfig) -> Result<WorkerRegisterResponse> {
    let url = format!("{}/api/v1/workers/register", cfg.master_url);
    let resp = client
        .post(&url)
        .json(&WorkerRegisterRequest {
            address: cfg.address.clone(),
            name: Some(cfg.name.clone()),
            capacity: Some(cfg.capacity),
        })
        .send()
        .await?
        .error_for_status()?;
    Ok(resp.json().await?)
}

/// Se registra en el master (reintentando con backoff) y después manda un
/// heartbeat con carga, CPU y memoria cada `heartbeat_every`, hasta que se
/// cancele el token.
pub async fn run_heartbeat(cfg: WorkerConfig, in_flight: Arc<AtomicU32>, cancel: CancellationToken) {
    let client = Client::new();

    // 1) Registro
    let mut backoff = Duration::from_millis(500);
    loop {
        match register(&client, &cfg).await {
            Ok(r) => {
                info!("worker {} registrado en {} (ok={})", r.address, cfg.master_url, r.ok);
                break;
            }
            Err(e) => {
                warn!("no se pudo registrar en {}: {:#}, reintento en {:?}", cfg.master_url, e, backoff);
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(MAX_REGISTER_BACKOFF);
            }
        }
    }

    // 2) Heartbeats periódicos
    let hb_url = format!("{}/api/v1/workers/heartbeat", cfg.master_url);
    let mut sys = System::new_all();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("heartbeat detenido");
                return;
            }
            _ = sleep(cfg.heartbeat_every) => {}
        }

        sys.refresh_cpu();
        sys.refresh_memory();

        let req = WorkerHeartbeatRequest {
            address: cfg.address.clone(),
            name: Some(cfg.name.clone()),
            capacity: Some(cfg.capacity),
            in_flight: Some(in_flight.load(Ordering::SeqCst)),
            cpu_percent: Some(sys.global_cpu_info().cpu_usage()),
            mem_bytes: Some(sys.used_memory()),
        };

        match client.post(&hb_url).json(&req).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!("heartbeat ok (in_flight={:?})", req.in_flight)
            }
            Ok(resp) => warn!("master respondió {} al heartbeat", resp.status()),
            Err(e) => warn!("heartbeat falló: {}", e),
        }
    }
}
