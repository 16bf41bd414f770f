use serde::{Deserialize, Serialize};

/// Un worker se identifica por su dirección alcanzable, ej: "http://10.0.0.5:9000".
pub type WorkerAddr = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRegisterRequest {
    pub address: WorkerAddr,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub capacity: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRegisterResponse {
    pub address: WorkerAddr,
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHeartbeatRequest {
    pub address: WorkerAddr,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub capacity: Option<u32>,
    /// Tareas en vuelo según el propio worker (solo diagnóstico)
    #[serde(default)]
    pub in_flight: Option<u32>,
    #[serde(default)]
    pub cpu_percent: Option<f32>,
    #[serde(default)]
    pub mem_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHeartbeatResponse {
    pub ok: bool,
}

/// Vista de un worker para `GET /api/v1/workers`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WorkerView {
    pub address: WorkerAddr,
    pub name: Option<String>,
    pub capacity: u32,
    pub in_flight: u32,
    pub reported_in_flight: Option<u32>,
    pub healthy: bool,
    pub last_error: Option<String>,
    pub last_seen_secs_ago: u64,
    pub consecutive_failures: u32,
    pub cooling_down: bool,
    pub cpu_percent: Option<f32>,
    pub mem_bytes: Option<u64>,
}
