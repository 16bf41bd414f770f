use std::{env, path::PathBuf, str::FromStr, time::Duration};

use tracing::warn;

const DEFAULT_WORKER_CAPACITY: u32 = 2;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub bind: String,
    /// Dirección con la que el master llega a este worker
    pub address: String,
    pub name: String,
    pub capacity: u32,
    pub master_url: String,
    /// Donde se guardan los splits subidos con /upload
    pub data_dir: PathBuf,
    pub heartbeat_every: Duration,
}

impl WorkerConfig {
    /// - En Docker: MASTER_URL=http://master:8080, WORKER_ADDRESS=http://worker1:9000
    /// - Local: defaults contra localhost
    pub fn from_env() -> Self {
        let name = env::var("WORKER_NAME").unwrap_or_else(|_| {
            hostname::get()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string()
        });

        Self {
            bind: env::var("WORKER_BIND").unwrap_or_else(|_| "0.0.0.0:9000".to_string()),
            address: env::var("WORKER_ADDRESS")
                .unwrap_or_else(|_| "http://localhost:9000".to_string()),
            name,
            capacity: env_or("WORKER_CAPACITY", DEFAULT_WORKER_CAPACITY).max(1),
            master_url: env::var("MASTER_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            data_dir: env::var("WORKER_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./worker-data")),
            heartbeat_every: Duration::from_secs(env_or("WORKER_HEARTBEAT_SECS", 5u64).max(1)),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse::<T>().unwrap_or_else(|_| {
            warn!("valor inválido para {}={:?}, usando default", key, raw);
            default
        }),
        Err(_) => default,
    }
}
