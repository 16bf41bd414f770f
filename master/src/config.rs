// master/src/config.rs

use std::{env, path::PathBuf, str::FromStr, time::Duration};

use tracing::warn;

#[derive(Debug, Clone)]
pub struct MasterConfig {
    pub bind: String,
    /// Raíz de los datos del master: jobs/ (estado) e inputs/ (subidas)
    pub data_dir: PathBuf,

    // cuánto tiempo sin heartbeat antes de marcar un worker como no sano
    pub worker_ttl: Duration,
    // cada cuánto corre el monitor de liveness
    pub monitor_interval: Duration,

    pub retry: RetryPolicy,

    // tope de llamadas map simultáneas en vuelo (todas las del master)
    pub max_inflight_maps: usize,

    pub default_split_size: usize,
    pub default_reducers: usize,
    // techo de reducers por job: cada uno es un shard y una tarea
    pub max_reducers: usize,
}

/// Parámetros de tolerancia a fallos de cada llamada remota.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub call_timeout: Duration,
    pub max_attempts: u32,
    pub base_backoff: Duration,
    /// Fallos consecutivos a partir de los cuales el worker entra en cooldown
    pub failure_threshold: u32,
    pub base_cooldown: Duration,
    pub max_cooldown: Duration,
}

impl RetryPolicy {
    /// base_backoff * 2^attempt
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// None mientras no se llegue al umbral; luego crece x2 por fallo hasta max_cooldown.
    pub fn cooldown(&self, consecutive_failures: u32) -> Option<Duration> {
        if consecutive_failures < self.failure_threshold {
            return None;
        }
        let exp = (consecutive_failures - self.failure_threshold).min(16);
        Some(
            self.base_cooldown
                .saturating_mul(2u32.pow(exp))
                .min(self.max_cooldown),
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
            failure_threshold: 2,
            base_cooldown: Duration::from_secs(1),
            max_cooldown: Duration::from_secs(30),
        }
    }
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            data_dir: PathBuf::from("./data"),
            worker_ttl: Duration::from_secs(15),
            monitor_interval: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            max_inflight_maps: 16,
            default_split_size: 5000,
            default_reducers: 2,
            max_reducers: 64,
        }
    }
}

impl MasterConfig {
    /// Lee la configuración de variables de entorno, con defaults para pruebas locales.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            bind: env::var("GRIDMR_BIND").unwrap_or(d.bind),
            data_dir: env::var("GRIDMR_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.data_dir),
            worker_ttl: Duration::from_secs(env_or("GRIDMR_WORKER_TTL_SECS", 15)),
            monitor_interval: Duration::from_secs(env_or("GRIDMR_MONITOR_INTERVAL_SECS", 5)),
            retry: RetryPolicy {
                call_timeout: Duration::from_secs(env_or("GRIDMR_CALL_TIMEOUT_SECS", 10)),
                max_attempts: env_or("GRIDMR_MAX_ATTEMPTS", 3u32).max(1),
                base_backoff: Duration::from_millis(env_or("GRIDMR_BACKOFF_MS", 200)),
                failure_threshold: env_or("GRIDMR_FAILURE_THRESHOLD", 2u32).max(1),
                base_cooldown: Duration::from_secs(env_or("GRIDMR_COOLDOWN_BASE_SECS", 1)),
                max_cooldown: Duration::from_secs(env_or("GRIDMR_COOLDOWN_MAX_SECS", 30)),
            },
            max_inflight_maps: env_or("GRIDMR_MAX_INFLIGHT_MAPS", 16usize).max(1),
            default_split_size: env_or("GRIDMR_DEFAULT_SPLIT", 5000usize).max(1),
            default_reducers: env_or("GRIDMR_DEFAULT_REDUCERS", 2usize).max(1),
            max_reducers: env_or("GRIDMR_MAX_REDUCERS", 64usize).max(1),
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
