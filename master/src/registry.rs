// master/src/registry.rs

use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use common::{WorkerAddr, WorkerHeartbeatRequest, WorkerRegisterRequest, WorkerView};
use tracing::{info, warn};

use crate::config::RetryPolicy;
use crate::error::DispatchError;

const DEFAULT_CAPACITY: u32 = 1;

#[derive(Debug, Clone)]
pub struct WorkerInfo {
    pub address: WorkerAddr,
    pub name: Option<String>,
    pub capacity: u32,
    /// Llamadas en vuelo según el master (lo que usa el scheduling)
    pub in_flight: u32,
    /// Lo que reporta el worker en su heartbeat (solo diagnóstico)
    pub reported_in_flight: Option<u32>,
    pub healthy: bool,
    pub last_error: Option<String>,
    pub last_seen: Instant,

    pub consecutive_failures: u32,
    pub cooldown_until: Option<Instant>,

    pub cpu_percent: Option<f32>,
    pub mem_bytes: Option<u64>,
}

impl WorkerInfo {
    fn new(address: WorkerAddr, now: Instant) -> Self {
        Self {
            address,
            name: None,
            capacity: DEFAULT_CAPACITY,
            in_flight: 0,
            reported_in_flight: None,
            healthy: true,
            last_error: None,
            last_seen: now,
            consecutive_failures: 0,
            cooldown_until: None,
            cpu_percent: None,
            mem_bytes: None,
        }
    }

    /// Carga fraccional: en vuelo / capacidad declarada.
    pub fn load(&self) -> f64 {
        self.in_flight as f64 / self.capacity.max(1) as f64
    }

    pub fn cooling_down(&self, now: Instant) -> bool {
        self.cooldown_until.map_or(false, |until| now < until)
    }
}

/// sanos primero, luego menor carga fraccional, luego menos tareas en vuelo
fn rank(a: &WorkerInfo, b: &WorkerInfo) -> Ordering {
    b.healthy
        .cmp(&a.healthy)
        .then_with(|| a.load().total_cmp(&b.load()))
        .then_with(|| a.in_flight.cmp(&b.in_flight))
        .then_with(|| a.address.cmp(&b.address))
}

/// Directorio de workers conocidos. Único dueño de las mutaciones de `WorkerInfo`.
#[derive(Debug, Default)]
pub struct Registry {
    workers: Mutex<HashMap<WorkerAddr, WorkerInfo>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<WorkerAddr, WorkerInfo>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, req: &WorkerRegisterRequest) {
        let is_new = self.upsert(&req.address, req.name.clone(), req.capacity, Instant::now(), |_| {});
        info!(
            "worker registrado: {} (nuevo={}, capacity={:?})",
            req.address, is_new, req.capacity
        );
    }

    pub fn heartbeat(&self, req: &WorkerHeartbeatRequest) {
        let is_new = self.upsert(&req.address, req.name.clone(), req.capacity, Instant::now(), |w| {
            w.reported_in_flight = req.in_flight;
            w.cpu_percent = req.cpu_percent;
            w.mem_bytes = req.mem_bytes;
        });
        if is_new {
            info!("worker {} conocido por primer heartbeat", req.address);
        }
    }

    /// Alta o actualización por dirección. Refresca last_seen y marca sano.
    /// Devuelve true si el worker no existía.
    fn upsert<F>(
        &self,
        address: &str,
        name: Option<String>,
        capacity: Option<u32>,
        now: Instant,
        extra: F,
    ) -> bool
    where
        F: FnOnce(&mut WorkerInfo),
    {
        let mut workers = self.lock();
        let is_new = !workers.contains_key(address);
        let w = workers
            .entry(address.to_string())
            .or_insert_with(|| WorkerInfo::new(address.to_string(), now));

        if name.is_some() {
            w.name = name;
        }
        if let Some(cap) = capacity.filter(|c| *c > 0) {
            w.capacity = cap;
        }
        if !w.healthy {
            info!("worker {} vuelve a estar sano", address);
        }
        w.healthy = true;
        w.last_seen = now;
        extra(w);
        is_new
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn list(&self) -> Vec<WorkerInfo> {
        let mut out: Vec<WorkerInfo> = self.lock().values().cloned().collect();
        out.sort_by(|a, b| a.address.cmp(&b.address));
        out
    }

    pub fn get(&self, address: &str) -> Option<WorkerInfo> {
        self.lock().get(address).cloned()
    }

    pub fn views(&self) -> Vec<WorkerView> {
        let now = Instant::now();
        self.list()
            .into_iter()
            .map(|w| WorkerView {
                last_seen_secs_ago: now.saturating_duration_since(w.last_seen).as_secs(),
                cooling_down: w.cooling_down(now),
                address: w.address,
                name: w.name,
                capacity: w.capacity,
                in_flight: w.in_flight,
                reported_in_flight: w.reported_in_flight,
                healthy: w.healthy,
                last_error: w.last_error,
                consecutive_failures: w.consecutive_failures,
                cpu_percent: w.cpu_percent,
                mem_bytes: w.mem_bytes,
            })
            .collect()
    }

    /// Workers fuera de cooldown; si todos están en cooldown, todos.
    fn eligible(workers: &HashMap<WorkerAddr, WorkerInfo>, now: Instant) -> Vec<&WorkerInfo> {
        let ready: Vec<&WorkerInfo> = workers.values().filter(|w| !w.cooling_down(now)).collect();
        if ready.is_empty() {
            workers.values().collect()
        } else {
            ready
        }
    }

    /// El worker sano con menor carga; si no hay sanos, cualquiera.
    pub fn select_one(&self) -> Result<WorkerInfo, DispatchError> {
        let now = Instant::now();
        let workers = self.lock();
        if workers.is_empty() {
            return Err(DispatchError::NoWorkers);
        }
        let mut candidates = Self::eligible(&workers, now);
        candidates.sort_by(|a, b| rank(a, b));
        candidates
            .first()
            .map(|w| (*w).clone())
            .ok_or(DispatchError::NoWorkers)
    }

    /// Los n mejores distintos; si hay menos de n se repite el mejor.
    pub fn select_n(&self, n: usize) -> Result<Vec<WorkerInfo>, DispatchError> {
        let now = Instant::now();
        let workers = self.lock();
        if workers.is_empty() {
            return Err(DispatchError::NoWorkers);
        }
        let mut candidates = Self::eligible(&workers, now);
        candidates.sort_by(|a, b| rank(a, b));

        let mut out: Vec<WorkerInfo> = candidates.iter().take(n).map(|w| (*w).clone()).collect();
        let Some(best) = out.first().cloned() else {
            return Ok(out);
        };
        while out.len() < n {
            out.push(best.clone());
        }
        Ok(out)
    }

    /// Siguiente candidato para rotación: ni probado ya, ni en cooldown.
    pub fn next_candidate(&self, tried: &HashSet<WorkerAddr>) -> Option<WorkerInfo> {
        let now = Instant::now();
        let workers = self.lock();
        workers
            .values()
            .filter(|w| !tried.contains(&w.address) && !w.cooling_down(now))
            .min_by(|a, b| rank(a, b))
            .cloned()
    }

    pub fn begin_call(&self, address: &str) {
        if let Some(w) = self.lock().get_mut(address) {
            w.in_flight += 1;
        }
    }

    /// Cierra una llamada: baja in_flight y aplica el resultado a la salud del worker.
    pub fn finish_call(&self, address: &str, outcome: Result<(), String>, policy: &RetryPolicy) {
        let now = Instant::now();
        let mut workers = self.lock();
        let Some(w) = workers.get_mut(address) else {
            return;
        };
        w.in_flight = w.in_flight.saturating_sub(1);

        match outcome {
            Ok(()) => {
                w.healthy = true;
                w.last_error = None;
                w.last_seen = now;
                w.consecutive_failures = 0;
                w.cooldown_until = None;
            }
            Err(e) => {
                w.healthy = false;
                w.last_error = Some(e);
                w.consecutive_failures += 1;
                if let Some(cd) = policy.cooldown(w.consecutive_failures) {
                    w.cooldown_until = Some(now + cd);
                    warn!(
                        "worker {} en cooldown {:?} tras {} fallos seguidos",
                        address, cd, w.consecutive_failures
                    );
                }
            }
        }
    }

    /// Marca no sanos los workers sin señales hace más de `ttl`.
    /// Devuelve los que cambiaron en esta pasada.
    pub fn sweep_stale(&self, now: Instant, ttl: Duration) -> Vec<WorkerAddr> {
        let mut demoted = Vec::new();
        let mut workers = self.lock();
        for (addr, w) in workers.iter_mut() {
            if !w.healthy {
                continue;
            }
            let elapsed = now.saturating_duration_since(w.last_seen);
            if elapsed > ttl {
                w.healthy = false;
                w.last_error = Some(format!("sin heartbeat hace {:?}", elapsed));
                warn!("marcando worker {} como no sano (sin heartbeat hace {:?})", addr, elapsed);
                demoted.push(addr.clone());
            }
        }
        demoted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(addr: &str, capacity: u32) -> WorkerRegisterRequest {
        WorkerRegisterRequest {
            address: addr.to_string(),
            name: None,
            capacity: Some(capacity),
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            failure_threshold: 2,
            base_cooldown: Duration::from_secs(60),
            max_cooldown: Duration::from_secs(60),
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn register_es_idempotente_por_direccion() {
        let r = Registry::new();
        r.register(&reg("http://w1", 2));
        r.register(&reg("http://w1", 4));
        assert_eq!(r.len(), 1);
        assert_eq!(r.get("http://w1").unwrap().capacity, 4);
    }

    #[test]
    fn heartbeat_crea_worker_desconocido_y_guarda_carga_reportada() {
        let r = Registry::new();
        r.heartbeat(&WorkerHeartbeatRequest {
            address: "http://w9".into(),
            name: Some("nueve".into()),
            capacity: None,
            in_flight: Some(3),
            cpu_percent: Some(12.5),
            mem_bytes: None,
        });
        let w = r.get("http://w9").unwrap();
        assert_eq!(w.capacity, DEFAULT_CAPACITY);
        assert_eq!(w.reported_in_flight, Some(3));
        assert_eq!(w.in_flight, 0);
        assert_eq!(w.name.as_deref(), Some("nueve"));
    }

    #[test]
    fn select_one_sin_workers_falla() {
        let r = Registry::new();
        assert!(matches!(r.select_one(), Err(DispatchError::NoWorkers)));
        assert!(matches!(r.select_n(2), Err(DispatchError::NoWorkers)));
    }

    #[test]
    fn select_one_prefiere_menor_carga_fraccional() {
        let r = Registry::new();
        r.register(&reg("http://a", 1));
        r.register(&reg("http://b", 4));
        // a: 1/1, b: 2/4
        r.begin_call("http://a");
        r.begin_call("http://b");
        r.begin_call("http://b");
        assert_eq!(r.select_one().unwrap().address, "http://b");
    }

    #[test]
    fn select_one_desempata_por_carga_absoluta() {
        let r = Registry::new();
        r.register(&reg("http://a", 2));
        r.register(&reg("http://b", 4));
        // a: 1/2 = 0.5, b: 2/4 = 0.5 -> gana a por menos en vuelo
        r.begin_call("http://a");
        r.begin_call("http://b");
        r.begin_call("http://b");
        assert_eq!(r.select_one().unwrap().address, "http://a");
    }

    #[test]
    fn select_one_prefiere_sanos_y_si_no_hay_usa_cualquiera() {
        let r = Registry::new();
        r.register(&reg("http://a", 1));
        r.register(&reg("http://b", 1));
        let p = RetryPolicy {
            failure_threshold: 100,
            ..policy()
        };

        r.begin_call("http://a");
        r.finish_call("http://a", Err("boom".into()), &p);
        assert_eq!(r.select_one().unwrap().address, "http://b");

        r.begin_call("http://b");
        r.finish_call("http://b", Err("boom".into()), &p);
        assert!(r.select_one().is_ok());
    }

    #[test]
    fn select_n_toma_distintos_y_rellena_con_el_mejor() {
        let r = Registry::new();
        r.register(&reg("http://a", 1));
        r.register(&reg("http://b", 1));
        r.begin_call("http://a");

        let picked: Vec<String> = r.select_n(4).unwrap().into_iter().map(|w| w.address).collect();
        assert_eq!(picked, vec!["http://b", "http://a", "http://b", "http://b"]);

        let two: Vec<String> = r.select_n(2).unwrap().into_iter().map(|w| w.address).collect();
        assert_eq!(two, vec!["http://b", "http://a"]);
    }

    #[test]
    fn worker_en_cooldown_queda_fuera_de_la_seleccion() {
        let r = Registry::new();
        r.register(&reg("http://malo", 8));
        r.register(&reg("http://bueno", 1));
        // el bueno está más cargado, así que sin cooldown ganaría el malo
        r.begin_call("http://bueno");

        let p = policy();
        for _ in 0..p.failure_threshold {
            r.begin_call("http://malo");
            r.finish_call("http://malo", Err("timeout".into()), &p);
        }
        // el heartbeat lo vuelve sano pero no le quita el cooldown
        r.register(&reg("http://malo", 8));

        let w = r.get("http://malo").unwrap();
        assert!(w.cooling_down(Instant::now()));
        assert_eq!(r.select_one().unwrap().address, "http://bueno");
        let picked: Vec<String> = r.select_n(2).unwrap().into_iter().map(|w| w.address).collect();
        assert_eq!(picked, vec!["http://bueno", "http://bueno"]);
        assert!(r.next_candidate(&HashSet::new()).map(|w| w.address) == Some("http://bueno".into()));
    }

    #[test]
    fn un_exito_resetea_fallos_y_cooldown() {
        let r = Registry::new();
        r.register(&reg("http://a", 1));
        let p = policy();
        for _ in 0..3 {
            r.begin_call("http://a");
            r.finish_call("http://a", Err("x".into()), &p);
        }
        assert!(r.get("http://a").unwrap().cooldown_until.is_some());

        r.begin_call("http://a");
        r.finish_call("http://a", Ok(()), &p);
        let w = r.get("http://a").unwrap();
        assert_eq!(w.consecutive_failures, 0);
        assert!(w.cooldown_until.is_none());
        assert!(w.healthy);
        assert!(w.last_error.is_none());
        assert_eq!(w.in_flight, 0);
    }

    #[test]
    fn next_candidate_salta_los_ya_probados() {
        let r = Registry::new();
        r.register(&reg("http://a", 1));
        r.register(&reg("http://b", 1));
        let mut tried = HashSet::new();
        let first = r.next_candidate(&tried).unwrap();
        tried.insert(first.address.clone());
        let second = r.next_candidate(&tried).unwrap();
        assert_ne!(first.address, second.address);
        tried.insert(second.address);
        assert!(r.next_candidate(&tried).is_none());
    }

    #[test]
    fn sweep_stale_marca_no_sanos_tras_el_ttl() {
        let r = Registry::new();
        r.register(&reg("http://a", 1));
        let ttl = Duration::from_secs(10);

        assert!(r.sweep_stale(Instant::now(), ttl).is_empty());
        let later = Instant::now() + Duration::from_secs(11);
        assert_eq!(r.sweep_stale(later, ttl), vec!["http://a".to_string()]);
        assert!(!r.get("http://a").unwrap().healthy);
        // ya marcado: no se reporta de nuevo
        assert!(r.sweep_stale(later, ttl).is_empty());

        r.heartbeat(&WorkerHeartbeatRequest {
            address: "http://a".into(),
            name: None,
            capacity: None,
            in_flight: None,
            cpu_percent: None,
            mem_bytes: None,
        });
        assert!(r.get("http://a").unwrap().healthy);
    }
}
