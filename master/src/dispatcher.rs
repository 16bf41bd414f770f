// master/src/dispatcher.rs

use std::{
    collections::HashSet,
    future::Future,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use common::{wordcount, Counts, MapRequest, ReduceRequest, WorkerAddr};
use tokio::{
    sync::Semaphore,
    time::{sleep, timeout},
};
use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::error::DispatchError;
use crate::registry::Registry;
use crate::split::{Split, SplitPayload};
use crate::strategy::{Executed, RemoteThenLocal};
use crate::worker_client::WorkerClient;

/// Envuelve cada llamada a un worker con timeout, reintentos con backoff
/// exponencial y cooldown por worker. Lee el registry para elegir destino y
/// le escribe el resultado de cada llamada.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    client: Arc<dyn WorkerClient>,
    policy: RetryPolicy,
    // tope global de maps en vuelo
    map_gate: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        client: Arc<dyn WorkerClient>,
        policy: RetryPolicy,
        max_inflight_maps: usize,
    ) -> Self {
        Self {
            registry,
            client,
            policy,
            map_gate: Arc::new(Semaphore::new(max_inflight_maps.max(1))),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Una llamada a un worker concreto, con hasta `max_attempts` intentos.
    /// Cada intento suma en `attempts` y pasa por begin/finish del registry.
    pub async fn call<T, F, Fut>(
        &self,
        worker: &str,
        op: &'static str,
        attempts: &AtomicU32,
        f: F,
    ) -> Result<T, DispatchError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, DispatchError>>,
    {
        let mut last_err = None;

        for attempt in 0..self.policy.max_attempts {
            attempts.fetch_add(1, Ordering::Relaxed);
            self.registry.begin_call(worker);

            let res = match timeout(self.policy.call_timeout, f()).await {
                Ok(r) => r,
                Err(_) => Err(DispatchError::Timeout {
                    worker: worker.to_string(),
                }),
            };

            self.registry.finish_call(
                worker,
                res.as_ref().map(|_| ()).map_err(|e| e.to_string()),
                &self.policy,
            );

            match res {
                Ok(v) => return Ok(v),
                Err(e) => {
                    warn!("{} en {} falló (intento {}): {}", op, worker, attempt + 1, e);
                    last_err = Some(e);

                    let cooling = self
                        .registry
                        .get(worker)
                        .map_or(false, |w| w.cooling_down(std::time::Instant::now()));
                    if cooling || attempt + 1 >= self.policy.max_attempts {
                        break;
                    }
                    sleep(self.policy.backoff(attempt)).await;
                }
            }
        }

        Err(last_err.unwrap_or(DispatchError::Exhausted { tried: 0 }))
    }

    /// Map de un split: rota entre workers y, si todos fallan, cuenta en local.
    pub async fn map_split(
        &self,
        job_id: &str,
        split: &Split,
        attempts: &AtomicU32,
    ) -> Executed<Counts> {
        let _permit = match self.map_gate.acquire().await {
            Ok(permit) => Some(permit),
            Err(e) => {
                warn!(
                    "gate de maps cerrado ({}), split {} del job {} sin límite",
                    e, split.index, job_id
                );
                None
            }
        };

        RemoteThenLocal::new("map", || split.count_locally())
            .run(self.map_rotating(job_id, split, attempts))
            .await
    }

    async fn map_rotating(
        &self,
        job_id: &str,
        split: &Split,
        attempts: &AtomicU32,
    ) -> Result<(WorkerAddr, Counts), DispatchError> {
        let total = self.registry.len();
        if total == 0 {
            return Err(DispatchError::NoWorkers);
        }

        let mut tried: HashSet<WorkerAddr> = HashSet::new();
        while tried.len() < total {
            let Some(w) = self.registry.next_candidate(&tried) else {
                break;
            };
            tried.insert(w.address.clone());

            match self.map_on(&w.address, job_id, split, attempts).await {
                Ok(counts) => {
                    debug!("split {} del job {} resuelto por {}", split.index, job_id, w.address);
                    return Ok((w.address, counts));
                }
                Err(e) => warn!(
                    "split {} del job {}: worker {} agotado ({}), rotando",
                    split.index, job_id, w.address, e
                ),
            }
        }

        Err(DispatchError::Exhausted { tried: tried.len() })
    }

    async fn map_on(
        &self,
        worker: &str,
        job_id: &str,
        split: &Split,
        attempts: &AtomicU32,
    ) -> Result<Counts, DispatchError> {
        let req = match &split.payload {
            SplitPayload::Inline(text) => MapRequest {
                job_id: job_id.to_string(),
                split_id: split.index,
                chunk: Some(text.clone()),
                path: None,
            },
            SplitPayload::Bytes { .. } => {
                let path = self
                    .call(worker, "upload", attempts, || {
                        self.client
                            .upload(worker, job_id, split.index, split.raw_bytes().to_vec())
                    })
                    .await?;
                MapRequest {
                    job_id: job_id.to_string(),
                    split_id: split.index,
                    chunk: None,
                    path: Some(path),
                }
            }
        };

        self.call(worker, "map", attempts, || self.client.map(worker, &req))
            .await
    }

    /// Reduce de un shard: primero el reducer elegido, luego los demás workers
    /// sanos por turno; si todos fallan, merge local.
    pub async fn reduce_shard(&self, job_id: &str, shard: Counts, preferred: &str) -> Executed<Counts> {
        let req = ReduceRequest {
            job_id: job_id.to_string(),
            partials: vec![shard],
        };

        RemoteThenLocal::new("reduce", || wordcount::merge_counts(&req.partials))
            .run(self.reduce_rotating(&req, preferred))
            .await
    }

    async fn reduce_rotating(
        &self,
        req: &ReduceRequest,
        preferred: &str,
    ) -> Result<(WorkerAddr, Counts), DispatchError> {
        let attempts = AtomicU32::new(0);
        let mut tried: HashSet<WorkerAddr> = HashSet::new();
        let mut next = Some(preferred.to_string());

        while let Some(worker) = next.take() {
            tried.insert(worker.clone());
            match self
                .call(&worker, "reduce", &attempts, || self.client.reduce(&worker, req))
                .await
            {
                Ok(counts) => return Ok((worker, counts)),
                Err(e) => warn!("reduce del job {} en {} falló: {}", req.job_id, worker, e),
            }

            // sanos primero: el primer candidato no sano corta la rotación
            next = self
                .registry
                .next_candidate(&tried)
                .filter(|w| w.healthy)
                .map(|w| w.address);
        }

        Err(DispatchError::Exhausted { tried: tried.len() })
    }
}
