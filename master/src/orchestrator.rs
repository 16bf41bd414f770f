// master/src/orchestrator.rs

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Instant,
};

use common::{
    is_valid_job_id, wordcount, Counts, JobId, JobState, JobStatus, SubmitFileRequest,
    SubmitTextRequest, WorkerAddr,
};
use tokio::{fs, task::JoinSet};
use tracing::{info, warn};

use crate::config::MasterConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{JobError, SubmitError};
use crate::jobs::JobTable;
use crate::registry::Registry;
use crate::shuffle;
use crate::split::{self, Split};
use crate::store::JobStore;
use crate::strategy::Placement;

/// Input ya validado de un job.
enum JobInput {
    Text(String),
    /// Contenido completo de un input subido
    Bytes(Arc<Vec<u8>>),
}

/// Lo que deja un job que terminó bien.
struct Finished {
    result: Counts,
    reducers: Vec<WorkerAddr>,
}

/// Ciclo de vida completo de un job:
/// split -> map (concurrencia acotada) -> shuffle -> reduce -> merge -> persistir.
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<Registry>,
    dispatcher: Dispatcher,
    jobs: Arc<JobTable>,
    store: Arc<dyn JobStore>,
    inputs_dir: PathBuf,
    default_split_size: usize,
    default_reducers: usize,
    max_reducers: usize,
}

/// Tamaños no positivos o ausentes -> default.
fn positive_or(value: Option<i64>, default: usize) -> usize {
    match value {
        Some(v) if v > 0 => usize::try_from(v).unwrap_or(default),
        _ => default,
    }
}

impl Orchestrator {
    pub fn new(
        config: &MasterConfig,
        dispatcher: Dispatcher,
        jobs: Arc<JobTable>,
        store: Arc<dyn JobStore>,
    ) -> Self {
        Self {
            registry: dispatcher.registry().clone(),
            dispatcher,
            jobs,
            store,
            inputs_dir: config.data_dir.join("inputs"),
            default_split_size: config.default_split_size.max(1),
            default_reducers: config.default_reducers.max(1),
            max_reducers: config.max_reducers.max(1),
        }
    }

    pub fn input_path(&self, job_id: &str) -> PathBuf {
        self.inputs_dir.join(format!("{job_id}.txt"))
    }

    /// Guarda el input de un job para un `submit_file` posterior.
    pub async fn store_input(&self, job_id: &str, bytes: &[u8]) -> Result<PathBuf, SubmitError> {
        if !is_valid_job_id(job_id) {
            return Err(SubmitError::InvalidJobId(job_id.to_string()));
        }
        if self.exists(job_id).await {
            return Err(SubmitError::DuplicateJob(job_id.to_string()));
        }
        let path = self.input_path(job_id);
        let write = async {
            fs::create_dir_all(&self.inputs_dir).await?;
            fs::write(&path, bytes).await
        };
        if let Err(e) = write.await {
            warn!("no se pudo guardar el input de {}: {}", job_id, e);
            return Err(SubmitError::Storage(e.to_string()));
        }
        info!("input del job {} guardado en {} ({} bytes)", job_id, path.display(), bytes.len());
        Ok(path)
    }

    /// Estado de un job: tabla en memoria, si no el store durable.
    pub async fn status(&self, job_id: &str) -> anyhow::Result<Option<JobStatus>> {
        if let Some(job) = self.jobs.get(job_id) {
            return Ok(Some(job));
        }
        self.store.get(job_id).await
    }

    async fn exists(&self, job_id: &str) -> bool {
        if self.jobs.contains(job_id) {
            return true;
        }
        match self.store.get(job_id).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!("error consultando el store por {}: {:#}", job_id, e);
                false
            }
        }
    }

    /// Valida el id (o genera uno) y reserva el registro en `running`.
    async fn admit(&self, job_id: Option<JobId>) -> Result<JobId, SubmitError> {
        let job_id = match job_id {
            Some(id) if !is_valid_job_id(&id) => return Err(SubmitError::InvalidJobId(id)),
            Some(id) => id,
            None => uuid::Uuid::new_v4().to_string(),
        };
        if self.exists(&job_id).await {
            return Err(SubmitError::DuplicateJob(job_id));
        }

        let job = JobStatus::new(job_id.clone(), JobState::Running);
        if !self.jobs.insert_new(job.clone()) {
            return Err(SubmitError::DuplicateJob(job_id));
        }
        self.persist(&job).await;
        Ok(job_id)
    }

    pub async fn submit_text(&self, req: SubmitTextRequest) -> Result<JobStatus, SubmitError> {
        if req.input_text.trim().is_empty() {
            return Err(SubmitError::EmptyInput);
        }
        let split_size = positive_or(req.split_size, self.default_split_size);
        let reducers = self.reducers_for(req.num_reducers);

        let job_id = self.admit(req.job_id).await?;
        Ok(self
            .spawn_run(job_id, JobInput::Text(req.input_text), split_size, reducers)
            .await)
    }

    pub async fn submit_file(&self, req: SubmitFileRequest) -> Result<JobStatus, SubmitError> {
        if !is_valid_job_id(&req.job_id) {
            return Err(SubmitError::InvalidJobId(req.job_id));
        }
        let path = self.input_path(&req.job_id);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SubmitError::InputNotFound(req.job_id))
            }
            Err(e) => return Err(SubmitError::Storage(e.to_string())),
        };
        // mismo criterio que el texto en línea: vacío tras recortar espacios
        if String::from_utf8_lossy(&data).trim().is_empty() {
            return Err(SubmitError::EmptyInput);
        }
        let split_size = positive_or(req.split_size, self.default_split_size);
        let reducers = self.reducers_for(req.num_reducers);

        let job_id = self.admit(Some(req.job_id)).await?;
        Ok(self
            .spawn_run(job_id, JobInput::Bytes(Arc::new(data)), split_size, reducers)
            .await)
    }

    /// Cantidad de reducers pedida, con default y techo `max_reducers`.
    fn reducers_for(&self, requested: Option<i64>) -> usize {
        let n = positive_or(requested, self.default_reducers);
        if n > self.max_reducers {
            warn!("num_reducers={} supera el máximo, usando {}", n, self.max_reducers);
        }
        n.min(self.max_reducers)
    }

    /// Corre el job en su propia tarea: si quien lo lanzó se va (el cliente
    /// HTTP corta), el job igual llega a un estado terminal.
    async fn spawn_run(
        &self,
        job_id: JobId,
        input: JobInput,
        split_size: usize,
        num_reducers: usize,
    ) -> JobStatus {
        let this = self.clone();
        let id = job_id.clone();
        let handle =
            tokio::spawn(async move { this.run(&id, input, split_size, num_reducers).await });

        match handle.await {
            Ok(job) => job,
            Err(e) => {
                warn!("la tarea del job {} terminó mal: {}", job_id, e);
                let failed = self.jobs.update(&job_id, |j| {
                    j.status = JobState::Error;
                    j.message = Some(JobError::Task(e.to_string()).to_string());
                });
                let job = failed
                    .or_else(|| self.jobs.get(&job_id))
                    .unwrap_or_else(|| JobStatus::new(job_id.clone(), JobState::Error));
                self.persist(&job).await;
                job
            }
        }
    }

    /// Corre el job y lo deja en estado terminal. Nunca falla hacia afuera.
    async fn run(
        &self,
        job_id: &str,
        input: JobInput,
        split_size: usize,
        num_reducers: usize,
    ) -> JobStatus {
        let started = Instant::now();
        let attempts = Arc::new(AtomicU32::new(0));
        info!(
            "job {} arrancando (split_size={}, reducers={})",
            job_id, split_size, num_reducers
        );

        let outcome = self
            .execute(job_id, input, split_size, num_reducers, started, &attempts)
            .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let attempts = attempts.load(Ordering::Relaxed);

        let finished = self.jobs.update(job_id, |j| {
            j.elapsed_ms = Some(elapsed_ms);
            j.attempts = attempts;
            match outcome {
                Ok(done) => {
                    j.status = JobState::Done;
                    j.result = Some(done.result);
                    j.reducers = done.reducers;
                    j.completed_splits = j.total_splits;
                }
                Err(ref e) => {
                    j.status = JobState::Error;
                    j.message = Some(e.to_string());
                }
            }
        });

        let job = finished
            .or_else(|| self.jobs.get(job_id))
            .unwrap_or_else(|| JobStatus::new(job_id.to_string(), JobState::Error));
        self.persist(&job).await;

        match job.status {
            JobState::Done => info!("job {} terminado en {} ms", job_id, elapsed_ms),
            _ => warn!(
                "job {} falló en {} ms: {}",
                job_id,
                elapsed_ms,
                job.message.as_deref().unwrap_or("-")
            ),
        }
        job
    }

    async fn execute(
        &self,
        job_id: &str,
        input: JobInput,
        split_size: usize,
        num_reducers: usize,
        started: Instant,
        attempts: &Arc<AtomicU32>,
    ) -> Result<Finished, JobError> {
        // 1) Split
        let splits: Vec<Split> = match input {
            JobInput::Text(text) => split::split_words(&text, split_size)
                .into_iter()
                .enumerate()
                .map(|(i, chunk)| Split::inline(i as u32, chunk))
                .collect(),
            JobInput::Bytes(data) => {
                split::split_byte_ranges(&data, split_size)
                    .into_iter()
                    .enumerate()
                    .map(|(i, range)| Split::bytes(i as u32, data.clone(), range))
                    .collect()
            }
        };

        if splits.is_empty() {
            info!("job {} sin splits, resultado vacío", job_id);
            return Ok(Finished {
                result: Counts::new(),
                reducers: Vec::new(),
            });
        }
        if self.registry.is_empty() {
            return Err(JobError::NoWorkers);
        }

        let total = splits.len() as u32;
        if let Some(job) = self.jobs.update(job_id, |j| j.total_splits = total) {
            self.persist(&job).await;
        }
        info!("job {}: {} splits", job_id, total);

        // 2) Map: una tarea por split; el dispatcher limita cuántas van en vuelo
        let mut maps = JoinSet::new();
        for split in splits {
            let dispatcher = self.dispatcher.clone();
            let job_id = job_id.to_string();
            let attempts = attempts.clone();
            maps.spawn(async move { dispatcher.map_split(&job_id, &split, &attempts).await });
        }

        let mut partials = Vec::with_capacity(total as usize);
        while let Some(joined) = maps.join_next().await {
            // si una tarea revienta, al salir se cae el JoinSet y aborta el resto
            let executed = joined.map_err(|e| JobError::Task(e.to_string()))?;
            partials.push(executed.value);

            let elapsed_ms = started.elapsed().as_millis() as u64;
            let attempts_now = attempts.load(Ordering::Relaxed);
            if let Some(job) = self.jobs.update(job_id, |j| {
                j.completed_splits += 1;
                j.elapsed_ms = Some(elapsed_ms);
                j.attempts = attempts_now;
            }) {
                self.persist(&job).await;
            }
        }

        // 3) Shuffle
        let shards = shuffle::partition(&partials, num_reducers);
        drop(partials);

        // 4) Reduce: un shard por reducer elegido
        let reducers = self.dispatcher.registry().select_n(shards.len())?;
        let mut reduces = JoinSet::new();
        for (i, (shard, reducer)) in shards.into_iter().zip(reducers).enumerate() {
            let dispatcher = self.dispatcher.clone();
            let job_id = job_id.to_string();
            reduces.spawn(async move {
                let executed = dispatcher.reduce_shard(&job_id, shard, &reducer.address).await;
                (i, executed)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = reduces.join_next().await {
            results.push(joined.map_err(|e| JobError::Task(e.to_string()))?);
        }
        results.sort_by_key(|(i, _)| *i);

        // 5) Merge final
        let result = wordcount::merge_counts(results.iter().map(|(_, e)| &e.value));
        let reducers_used = results
            .into_iter()
            .map(|(_, e)| match e.placement {
                Placement::Remote(addr) => addr,
                Placement::Local => "local".to_string(),
            })
            .collect();

        Ok(Finished {
            result,
            reducers: reducers_used,
        })
    }

    async fn persist(&self, job: &JobStatus) {
        if let Err(e) = self.store.upsert(job).await {
            warn!("no se pudo persistir el job {}: {:#}", job.job_id, e);
        }
    }
}
