// master/src/testing.rs

use std::{
    collections::HashMap,
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use common::{wordcount, Counts, JobId, JobStatus, MapRequest, ReduceRequest};

use crate::error::DispatchError;
use crate::store::JobStore;
use crate::worker_client::WorkerClient;

/// Comportamiento simulado de un worker.
#[derive(Debug, Clone)]
pub enum FakeBehavior {
    Ok,
    Fail,
    /// Falla las primeras n llamadas y después responde bien
    FailTimes(u32),
    Slow(Duration),
}

#[derive(Default)]
struct FakeState {
    behaviors: HashMap<String, FakeBehavior>,
    calls: HashMap<String, u32>,
    uploads: HashMap<String, u32>,
    files: HashMap<String, Vec<u8>>,
    // maps ejecutándose ahora mismo, y el máximo visto
    active_maps: u32,
    peak_maps: u32,
}

/// Cuenta un map activo mientras vive.
struct ActiveMap<'a>(&'a FakeWorkerClient);

impl Drop for ActiveMap<'_> {
    fn drop(&mut self) {
        self.0.state.lock().unwrap().active_maps -= 1;
    }
}

/// Worker en memoria: hace el mismo WordCount que el worker real.
#[derive(Default)]
pub struct FakeWorkerClient {
    state: Mutex<FakeState>,
}

impl FakeWorkerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, worker: &str, behavior: FakeBehavior) {
        self.state
            .lock()
            .unwrap()
            .behaviors
            .insert(worker.to_string(), behavior);
    }

    /// Llamadas map + reduce recibidas por el worker
    pub fn calls(&self, worker: &str) -> u32 {
        self.state.lock().unwrap().calls.get(worker).copied().unwrap_or(0)
    }

    /// Máximo de maps simultáneos observado, sumando todos los workers
    pub fn peak_maps(&self) -> u32 {
        self.state.lock().unwrap().peak_maps
    }

    fn enter_map(&self) -> ActiveMap<'_> {
        let mut st = self.state.lock().unwrap();
        st.active_maps += 1;
        st.peak_maps = st.peak_maps.max(st.active_maps);
        ActiveMap(self)
    }

    pub fn uploads(&self, worker: &str) -> u32 {
        self.state.lock().unwrap().uploads.get(worker).copied().unwrap_or(0)
    }

    /// Decide si esta llamada falla y cuánto tarda.
    fn admit(&self, worker: &str, is_upload: bool) -> Result<Option<Duration>, DispatchError> {
        let mut st = self.state.lock().unwrap();
        let counter = if is_upload { &mut st.uploads } else { &mut st.calls };
        *counter.entry(worker.to_string()).or_insert(0) += 1;

        let fail = || DispatchError::Transport {
            worker: worker.to_string(),
            detail: "fallo inyectado".into(),
        };
        match st.behaviors.get_mut(worker) {
            Some(FakeBehavior::Ok) => Ok(None),
            Some(FakeBehavior::Slow(d)) => Ok(Some(*d)),
            Some(FakeBehavior::FailTimes(n)) if *n > 0 => {
                *n -= 1;
                Err(fail())
            }
            Some(FakeBehavior::FailTimes(_)) => Ok(None),
            Some(FakeBehavior::Fail) | None => Err(fail()),
        }
    }
}

#[async_trait]
impl WorkerClient for FakeWorkerClient {
    async fn map(&self, worker: &str, req: &MapRequest) -> Result<Counts, DispatchError> {
        let delay = self.admit(worker, false)?;
        let _active = self.enter_map();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(chunk) = &req.chunk {
            return Ok(wordcount::count_words(chunk));
        }
        let path = req.path.clone().unwrap_or_default();
        let bytes = self.state.lock().unwrap().files.get(&path).cloned();
        match bytes {
            Some(b) => Ok(wordcount::count_words(&String::from_utf8_lossy(&b))),
            None => Err(DispatchError::Status {
                worker: worker.to_string(),
                code: 404,
            }),
        }
    }

    async fn reduce(&self, worker: &str, req: &ReduceRequest) -> Result<Counts, DispatchError> {
        if let Some(delay) = self.admit(worker, false)? {
            tokio::time::sleep(delay).await;
        }
        Ok(wordcount::merge_counts(&req.partials))
    }

    async fn upload(
        &self,
        worker: &str,
        job_id: &str,
        split_id: u32,
        bytes: Vec<u8>,
    ) -> Result<String, DispatchError> {
        self.admit(worker, true)?;
        let path = format!("mem://{worker}/{job_id}/split-{split_id}.txt");
        self.state.lock().unwrap().files.insert(path.clone(), bytes);
        Ok(path)
    }
}

/// Store de jobs en memoria.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<JobId, JobStatus>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn upsert(&self, job: &JobStatus) -> anyhow::Result<()> {
        self.jobs
            .lock()
            .map_err(|_| anyhow::anyhow!("lock jobs"))?
            .insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, job_id: &str) -> anyhow::Result<Option<JobStatus>> {
        Ok(self
            .jobs
            .lock()
            .map_err(|_| anyhow::anyhow!("lock jobs"))?
            .get(job_id)
            .cloned())
    }
}
