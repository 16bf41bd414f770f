// master/src/jobs.rs

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::Utc;
use common::{JobId, JobStatus};
use tracing::warn;

/// Tabla en memoria de jobs vivos. El orquestador es el único que escribe
/// el registro de un job mientras corre.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: Mutex<HashMap<JobId, JobStatus>>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, JobStatus>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, job_id: &str) -> Option<JobStatus> {
        self.lock().get(job_id).cloned()
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.lock().contains_key(job_id)
    }

    /// Inserta un job nuevo; false si el id ya estaba.
    pub fn insert_new(&self, job: JobStatus) -> bool {
        let mut jobs = self.lock();
        if jobs.contains_key(&job.job_id) {
            return false;
        }
        jobs.insert(job.job_id.clone(), job);
        true
    }

    /// Aplica `f` al registro bajo el lock y devuelve la copia resultante.
    /// Un cambio que rompa la monotonía del estado (o toque un job terminal)
    /// se descarta.
    pub fn update<F>(&self, job_id: &str, f: F) -> Option<JobStatus>
    where
        F: FnOnce(&mut JobStatus),
    {
        let mut jobs = self.lock();
        let current = jobs.get_mut(job_id)?;
        if current.status.is_terminal() {
            warn!("job {} ya terminó ({:?}), ignorando actualización", job_id, current.status);
            return None;
        }

        let mut next = current.clone();
        f(&mut next);
        if !current.status.can_transition_to(next.status) {
            warn!(
                "transición inválida {:?} -> {:?} en job {}",
                current.status, next.status, job_id
            );
            return None;
        }
        next.updated_at = Utc::now();
        *current = next.clone();
        Some(next)
    }
}
