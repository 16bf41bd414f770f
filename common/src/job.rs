use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::wordcount::Counts;

pub type JobId = String;

/// Petición de job con el texto en línea.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTextRequest {
    /// Si no viene, el master genera uno.
    #[serde(default)]
    pub job_id: Option<JobId>,
    pub input_text: String,
    /// Tamaño aproximado de cada split, en caracteres.
    #[serde(default)]
    pub split_size: Option<i64>,
    #[serde(default)]
    pub num_reducers: Option<i64>,
}

/// Petición de job sobre un input subido antes con `PUT /api/v1/jobs/:id/input`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitFileRequest {
    pub job_id: JobId,
    /// Tamaño aproximado de cada split, en bytes.
    #[serde(default)]
    pub split_size: Option<i64>,
    #[serde(default)]
    pub num_reducers: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Done,
    Error,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Error)
    }

    /// queued -> running -> {done | error}; un estado terminal no cambia nunca.
    pub fn can_transition_to(self, next: JobState) -> bool {
        match (self, next) {
            (JobState::Queued, _) => true,
            (JobState::Running, JobState::Running) => true,
            (JobState::Running, JobState::Done | JobState::Error) => true,
            _ => false,
        }
    }
}

/// Registro de un job tal como lo ve el cliente y como se persiste.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: JobId,
    pub status: JobState,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub result: Option<Counts>,
    #[serde(default)]
    pub elapsed_ms: Option<u64>,

    /// Intentos de map (remotos) contados durante el job
    #[serde(default)]
    pub attempts: u32,
    /// Direcciones de los workers usados como reducers
    #[serde(default)]
    pub reducers: Vec<String>,

    // -------- Progreso --------
    #[serde(default)]
    pub total_splits: u32,
    #[serde(default)]
    pub completed_splits: u32,

    pub updated_at: DateTime<Utc>,
}

impl JobStatus {
    pub fn new(job_id: JobId, status: JobState) -> Self {
        Self {
            job_id,
            status,
            message: None,
            result: None,
            elapsed_ms: None,
            attempts: 0,
            reducers: Vec::new(),
            total_splits: 0,
            completed_splits: 0,
            updated_at: Utc::now(),
        }
    }
}

/// Un job id válido también es un nombre de archivo válido.
pub fn is_valid_job_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
