use serde::{Deserialize, Serialize};

use crate::job::JobId;
use crate::wordcount::Counts;

/// Map sobre un split: o viene el texto en línea (`chunk`) o una ruta
/// que el worker puede leer (`path`, devuelta antes por `/upload`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapRequest {
    pub job_id: JobId,
    pub split_id: u32,
    #[serde(default)]
    pub chunk: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReduceRequest {
    pub job_id: JobId,
    pub partials: Vec<Counts>,
}

/// Respuesta común de `/map` y `/reduce`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountsResponse {
    pub worker: String,
    pub counts: Counts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadQuery {
    pub job_id: JobId,
    pub split_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub path: String,
}
