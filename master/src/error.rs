// master/src/error.rs

use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Errores de una llamada remota (o de no tener a quién llamar).
#[derive(Debug, Clone)]
pub enum DispatchError {
    NoWorkers,
    Timeout { worker: String },
    Transport { worker: String, detail: String },
    Status { worker: String, code: u16 },
    Exhausted { tried: usize },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::NoWorkers => write!(f, "no workers registered"),
            DispatchError::Timeout { worker } => write!(f, "timeout llamando a {worker}"),
            DispatchError::Transport { worker, detail } => {
                write!(f, "error de red con {worker}: {detail}")
            }
            DispatchError::Status { worker, code } => {
                write!(f, "{worker} respondió con status {code}")
            }
            DispatchError::Exhausted { tried } => {
                write!(f, "fallaron los {tried} workers candidatos")
            }
        }
    }
}

impl std::error::Error for DispatchError {}

/// Validaciones de un submit. Se devuelven al cliente sin crear el job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    EmptyInput,
    InvalidJobId(String),
    DuplicateJob(String),
    InputNotFound(String),
    Storage(String),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::EmptyInput => write!(f, "input vacío"),
            SubmitError::InvalidJobId(id) => write!(f, "job id inválido: {id:?}"),
            SubmitError::DuplicateJob(id) => write!(f, "el job {id} ya existe"),
            SubmitError::InputNotFound(id) => write!(f, "no hay input subido para el job {id}"),
            SubmitError::Storage(e) => write!(f, "no se pudo guardar el input: {e}"),
        }
    }
}

impl std::error::Error for SubmitError {}

/// Causa terminal de un job fallido; termina en `status=error` + mensaje.
#[derive(Debug)]
pub enum JobError {
    NoWorkers,
    Task(String),
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::NoWorkers => write!(f, "no workers registered"),
            JobError::Task(e) => write!(f, "falló una tarea del job: {e}"),
        }
    }
}

impl std::error::Error for JobError {}

impl From<DispatchError> for JobError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::NoWorkers => JobError::NoWorkers,
            other => JobError::Task(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Error de la API HTTP del master.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        let status = match e {
            SubmitError::EmptyInput | SubmitError::InvalidJobId(_) => StatusCode::BAD_REQUEST,
            SubmitError::DuplicateJob(_) => StatusCode::CONFLICT,
            SubmitError::InputNotFound(_) => StatusCode::NOT_FOUND,
            SubmitError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, e.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}
