use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use common::{
    is_valid_job_id, wordcount, CountsResponse, MapRequest, ReduceRequest, UploadQuery,
    UploadResponse,
};
use serde_json::{json, Value};
use tracing::{info, warn};

// splits y parciales de hasta 256 MiB
const MAX_BODY_BYTES: usize = 256 << 20;

/// Estado del worker: sin nada compartido entre llamadas salvo el contador
/// de tareas en vuelo que se reporta en el heartbeat.
#[derive(Clone)]
pub struct WorkerState {
    pub name: String,
    pub data_dir: PathBuf,
    pub in_flight: Arc<AtomicU32>,
}

impl WorkerState {
    pub fn new(name: String, data_dir: PathBuf) -> Self {
        Self {
            name,
            data_dir,
            in_flight: Arc::new(AtomicU32::new(0)),
        }
    }
}

/// Suma 1 a in_flight al crearse y resta 1 al soltarse, pase lo que pase.
struct InFlightGuard(Arc<AtomicU32>);

impl InFlightGuard {
    fn enter(counter: &Arc<AtomicU32>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

type HandlerError = (StatusCode, String);

pub fn build_router(state: WorkerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/map", post(do_map))
        .route("/reduce", post(do_reduce))
        .route("/upload", post(do_upload))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

async fn health(State(state): State<WorkerState>) -> Json<Value> {
    Json(json!({ "service": "GridMR Worker", "name": state.name }))
}

async fn do_map(
    State(state): State<WorkerState>,
    Json(req): Json<MapRequest>,
) -> Result<Json<CountsResponse>, HandlerError> {
    let _guard = InFlightGuard::enter(&state.in_flight);

    let counts = match (req.chunk, req.path) {
        (Some(chunk), _) => tokio::task::spawn_blocking(move || wordcount::count_words(&chunk))
            .await
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?,
        (None, Some(path)) => {
            let path = resolve_upload(&state.data_dir, &path)?;
            tokio::task::spawn_blocking(move || wordcount::count_words_in_file(&path))
                .await
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
                .map_err(|e| {
                    warn!("map {}#{}: no se pudo leer el split: {}", req.job_id, req.split_id, e);
                    (StatusCode::NOT_FOUND, e.to_string())
                })?
        }
        (None, None) => {
            return Err((
                StatusCode::BAD_REQUEST,
                "map sin chunk ni path".to_string(),
            ))
        }
    };

    info!(
        "map {}#{} listo ({} claves)",
        req.job_id,
        req.split_id,
        counts.len()
    );
    Ok(Json(CountsResponse {
        worker: state.name.clone(),
        counts,
    }))
}

async fn do_reduce(
    State(state): State<WorkerState>,
    Json(req): Json<ReduceRequest>,
) -> Json<CountsResponse> {
    let _guard = InFlightGuard::enter(&state.in_flight);
    let counts = wordcount::merge_counts(&req.partials);
    info!(
        "reduce {} listo ({} parciales -> {} claves)",
        req.job_id,
        req.partials.len(),
        counts.len()
    );
    Json(CountsResponse {
        worker: state.name.clone(),
        counts,
    })
}

async fn do_upload(
    State(state): State<WorkerState>,
    Query(q): Query<UploadQuery>,
    body: Bytes,
) -> Result<Json<UploadResponse>, HandlerError> {
    let _guard = InFlightGuard::enter(&state.in_flight);

    if !is_valid_job_id(&q.job_id) {
        return Err((StatusCode::BAD_REQUEST, format!("job id inválido: {:?}", q.job_id)));
    }
    let dir = state.data_dir.join(&q.job_id);
    let path = dir.join(format!("split-{}.txt", q.split_id));

    let write = async {
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(&path, &body).await
    };
    write
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    info!("split {}#{} guardado ({} bytes)", q.job_id, q.split_id, body.len());
    Ok(Json(UploadResponse {
        path: path.to_string_lossy().to_string(),
    }))
}

/// Solo se leen archivos dentro del directorio de datos del worker.
fn resolve_upload(data_dir: &Path, raw: &str) -> Result<PathBuf, HandlerError> {
    let path = PathBuf::from(raw);
    let escapes = path
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir));
    if escapes || !path.starts_with(data_dir) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("ruta fuera del directorio de datos: {raw}"),
        ));
    }
    Ok(path)
}
