use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use common::{
    JobStatus, SubmitFileRequest, SubmitTextRequest, WorkerHeartbeatRequest,
    WorkerHeartbeatResponse, WorkerRegisterRequest, WorkerRegisterResponse, WorkerView,
};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::state::AppState;

// inputs subidos de hasta 1 GiB
const MAX_UPLOAD_BYTES: usize = 1 << 30;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/jobs", post(submit_text))
        .route("/api/v1/jobs/file", post(submit_file))
        .route(
            "/api/v1/jobs/:id/input",
            put(upload_input).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/v1/jobs/:id", get(get_job))
        .route("/api/v1/workers", get(list_workers))
        .route("/api/v1/workers/register", post(register_worker))
        .route("/api/v1/workers/heartbeat", post(worker_heartbeat))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

// Corre un job sobre texto en línea y devuelve su estado final
async fn submit_text(
    State(state): State<AppState>,
    Json(req): Json<SubmitTextRequest>,
) -> Result<Json<JobStatus>, ApiError> {
    let job = state.orchestrator.submit_text(req).await?;
    Ok(Json(job))
}

// Corre un job sobre el input subido antes con PUT /api/v1/jobs/:id/input
async fn submit_file(
    State(state): State<AppState>,
    Json(req): Json<SubmitFileRequest>,
) -> Result<Json<JobStatus>, ApiError> {
    let job = state.orchestrator.submit_file(req).await?;
    Ok(Json(job))
}

async fn upload_input(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let path = state.orchestrator.store_input(&id, &body).await?;
    Ok(Json(json!({
        "job_id": id,
        "bytes": body.len(),
        "path": path.to_string_lossy(),
    })))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobStatus>, ApiError> {
    match state.orchestrator.status(&id).await? {
        Some(job) => Ok(Json(job)),
        None => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("job {id} no encontrado"),
        )),
    }
}

async fn register_worker(
    State(state): State<AppState>,
    Json(req): Json<WorkerRegisterRequest>,
) -> Json<WorkerRegisterResponse> {
    state.registry.register(&req);
    Json(WorkerRegisterResponse {
        address: req.address,
        ok: true,
    })
}

async fn worker_heartbeat(
    State(state): State<AppState>,
    Json(req): Json<WorkerHeartbeatRequest>,
) -> Json<WorkerHeartbeatResponse> {
    state.registry.heartbeat(&req);
    Json(WorkerHeartbeatResponse { ok: true })
}

async fn list_workers(State(state): State<AppState>) -> Json<Vec<WorkerView>> {
    Json(state.registry.views())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MasterConfig;
    use crate::dispatcher::Dispatcher;
    use crate::jobs::JobTable;
    use crate::orchestrator::Orchestrator;
    use crate::registry::Registry;
    use crate::testing::{FakeBehavior, FakeWorkerClient, MemoryJobStore};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use common::JobState;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(sub: &str) -> (Router, Arc<FakeWorkerClient>) {
        let data_dir = std::env::temp_dir().join("gridmr_handlers_tests").join(sub);
        let _ = std::fs::remove_dir_all(&data_dir);
        let config = MasterConfig {
            data_dir,
            ..MasterConfig::default()
        };
        let registry = Arc::new(Registry::new());
        let fake = Arc::new(FakeWorkerClient::new());
        let dispatcher = Dispatcher::new(
            registry.clone(),
            fake.clone(),
            config.retry.clone(),
            config.max_inflight_maps,
        );
        let orchestrator = Orchestrator::new(
            &config,
            dispatcher,
            Arc::new(JobTable::new()),
            Arc::new(MemoryJobStore::new()),
        );
        (
            build_router(AppState {
                registry,
                orchestrator,
            }),
            fake,
        )
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn registro_submit_y_status() {
        let (app, fake) = app("flujo");
        fake.set("http://w1:9000", FakeBehavior::Ok);

        let resp = app
            .clone()
            .oneshot(post_json(
                "/api/v1/workers/register",
                json!({"address": "http://w1:9000", "name": "w1", "capacity": 2}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .clone()
            .oneshot(post_json(
                "/api/v1/jobs",
                json!({"job_id": "j1", "input_text": "el gato y el perro", "split_size": 1000, "num_reducers": 1}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let job: JobStatus = serde_json::from_value(body_json(resp).await).unwrap();
        assert_eq!(job.status, JobState::Done);
        assert_eq!(job.result.unwrap().get("el"), Some(&2));

        let resp = app
            .clone()
            .oneshot(Request::get("/api/v1/jobs/j1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "done");

        let resp = app
            .oneshot(Request::get("/api/v1/workers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let workers = body_json(resp).await;
        assert_eq!(workers[0]["address"], "http://w1:9000");
        assert_eq!(workers[0]["healthy"], true);
    }

    #[tokio::test]
    async fn submit_vacio_es_400_y_job_desconocido_404() {
        let (app, _fake) = app("errores");

        let resp = app
            .clone()
            .oneshot(post_json("/api/v1/jobs", json!({"input_text": "   "})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(resp).await["error"].is_string());

        let resp = app
            .oneshot(Request::get("/api/v1/jobs/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn sin_workers_el_submit_devuelve_job_en_error() {
        let (app, _fake) = app("sin_workers");
        let resp = app
            .oneshot(post_json("/api/v1/jobs", json!({"input_text": "hola"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains("no workers"));
    }

    #[tokio::test]
    async fn subir_input_y_lanzar_submit_file() {
        let (app, fake) = app("upload");
        fake.set("http://w1", FakeBehavior::Ok);
        app.clone()
            .oneshot(post_json(
                "/api/v1/workers/heartbeat",
                json!({"address": "http://w1", "capacity": 1, "in_flight": 0}),
            ))
            .await
            .unwrap();

        let resp = app
            .clone()
            .oneshot(
                Request::put("/api/v1/jobs/grande/input")
                    .body(Body::from("uno dos dos tres tres tres"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(post_json(
                "/api/v1/jobs/file",
                json!({"job_id": "grande", "split_size": 8, "num_reducers": 2}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "done");
        assert_eq!(body["result"]["tres"], 3);
    }
}
