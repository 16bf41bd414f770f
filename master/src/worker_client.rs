// master/src/worker_client.rs

use async_trait::async_trait;
use common::{Counts, CountsResponse, MapRequest, ReduceRequest, UploadResponse};
use reqwest::{Client, Response};

use crate::error::DispatchError;

/// Llamadas del master a un worker. Es la costura que los tests reemplazan.
#[async_trait]
pub trait WorkerClient: Send + Sync {
    async fn map(&self, worker: &str, req: &MapRequest) -> Result<Counts, DispatchError>;

    async fn reduce(&self, worker: &str, req: &ReduceRequest) -> Result<Counts, DispatchError>;

    /// Sube los bytes de un split y devuelve la ruta que el worker resuelve en `map`.
    async fn upload(
        &self,
        worker: &str,
        job_id: &str,
        split_id: u32,
        bytes: Vec<u8>,
    ) -> Result<String, DispatchError>;
}

/// Cliente HTTP (reqwest) contra la API del worker.
#[derive(Clone, Default)]
pub struct HttpWorkerClient {
    http: Client,
}

impl HttpWorkerClient {
    pub fn new() -> Self {
        Self { http: Client::new() }
    }
}

fn transport(worker: &str, e: reqwest::Error) -> DispatchError {
    if e.is_timeout() {
        DispatchError::Timeout {
            worker: worker.to_string(),
        }
    } else {
        DispatchError::Transport {
            worker: worker.to_string(),
            detail: e.to_string(),
        }
    }
}

fn check_status(worker: &str, resp: Response) -> Result<Response, DispatchError> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        Err(DispatchError::Status {
            worker: worker.to_string(),
            code: resp.status().as_u16(),
        })
    }
}

#[async_trait]
impl WorkerClient for HttpWorkerClient {
    async fn map(&self, worker: &str, req: &MapRequest) -> Result<Counts, DispatchError> {
        let url = format!("{}/map", worker.trim_end_matches('/'));
        let resp = self
            .http
            .post(&url)
            .json(req)
            .send()
            .await
            .map_err(|e| transport(worker, e))?;
        let body: CountsResponse = check_status(worker, resp)?
            .json()
            .await
            .map_err(|e| transport(worker, e))?;
        Ok(body.counts)
    }

    async fn reduce(&self, worker: &str, req: &ReduceRequest) -> Result<Counts, DispatchError> {
        let url = format!("{}/reduce", worker.trim_end_matches('/'));
        let resp = self
            .http
            .post(&url)
            .json(req)
            .send()
            .await
            .map_err(|e| transport(worker, e))?;
        let body: CountsResponse = check_status(worker, resp)?
            .json()
            .await
            .map_err(|e| transport(worker, e))?;
        Ok(body.counts)
    }

    async fn upload(
        &self,
        worker: &str,
        job_id: &str,
        split_id: u32,
        bytes: Vec<u8>,
    ) -> Result<String, DispatchError> {
        let url = format!("{}/upload", worker.trim_end_matches('/'));
        let split_id = split_id.to_string();
        let resp = self
            .http
            .post(&url)
            .query(&[("job_id", job_id), ("split_id", split_id.as_str())])
            .body(bytes)
            .send()
            .await
            .map_err(|e| transport(worker, e))?;
        let body: UploadResponse = check_status(worker, resp)?
            .json()
            .await
            .map_err(|e| transport(worker, e))?;
        Ok(body.path)
    }
}
