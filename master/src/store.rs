// master/src/store.rs

use std::{
    io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use common::{is_valid_job_id, JobStatus};
use tokio::fs;

/// Almacén durable de jobs: upsert y lectura por id.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn upsert(&self, job: &JobStatus) -> Result<()>;
    async fn get(&self, job_id: &str) -> Result<Option<JobStatus>>;
}

/// Un documento JSON por job en `<dir>/<job_id>.json`.
pub struct FileJobStore {
    dir: PathBuf,
}

impl FileJobStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creando directorio de jobs {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!("{job_id}.json"))
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn upsert(&self, job: &JobStatus) -> Result<()> {
        let path = self.path_for(&job.job_id);
        // escribir a un temporal y renombrar: nunca queda un JSON a medias
        let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4()));
        let body = serde_json::to_vec_pretty(job)?;
        fs::write(&tmp, body)
            .await
            .with_context(|| format!("escribiendo {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("renombrando a {}", path.display()))?;
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<JobStatus>> {
        // un id que no es nombre de archivo válido no puede estar guardado
        if !is_valid_job_id(job_id) {
            return Ok(None);
        }
        let path = self.path_for(job_id);
        match fs::read(&path).await {
            Ok(bytes) => {
                let job = serde_json::from_slice(&bytes)
                    .with_context(|| format!("parseando {}", path.display()))?;
                Ok(Some(job))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("leyendo {}", path.display())),
        }
    }
}
