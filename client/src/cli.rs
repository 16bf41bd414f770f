use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use common::{JobStatus, SubmitFileRequest, SubmitTextRequest, WorkerView};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};

#[derive(Parser, Debug)]
#[command(name = "gridmr")]
#[command(about = "CLI simple para hablar con el master de GridMR")]
struct Cli {
    /// URL base del master
    /// - En Docker: MASTER_URL=http://master:8080
    /// - Local: default http://localhost:8080
    #[arg(long, env = "MASTER_URL", default_value = "http://localhost:8080")]
    master: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Corre un word count sobre texto en línea y espera el resultado
    SubmitText {
        /// Tamaño máximo de cada split en caracteres
        #[arg(long)]
        split: Option<i64>,
        /// Cantidad de reducers
        #[arg(long)]
        reducers: Option<i64>,
        /// Id del job (si no se da, lo genera el master)
        #[arg(long)]
        job: Option<String>,
        #[arg(value_name = "TEXTO")]
        text: String,
    },
    /// Sube un archivo al master y corre un word count sobre él
    SubmitFile {
        #[arg(long)]
        job: String,
        /// Tamaño máximo de cada split en bytes
        #[arg(long)]
        split: Option<i64>,
        #[arg(long)]
        reducers: Option<i64>,
        #[arg(value_name = "ARCHIVO")]
        path: PathBuf,
    },
    /// Consulta el estado de un job
    Status {
        #[arg(value_name = "JOB_ID")]
        id: String,
    },
    /// Lista los workers registrados
    Workers,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base = cli.master.trim_end_matches('/').to_string();

    match cli.command {
        Commands::SubmitText {
            split,
            reducers,
            job,
            text,
        } => {
            let req = SubmitTextRequest {
                job_id: job,
                input_text: text,
                split_size: split,
                num_reducers: reducers,
            };
            let resp = client
                .post(format!("{base}/api/v1/jobs"))
                .json(&req)
                .send()
                .await?;
            let job: JobStatus = read_json(resp).await?;
            print_pretty(&job)?;
        }

        Commands::SubmitFile {
            job,
            split,
            reducers,
            path,
        } => {
            let data = tokio::fs::read(&path)
                .await
                .with_context(|| format!("no se pudo leer {}", path.display()))?;
            let bytes = data.len();

            // 1) subir el input
            let resp = client
                .put(format!("{base}/api/v1/jobs/{job}/input"))
                .body(data)
                .send()
                .await?;
            read_json::<serde_json::Value>(resp).await?;
            eprintln!("input subido: {} ({} bytes)", path.display(), bytes);

            // 2) lanzar el job sobre el archivo subido
            let req = SubmitFileRequest {
                job_id: job,
                split_size: split,
                num_reducers: reducers,
            };
            let resp = client
                .post(format!("{base}/api/v1/jobs/file"))
                .json(&req)
                .send()
                .await?;
            let job: JobStatus = read_json(resp).await?;
            print_pretty(&job)?;
        }

        Commands::Status { id } => {
            let resp = client.get(format!("{base}/api/v1/jobs/{id}")).send().await?;
            let job: JobStatus = read_json(resp).await?;
            print_pretty(&job)?;
        }

        Commands::Workers => {
            let resp = client.get(format!("{base}/api/v1/workers")).send().await?;
            let workers: Vec<WorkerView> = read_json(resp).await?;
            if workers.is_empty() {
                eprintln!("No hay workers registrados.");
            }
            print_pretty(&workers)?;
        }
    }

    Ok(())
}

/// Decodifica la respuesta o convierte el cuerpo de error del master en un
/// error legible.
async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let msg = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v["error"].as_str().map(str::to_string))
            .unwrap_or(body);
        bail!("el master respondió {}: {}", status, msg);
    }
    Ok(resp.json().await?)
}

fn print_pretty<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
