//! Operator CLI for one service's job namespace: list the pending/running
//! jobs, print a filed job's document, or requeue a failed one.
//!
//! Talks to the store exclusively through `StoreClient`, the same seam
//! `jobs-core` itself uses — this binary never reaches into `Runner`/`Queue`.

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use prettytable::{row, Table};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

use jobs_core::{Error, HttpStoreClient, Result, ServiceConfig, StoreClient};

#[derive(Parser)]
#[command(name = "jobs")]
#[command(about = "Inspect and manage a service's job namespace")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (falls back to JOBS_CONFIG / env overrides).
    #[arg(short, long, global = true, env = "JOBS_CONFIG")]
    config: Option<PathBuf>,

    /// Service namespace under /bookmarks/services. Overrides the config file.
    #[arg(long, global = true, env = "JOBS_SERVICE_NAME")]
    service: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List pending jobs for the service.
    List,

    /// Pretty-print a job's document from one of its filed lists.
    Print {
        status: JobListArg,
        job_id: String,
    },

    /// Requeue a failed job by copying {type, service, config} into a fresh
    /// pending entry.
    Retry {
        job_id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum JobListArg {
    Pending,
    Success,
    Failure,
}

impl JobListArg {
    fn as_str(self) -> &'static str {
        match self {
            JobListArg::Pending => "pending",
            JobListArg::Success => "success",
            JobListArg::Failure => "failure",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "command failed");
            eprintln!("{} {}", "error:".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => ServiceConfig::load(path)?,
        None => ServiceConfig::from_env()?,
    };
    if let Some(service) = cli.service {
        config.name = service;
    }

    let store = HttpStoreClient::with_timeout(
        config.store.domain.clone(),
        config.store.token.clone(),
        config.store.request_timeout(),
    );

    match cli.command {
        Commands::List => list(&store, &config.name).await,
        Commands::Print { status, job_id } => print_job(&store, &config.name, status, &job_id).await,
        Commands::Retry { job_id } => retry(&store, &config.name, &job_id).await,
    }
}

async fn list(store: &dyn StoreClient, service: &str) -> Result<()> {
    let path = format!("/bookmarks/services/{service}/jobs/pending");
    let doc = store.get(&path).await?;
    let Some(entries) = doc.data.as_object() else {
        println!("no pending jobs");
        return Ok(());
    };

    let mut table = Table::new();
    table.add_row(row!["KEY", "TYPE", "STATUS"]);

    let mut keys: Vec<&String> = entries.keys().filter(|k| !k.starts_with('_')).collect();
    keys.sort();

    for key in keys {
        let Some(job_path) = entries[key].get("_id").and_then(|v| v.as_str()) else {
            continue;
        };
        let (job_type, status) = match store.get(job_path).await {
            Ok(job_doc) => (
                job_doc.data.get("type").and_then(|v| v.as_str()).unwrap_or("?").to_string(),
                job_doc.data.get("status").and_then(|v| v.as_str()).unwrap_or("pending").to_string(),
            ),
            Err(_) => ("?".to_string(), "unreadable".to_string()),
        };
        table.add_row(row![key, job_type, status]);
    }

    table.printstd();
    Ok(())
}

/// Scans every day bucket under `<status>/day-index` for `job_id`, returning
/// the link entry and the job document it resolves to.
async fn find_in_index(
    store: &dyn StoreClient,
    service: &str,
    status: &str,
    job_id: &str,
) -> Result<(serde_json::Value, serde_json::Value)> {
    if status == "pending" {
        let link = store
            .get(&format!("/bookmarks/services/{service}/jobs/pending/{job_id}"))
            .await?
            .data;
        let job_path = link
            .get("_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::other(format!("pending entry {job_id} has no link")))?;
        let job = store.get(job_path).await?.data;
        return Ok((link, job));
    }

    let index_path = format!("/bookmarks/services/{service}/jobs/{status}/day-index");
    let index = store.get(&index_path).await?.data;
    let Some(days) = index.as_object() else {
        return Err(Error::other(format!("no {status} entries for service {service}")));
    };
    for (_day, entries) in days {
        let Some(link) = entries.get(job_id) else {
            continue;
        };
        let job_path = link
            .get("_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::other(format!("{status} entry {job_id} has no link")))?;
        let job = store.get(job_path).await?.data;
        return Ok((link.clone(), job));
    }
    Err(Error::other(format!("job {job_id} not found under {status}")))
}

async fn print_job(store: &dyn StoreClient, service: &str, status: JobListArg, job_id: &str) -> Result<()> {
    let (_link, job) = find_in_index(store, service, status.as_str(), job_id).await?;
    println!("{}", serde_json::to_string_pretty(&job).map_err(Error::from)?.cyan());
    Ok(())
}

async fn retry(store: &dyn StoreClient, service: &str, job_id: &str) -> Result<()> {
    let (_link, job) = find_in_index(store, service, "failure", job_id).await?;

    let fresh = serde_json::json!({
        "type": job.get("type").cloned().unwrap_or(serde_json::Value::Null),
        "service": job.get("service").cloned().unwrap_or(serde_json::Value::Null),
        "config": job.get("config").cloned().unwrap_or(serde_json::Value::Null),
    });
    let location = store.post("/resources", fresh).await?;

    let key = ulid::Ulid::new().to_string();
    let pending_path = format!("/bookmarks/services/{service}/jobs/pending/{key}");
    store
        .put(&pending_path, serde_json::json!({"_id": location.path}), None)
        .await?;

    println!("{} requeued as {}", job_id.green(), key);
    Ok(())
}
