//! CLI command implementations.

use anyhow::{Context, Result, bail};
use landit_config::LanditConfig;
use landit_core::JobId;
use landit_core::artifact::ArtifactSink;
use landit_core::gateway::Credential;
use landit_core::store::JobStore;
use landit_db::{PgJobStore, create_pool, run_migrations};
use landit_executor::{
    CommandPolicy, FsArtifactSink, PolicyExecutor, Redactor, TokioProcessRunner,
};
use landit_scheduler::{JobRequest, JobService, PipelineEngine, PipelineSettings, Worker};
use landit_vcs::{GitCli, GitHubClient, GitHubGateway};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Load the config file, falling back to defaults when it does not exist,
/// then apply command-line overrides.
pub fn load_config(
    path: &Path,
    database_url: Option<String>,
    token_file: Option<PathBuf>,
) -> Result<LanditConfig> {
    let mut config = if path.exists() {
        LanditConfig::load(path).with_context(|| format!("loading {}", path.display()))?
    } else {
        warn!(path = %path.display(), "Config file not found, using defaults");
        LanditConfig::default()
    };
    if database_url.is_some() {
        config.worker.database_url = database_url;
    }
    if let Some(token_file) = token_file {
        config.github.token_file = token_file;
    }
    Ok(config)
}

async fn connect(config: &LanditConfig) -> Result<Arc<dyn JobStore>> {
    let Some(url) = config.worker.database_url.as_deref() else {
        bail!("no database configured; set DATABASE_URL or worker.database-url");
    };
    info!("Connecting to database...");
    let pool = create_pool(url).await?;
    run_migrations(&pool).await?;
    info!("Database connected");
    Ok(Arc::new(PgJobStore::new(pool)))
}

fn artifact_sink(config: &LanditConfig, redactor: Arc<Redactor>) -> Arc<FsArtifactSink> {
    Arc::new(FsArtifactSink::new(
        config.worker.artifact_root.clone(),
        redactor,
    ))
}

async fn service(config: &LanditConfig) -> Result<JobService> {
    let store = connect(config).await?;
    let redactor = Arc::new(Redactor::new(&config.policy.redaction)?);
    Ok(JobService::new(store, artifact_sink(config, redactor)))
}

pub async fn worker(config: LanditConfig, id: Option<String>, once: bool) -> Result<()> {
    landit_executor::ensure_unprivileged()?;
    let store = connect(&config).await?;
    let redactor = Arc::new(Redactor::new(&config.policy.redaction)?);
    let sink: Arc<dyn ArtifactSink> = artifact_sink(&config, redactor.clone());

    let executor = Arc::new(PolicyExecutor::new(
        CommandPolicy::new(&config.policy),
        Arc::new(TokioProcessRunner),
        sink.clone(),
        redactor.clone(),
        config.worker.command_timeout,
    ));
    let github = GitHubClient::new(
        config.github.api_url.clone(),
        Credential::new(config.github.token_file.clone()),
    )?;
    let gateway = Arc::new(GitHubGateway::new(
        github,
        GitCli::new(executor.clone()),
        config.github.clone_host.clone(),
    ));

    let shutdown = CancellationToken::new();
    let engine = Arc::new(PipelineEngine::new(
        store.clone(),
        gateway,
        sink,
        executor,
        PipelineSettings::from_config(&config),
        shutdown.clone(),
    ));
    let worker = Worker::new(
        id.unwrap_or_else(|| config.worker.id.clone()),
        store,
        engine,
        redactor,
        config.worker.poll_interval,
        shutdown.clone(),
    );

    if once {
        if !worker.run_once().await? {
            println!("No queued jobs");
        }
        return Ok(());
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            shutdown.cancel();
        }
    });
    worker.run().await?;
    Ok(())
}

pub async fn submit(config: &LanditConfig, request: JobRequest) -> Result<()> {
    let id = service(config).await?.enqueue(request).await?;
    println!("{id}");
    Ok(())
}

pub async fn status(config: &LanditConfig, id: &str) -> Result<()> {
    let job = service(config).await?.get_status(parse_id(id)?).await?;
    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}

pub async fn cancel(config: &LanditConfig, id: &str) -> Result<()> {
    let job = service(config).await?.request_cancel(parse_id(id)?).await?;
    println!("{} {}", job.id, job.status);
    Ok(())
}

pub async fn artifacts(config: &LanditConfig, id: &str) -> Result<()> {
    let entries = service(config).await?.artifacts(parse_id(id)?).await?;
    if entries.is_empty() {
        println!("No artifacts");
    }
    for entry in entries {
        println!("{:<48} {:>10}  {}", entry.path, entry.size, entry.checksum);
    }
    Ok(())
}

pub async fn list(config: &LanditConfig, limit: usize) -> Result<()> {
    let jobs = service(config).await?.list(limit).await?;
    for job in jobs {
        println!(
            "{}  {:<16} {:<18} {}",
            job.id,
            job.status.as_str(),
            job.stage.as_str(),
            job.full_name()
        );
    }
    Ok(())
}

pub fn validate(path: &Path) -> Result<()> {
    match LanditConfig::load(path) {
        Ok(_config) => {
            println!("Configuration is valid");
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

fn parse_id(id: &str) -> Result<JobId> {
    id.parse()
        .with_context(|| format!("invalid job id: {id}"))
}
