//! landit CLI: run a worker, submit jobs and inspect them.

use clap::{Parser, Subcommand};
use landit_scheduler::JobRequest;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "landit")]
#[command(about = "Scaffold-and-land worker", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "LANDIT_CONFIG", default_value = "landit.kdl")]
    config: PathBuf,

    /// Postgres connection string; overrides the config file
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// GitHub token file; overrides the config file
    #[arg(long, env = "GITHUB_TOKEN_FILE")]
    token_file: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Claim and run jobs until interrupted
    Worker {
        /// Worker id recorded in logs
        #[arg(long)]
        id: Option<String>,
        /// Process at most one job, then exit
        #[arg(long)]
        once: bool,
    },
    /// Enqueue a job
    Submit {
        owner: String,
        repo: String,
        /// Task text appended to the README
        task: String,
        #[arg(long)]
        template: Option<String>,
        /// Create the repository as public if it does not exist
        #[arg(long)]
        public: bool,
        /// Fail instead of creating a missing repository
        #[arg(long)]
        no_create_repo: bool,
        #[arg(long)]
        trace_id: Option<String>,
    },
    /// Show a job snapshot
    Status { id: String },
    /// Request cancellation of a job
    Cancel { id: String },
    /// List the artifacts stored for a job
    Artifacts { id: String },
    /// List recent jobs
    List {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Validate a configuration file
    Validate {
        /// Defaults to --config
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    if let Commands::Validate { path } = &cli.command {
        return commands::validate(path.as_ref().unwrap_or(&cli.config));
    }

    let config = commands::load_config(&cli.config, cli.database_url, cli.token_file)?;
    match cli.command {
        Commands::Worker { id, once } => commands::worker(config, id, once).await?,
        Commands::Submit {
            owner,
            repo,
            task,
            template,
            public,
            no_create_repo,
            trace_id,
        } => {
            let request = JobRequest {
                owner,
                repo,
                task,
                template,
                private: Some(!public),
                create_repo: Some(!no_create_repo),
                trace_id,
            };
            commands::submit(&config, request).await?;
        }
        Commands::Status { id } => commands::status(&config, &id).await?,
        Commands::Cancel { id } => commands::cancel(&config, &id).await?,
        Commands::Artifacts { id } => commands::artifacts(&config, &id).await?,
        Commands::List { limit } => commands::list(&config, limit).await?,
        Commands::Validate { .. } => {}
    }

    Ok(())
}
