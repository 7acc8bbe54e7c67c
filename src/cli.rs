//! Operator commands.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};

use crate::app_state::AppState;
use crate::config::AppConfig;
use crate::db;
use crate::models::job::JobType;
use crate::services::{
    estimator::DrainCheck,
    loader::{self, SourceDataset},
    monitor::{Monitor, MonitorOutcome},
    platform::{HerokuClient, WorkerPlatform},
    processor::{clean_doi, CommandProcessor, JobProcessor},
    queue::QueueStore,
};
use crate::telemetry;

#[derive(Parser)]
#[command(name = "dynoq")]
#[command(about = "Load, watch and drain a job queue worked by a Heroku process group")]
#[command(version)]
pub struct Cli {
    /// Which queue and worker process group to operate on
    #[arg(long, global = true, default_value_t = JobType::Normal)]
    job_type: JobType,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Truncate the queue and load identifiers from a file, one per line
    Load {
        file: PathBuf,
    },

    /// Truncate the queue and load every identifier from the source dataset
    LoadAll {
        /// SQL predicate on the source table (e.g. "year > 2015")
        #[arg(long)]
        filter: Option<String>,
    },

    /// Put every job back to waiting, including finished ones
    Reset,

    /// Put started but unfinished jobs back to waiting so they are retried
    Kick,

    /// Delete every job in the queue
    Truncate,

    /// Show how many jobs are waiting
    Status,

    /// Set the number of workers
    Scale {
        workers: u32,
    },

    /// Monitor until done, then turn off the workers
    Monitor {
        #[arg(long)]
        drain_check: Option<DrainCheck>,
    },

    /// Soup to nuts: scale up, monitor until done, scale to zero
    Soup {
        /// Number of workers to start (default: 1)
        #[arg(short, long)]
        workers: Option<u32>,
        #[arg(long)]
        drain_check: Option<DrainCheck>,
    },

    /// Run a single job by id, outside the queue
    #[command(group(ArgGroup::new("target").required(true).args(["id", "doi"])))]
    Run {
        /// Job id, used as given
        #[arg(long)]
        id: Option<String>,
        /// DOI, normalized before use
        #[arg(long)]
        doi: Option<String>,
    },

    /// Tail platform logs for the worker process group
    Logs,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::from_env().context("Failed to load configuration")?;

    if let Some(addr) = config.metrics_bind_addr.as_deref() {
        telemetry::init_metrics(addr)?;
    }

    match &cli.command {
        Commands::Run { id, doi } => {
            let id = match (id, doi) {
                (Some(id), _) => id.clone(),
                (None, Some(doi)) => clean_doi(doi),
                (None, None) => anyhow::bail!("either --id or --doi is required"),
            };
            return run_single(&config, cli.job_type, &id).await;
        }
        Commands::Logs => return tail_logs(&config, cli.job_type).await,
        Commands::Monitor { drain_check: Some(check) } | Commands::Soup { drain_check: Some(check), .. } => {
            config.monitor.drain_check = *check;
        }
        _ => {}
    }

    let state = connect(config, cli.job_type).await?;

    match cli.command {
        Commands::Load { file } => {
            stop_workers(&state).await;
            state.store.truncate().await?;
            loader::load_from_file(state.store.as_ref(), &file).await?;
            print_status(state.store.as_ref()).await?;
        }
        Commands::LoadAll { filter } => {
            stop_workers(&state).await;
            let source = SourceDataset::new(&state.config.source_table, &state.config.source_id_column)?;
            state.store.truncate().await?;
            loader::load_from_source(&state.db, state.job_type, &source, filter.as_deref()).await?;
            print_status(state.store.as_ref()).await?;
        }
        Commands::Reset => {
            state.store.reset_all().await?;
        }
        Commands::Kick => {
            state.store.kick().await?;
            print_status(state.store.as_ref()).await?;
        }
        Commands::Truncate => {
            state.store.truncate().await?;
        }
        Commands::Status => {
            print_status(state.store.as_ref()).await?;
        }
        Commands::Scale { workers } => {
            state.pool()?.scale(workers).await;
        }
        Commands::Monitor { .. } => {
            monitor_till_done(&state).await?;
        }
        Commands::Soup { workers, .. } => {
            let pool = state.pool()?;
            pool.stop_if_running().await;
            let workers = workers.unwrap_or_else(|| {
                tracing::info!("No number of workers specified, so setting 1");
                1
            });
            pool.scale(workers).await;
            monitor_till_done(&state).await?;
        }
        Commands::Run { .. } | Commands::Logs => {}
    }

    Ok(())
}

async fn connect(config: AppConfig, job_type: JobType) -> anyhow::Result<AppState> {
    tracing::debug!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url, db::COMMAND_CONNECTIONS)
        .await
        .context("Failed to connect to database")?;
    db::run_migrations(&db_pool)
        .await
        .context("Failed to run database migrations")?;

    let platform: Option<Arc<dyn WorkerPlatform>> = match config.heroku() {
        Ok((app, key)) => Some(Arc::new(HerokuClient::new(app.to_string(), key.to_string())?)),
        Err(_) => None,
    };

    Ok(AppState::new(db_pool, job_type, platform, config))
}

/// Workers must not claim rows while the queue is being replaced.
async fn stop_workers(state: &AppState) {
    match state.pool.as_ref() {
        Some(pool) => {
            pool.stop_if_running().await;
        }
        None => tracing::warn!("No platform credentials configured, not checking for running workers"),
    }
}

async fn monitor_till_done(state: &AppState) -> anyhow::Result<()> {
    let pool = state.pool()?;
    let monitor = Monitor::new(state.store.as_ref(), pool, state.config.monitor.monitor_config());
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    match monitor.run(shutdown).await? {
        MonitorOutcome::Drained { ticks, scale } => {
            tracing::info!(ticks, workers = %scale.observed, "Queue drained");
        }
        MonitorOutcome::Cancelled { unfinished, .. } => {
            tracing::warn!(unfinished, "Stopped before the queue drained");
        }
    }
    Ok(())
}

async fn print_status(store: &dyn QueueStore) -> anyhow::Result<()> {
    let counts = store.counts().await?;
    match counts.percent_waiting() {
        Some(percent) => println!(
            "There are {} jobs in the {} queue, of which {} ({}%) are waiting to run",
            counts.total,
            store.job_type(),
            counts.waiting,
            percent
        ),
        None => println!("The {} queue is empty", store.job_type()),
    }
    println!("  claimed: {}  done: {}", counts.claimed, counts.done);

    let workers = store.in_flight_workers().await?;
    if !workers.is_empty() {
        println!("  workers still running: {}", workers.join(", "));
    }
    Ok(())
}

async fn run_single(config: &AppConfig, job_type: JobType, id: &str) -> anyhow::Result<()> {
    let processor = CommandProcessor::from_command_line(config.job_command()?, job_type)?;
    let start = std::time::Instant::now();
    processor.process(id).await?;
    tracing::info!(job_id = id, elapsed_secs = start.elapsed().as_secs_f64(), "Finished update");
    Ok(())
}

async fn tail_logs(config: &AppConfig, job_type: JobType) -> anyhow::Result<()> {
    let (app, key) = config.heroku()?;
    let client = HerokuClient::new(app.to_string(), key.to_string())?;
    client
        .tail_logs(job_type.process_name(), |line| println!("{}", line))
        .await?;
    Ok(())
}
