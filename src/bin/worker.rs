use clap::Parser;
use dyno_queue::{
    config::AppConfig,
    db,
    models::job::JobType,
    services::{
        processor::{process_next_job, ClaimResult, CommandProcessor},
        queue::PgQueueStore,
    },
    telemetry,
};
use std::time::Duration;
use tokio::time::sleep;

const POLL_INTERVAL_MS: u64 = 5000; // 5 seconds

#[derive(Parser)]
#[command(name = "worker")]
#[command(about = "Claim and process jobs until stopped")]
struct Args {
    /// Which queue to work
    #[arg(long, default_value_t = JobType::Normal)]
    job_type: JobType,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing(true);

    let args = Args::parse();
    tracing::info!(job_type = %args.job_type, "Starting queue worker");

    // Load configuration
    let config = AppConfig::from_env()?;
    if let Some(addr) = config.metrics_bind_addr.as_deref() {
        telemetry::init_metrics(addr)?;
    }
    let processor = CommandProcessor::from_command_line(config.job_command()?, args.job_type)?;

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url, db::WORKER_CONNECTIONS).await?;
    let store = PgQueueStore::new(db_pool, args.job_type);

    tracing::info!(worker = %config.dyno, "Worker ready, starting job processing loop");

    // Main processing loop. Storage errors are fatal: the platform restarts
    // the process, and its abandoned claim is recovered by `kick`.
    loop {
        match process_next_job(&store, &processor, &config.dyno).await? {
            ClaimResult::Finished(_) | ClaimResult::Failed(_) => {
                tracing::debug!("Job handled, checking for next job");
            }
            ClaimResult::Empty => {
                tracing::trace!("No jobs waiting, sleeping");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
        }
    }
}
