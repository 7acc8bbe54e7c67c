use async_trait::async_trait;
use tokio::process::Command;

use crate::models::job::JobType;
use crate::services::queue::{QueueStore, StoreError};

/// Executes the domain work for one job id.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, id: &str) -> Result<(), ProcessorError>;
}

/// Runs an external program with the job id as its last argument.
///
/// All process groups of an app share one command, so the program learns
/// which queue it serves from `JOB_TYPE` (`normal`, `hybrid`, `dates`) and
/// `JOB_PROCESS` (`run`, `run_with_hybrid`, `run_dates`).
pub struct CommandProcessor {
    program: String,
    args: Vec<String>,
    job_type: JobType,
}

impl CommandProcessor {
    /// `command_line` is split on whitespace, e.g. `python update.py --id`.
    pub fn from_command_line(command_line: &str, job_type: JobType) -> Result<Self, ProcessorError> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(ProcessorError::EmptyCommand)?;
        Ok(Self {
            program,
            args: parts.collect(),
            job_type,
        })
    }
}

#[async_trait]
impl JobProcessor for CommandProcessor {
    async fn process(&self, id: &str) -> Result<(), ProcessorError> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(id)
            .env("JOB_TYPE", self.job_type.to_string())
            .env("JOB_PROCESS", self.job_type.process_name())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| ProcessorError::Spawn {
                program: self.program.clone(),
                source: e,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(ProcessorError::Failed {
                id: id.to_string(),
                code: status.code(),
            })
        }
    }
}

/// Outcome of one pass of the claim protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimResult {
    /// Nothing was waiting.
    Empty,
    Finished(String),
    /// The processor failed; the row stays claimed until kicked.
    Failed(String),
}

/// Claim one waiting job, process it, and record completion.
pub async fn process_next_job(
    store: &dyn QueueStore,
    processor: &dyn JobProcessor,
    worker: &str,
) -> Result<ClaimResult, StoreError> {
    let id = match store.claim_next(worker).await? {
        Some(id) => id,
        None => return Ok(ClaimResult::Empty),
    };

    tracing::info!(job_id = %id, worker, "Claimed job");
    let start = std::time::Instant::now();

    match processor.process(&id).await {
        Ok(()) => {
            let recorded = store.mark_finished(&id).await?;
            let elapsed = start.elapsed();
            metrics::histogram!("job_processing_seconds").record(elapsed.as_secs_f64());
            metrics::counter!("queue_jobs_processed_total").increment(1);
            if !recorded {
                tracing::warn!(job_id = %id, "Job was already finished by another worker");
            }
            tracing::info!(job_id = %id, elapsed_ms = elapsed.as_millis() as u64, "Job finished");
            Ok(ClaimResult::Finished(id))
        }
        Err(e) => {
            metrics::counter!("queue_jobs_failed_total").increment(1);
            tracing::error!(job_id = %id, error = %e, "Job processing failed, leaving it claimed");
            Ok(ClaimResult::Failed(id))
        }
    }
}

/// Normalize a DOI given as a bare DOI, a `doi:` URI, or a resolver URL.
pub fn clean_doi(raw: &str) -> String {
    let trimmed = raw.trim();
    let lower = trimmed.to_lowercase();
    let prefixes = [
        "https://doi.org/",
        "http://doi.org/",
        "https://dx.doi.org/",
        "http://dx.doi.org/",
        "doi.org/",
        "doi:",
    ];
    let rest = prefixes
        .iter()
        .find_map(|p| lower.strip_prefix(p))
        .unwrap_or(&lower);
    rest.trim().to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("Job command is empty")]
    EmptyCommand,

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Job {id} exited with status {code:?}")]
    Failed { id: String, code: Option<i32> },
}
