use std::sync::Arc;
use std::time::Duration;

use crate::models::job::JobType;
use crate::services::platform::WorkerPlatform;

/// Result of asking the platform how many workers are running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerCount {
    Known(u32),
    /// The lookup failed; nothing is known about the pool.
    Unknown,
}

impl WorkerCount {
    /// Treat an unknown count as "no workers running" for scaling decisions.
    pub fn or_zero(self) -> u32 {
        match self {
            WorkerCount::Known(n) => n,
            WorkerCount::Unknown => 0,
        }
    }
}

impl std::fmt::Display for WorkerCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerCount::Known(n) => write!(f, "{}", n),
            WorkerCount::Unknown => f.write_str("unknown"),
        }
    }
}

/// What happened when the pool was scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleOutcome {
    pub requested: u32,
    /// The platform accepted the request.
    pub accepted: bool,
    /// Count observed after the settle delay.
    pub observed: WorkerCount,
}

impl ScaleOutcome {
    pub fn verified(&self) -> bool {
        self.accepted && self.observed == WorkerCount::Known(self.requested)
    }
}

/// Reads and sets the worker count of one process group.
#[derive(Clone)]
pub struct PoolController {
    platform: Arc<dyn WorkerPlatform>,
    process: &'static str,
    settle_delay: Duration,
}

impl PoolController {
    pub fn new(platform: Arc<dyn WorkerPlatform>, job_type: JobType, settle_delay: Duration) -> Self {
        Self {
            platform,
            process: job_type.process_name(),
            settle_delay,
        }
    }

    pub fn process(&self) -> &'static str {
        self.process
    }

    /// Never fails: a lookup error is logged and reported as `Unknown`.
    pub async fn current_count(&self) -> WorkerCount {
        match self.platform.running_workers(self.process).await {
            Ok(n) => {
                metrics::gauge!("worker_pool_size").set(n as f64);
                WorkerCount::Known(n)
            }
            Err(e) => {
                tracing::warn!(process = self.process, error = %e, "Worker count lookup failed, assuming 0");
                WorkerCount::Unknown
            }
        }
    }

    /// Request `n` workers, wait for the platform to settle, then read the
    /// count back for verification. Failures and mismatches are logged only.
    pub async fn scale(&self, n: u32) -> ScaleOutcome {
        let before = self.current_count().await;
        tracing::info!(process = self.process, current = %before, requested = n, "Scaling worker pool");
        metrics::counter!("worker_pool_scale_requests_total").increment(1);

        let accepted = match self.platform.set_workers(self.process, n).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(process = self.process, requested = n, error = %e, "Scale request failed");
                false
            }
        };

        tracing::info!(seconds = self.settle_delay.as_secs_f64(), "Waiting for scale to take effect");
        tokio::time::sleep(self.settle_delay).await;

        let observed = self.current_count().await;
        let outcome = ScaleOutcome {
            requested: n,
            accepted,
            observed,
        };
        if outcome.verified() {
            tracing::info!(process = self.process, workers = n, "Verified worker count");
        } else {
            tracing::warn!(
                process = self.process,
                requested = n,
                observed = %observed,
                "Worker count does not match request yet"
            );
        }
        outcome
    }

    /// Scale to zero only if something may be running.
    pub async fn stop_if_running(&self) -> Option<ScaleOutcome> {
        if self.current_count().await.or_zero() > 0 {
            Some(self.scale(0).await)
        } else {
            None
        }
    }
}
