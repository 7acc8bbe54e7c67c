use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::services::estimator::{EstimatorConfig, ProgressEstimator, WindowKind, WindowReport};
use crate::services::pool::{PoolController, ScaleOutcome};
use crate::services::queue::{QueueStore, StoreError};

#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    pub tick: Duration,
    pub estimator: EstimatorConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(3),
            estimator: EstimatorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Running,
    Drained,
}

/// How a monitor run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorOutcome {
    /// The queue drained and the pool was scaled to zero.
    Drained { ticks: u64, scale: ScaleOutcome },
    /// Shutdown was requested; the pool was left as it was.
    Cancelled { ticks: u64, unfinished: u64 },
}

/// Watches a queue until it drains, then turns the worker pool off.
///
/// Only aggregate counts are read from the store.
pub struct Monitor<'a> {
    store: &'a dyn QueueStore,
    pool: &'a PoolController,
    config: MonitorConfig,
}

impl<'a> Monitor<'a> {
    pub fn new(store: &'a dyn QueueStore, pool: &'a PoolController, config: MonitorConfig) -> Self {
        Self { store, pool, config }
    }

    pub async fn run<S>(&self, shutdown: S) -> Result<MonitorOutcome, StoreError>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!(job_type = %self.store.job_type(), "Collecting data, will have some stats soon");

        let total = self.store.count_total().await?;
        let unfinished = self.store.count_unfinished().await?;
        tracing::info!(total, unfinished, "Initial queue sample");
        metrics::gauge!("queue_jobs_total").set(total as f64);
        metrics::gauge!("queue_jobs_unfinished").set(unfinished as f64);

        let mut estimator = ProgressEstimator::new(total, unfinished, Instant::now(), &self.config.estimator);
        let mut state = MonitorState::Running;
        let mut ticks = 0u64;

        while state == MonitorState::Running {
            if estimator.is_drained() {
                state = MonitorState::Drained;
                continue;
            }

            tokio::select! {
                _ = &mut shutdown => {
                    let unfinished = estimator.last_sample(WindowKind::Short);
                    tracing::warn!(ticks, unfinished, "Monitor cancelled, leaving worker pool as is");
                    return Ok(MonitorOutcome::Cancelled { ticks, unfinished });
                }
                _ = tokio::time::sleep(self.config.tick) => {}
            }
            ticks += 1;

            let reports = estimator
                .tick(Instant::now(), || self.store.count_unfinished())
                .await?;
            for report in &reports {
                log_report(report);
            }
        }

        tracing::info!(ticks, "Everything is done, turning off all the workers");
        let scale = self.pool.scale(0).await;
        Ok(MonitorOutcome::Drained { ticks, scale })
    }
}

fn log_report(report: &WindowReport) {
    metrics::gauge!("queue_jobs_unfinished").set(report.unfinished as f64);
    let percent = report.fraction_done().map(|f| (f * 100.0) as u64).unwrap_or(0);
    tracing::info!(
        window = %report.window,
        "{} finished in the last {} seconds, {} of {} are now finished ({}%)",
        report.finished_this_window,
        report.threshold.as_secs(),
        report.finished_total(),
        report.total,
        percent
    );
    match report.minutes_left {
        Some(minutes) => tracing::info!(
            window = %report.window,
            "{} estimate: done in {:.1} mins, which is {:.1} hours",
            report.window,
            minutes,
            minutes / 60.0
        ),
        None => tracing::info!(window = %report.window, "{} estimate: no estimate available", report.window),
    }
}
