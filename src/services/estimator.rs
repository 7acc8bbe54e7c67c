//! Throughput-based completion estimates.
//!
//! The estimator keeps two sampling windows, each with its own timer. When a
//! window's timer has run past its threshold it re-samples the unfinished
//! count, reports what finished since its last sample, and extrapolates the
//! time left from that throughput. Time is passed in by the caller, so the
//! windows advance with whatever clock drives the monitor.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use strum::{Display, EnumString};
use tokio::time::Instant;

use crate::services::queue::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum WindowKind {
    Short,
    Long,
}

/// When the monitor may consider the queue drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Deserialize)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum DrainCheck {
    /// Any window's latest sample is zero.
    Any,
    /// Every window's latest sample is zero. A window that reads zero forces
    /// the others to re-sample on the next tick.
    #[default]
    Both,
}

#[derive(Debug, Clone, Copy)]
pub struct EstimatorConfig {
    pub short_window: Duration,
    pub long_window: Duration,
    pub drain_check: DrainCheck,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            short_window: Duration::from_secs(30),
            long_window: Duration::from_secs(600),
            drain_check: DrainCheck::default(),
        }
    }
}

/// Linear extrapolation of the most recent window's throughput.
///
/// Returns the number finished during the window and, when that number is
/// positive, the estimated minutes until `current` reaches zero.
pub fn estimate_minutes_left(last: u64, current: u64, threshold: Duration) -> (i64, Option<f64>) {
    let finished = last as i64 - current as i64;
    if finished <= 0 {
        return (finished, None);
    }
    let minutes = current as f64 / finished as f64 * threshold.as_secs_f64() / 60.0;
    (finished, Some(minutes))
}

/// Output of one window sample.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowReport {
    pub window: WindowKind,
    pub threshold: Duration,
    pub finished_this_window: i64,
    pub unfinished: u64,
    pub total: u64,
    pub minutes_left: Option<f64>,
}

impl WindowReport {
    pub fn finished_total(&self) -> u64 {
        self.total.saturating_sub(self.unfinished)
    }

    pub fn fraction_done(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some(self.finished_total() as f64 / self.total as f64)
    }
}

#[derive(Debug)]
struct SampleWindow {
    kind: WindowKind,
    threshold: Duration,
    last_unfinished: u64,
    started_at: Instant,
    forced: bool,
}

impl SampleWindow {
    fn new(kind: WindowKind, threshold: Duration, unfinished: u64, now: Instant) -> Self {
        Self {
            kind,
            threshold,
            last_unfinished: unfinished,
            started_at: now,
            forced: false,
        }
    }

    fn is_due(&self, now: Instant) -> bool {
        self.forced || now.saturating_duration_since(self.started_at) > self.threshold
    }

    fn record(&mut self, now: Instant, current: u64, total: u64) -> WindowReport {
        let (finished, minutes_left) = estimate_minutes_left(self.last_unfinished, current, self.threshold);
        self.last_unfinished = current;
        self.started_at = now;
        self.forced = false;
        WindowReport {
            window: self.kind,
            threshold: self.threshold,
            finished_this_window: finished,
            unfinished: current,
            total,
            minutes_left,
        }
    }
}

pub struct ProgressEstimator {
    total: u64,
    windows: [SampleWindow; 2],
    drain_check: DrainCheck,
}

impl ProgressEstimator {
    /// Start both windows from the same initial sample.
    pub fn new(total: u64, unfinished: u64, now: Instant, config: &EstimatorConfig) -> Self {
        Self {
            total,
            windows: [
                SampleWindow::new(WindowKind::Short, config.short_window, unfinished, now),
                SampleWindow::new(WindowKind::Long, config.long_window, unfinished, now),
            ],
            drain_check: config.drain_check,
        }
    }

    pub fn last_sample(&self, kind: WindowKind) -> u64 {
        self.windows
            .iter()
            .find(|w| w.kind == kind)
            .map(|w| w.last_unfinished)
            .unwrap_or(self.total)
    }

    pub fn is_drained(&self) -> bool {
        match self.drain_check {
            DrainCheck::Any => self.windows.iter().any(|w| w.last_unfinished == 0),
            DrainCheck::Both => self.windows.iter().all(|w| w.last_unfinished == 0),
        }
    }

    /// Re-sample every window that is due. `sample` is called once per due
    /// window and must return the current unfinished count.
    pub async fn tick<F, Fut>(&mut self, now: Instant, mut sample: F) -> Result<Vec<WindowReport>, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<u64, StoreError>>,
    {
        let mut reports = Vec::new();
        for window in self.windows.iter_mut() {
            if !window.is_due(now) {
                continue;
            }
            let current = sample().await?;
            reports.push(window.record(now, current, self.total));
        }

        if self.drain_check == DrainCheck::Both && self.windows.iter().any(|w| w.last_unfinished == 0) {
            for window in self.windows.iter_mut().filter(|w| w.last_unfinished != 0) {
                window.forced = true;
            }
        }
        Ok(reports)
    }
}
