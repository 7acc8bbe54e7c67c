use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Selects one of the parallel queue tables and its worker process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    #[default]
    Normal,
    Hybrid,
    Dates,
}

impl JobType {
    pub const ALL: [JobType; 3] = [JobType::Normal, JobType::Hybrid, JobType::Dates];

    /// Queue table backing this job type.
    pub fn table_name(self) -> &'static str {
        match self {
            JobType::Normal => "job_queue",
            JobType::Hybrid => "job_queue_with_hybrid",
            JobType::Dates => "job_queue_dates",
        }
    }

    /// Worker process-group (formation) name on the platform.
    pub fn process_name(self) -> &'static str {
        match self {
            JobType::Normal => "run",
            JobType::Hybrid => "run_with_hybrid",
            JobType::Dates => "run_dates",
        }
    }
}

/// Lifecycle state of a job, derived from its two timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Waiting,
    Claimed,
    Done,
}

impl JobState {
    /// `None` when the timestamps describe an impossible row
    /// (finished without ever being started).
    pub fn derive(started: Option<DateTime<Utc>>, finished: Option<DateTime<Utc>>) -> Option<Self> {
        match (started, finished) {
            (None, None) => Some(JobState::Waiting),
            (Some(_), None) => Some(JobState::Claimed),
            (Some(_), Some(_)) => Some(JobState::Done),
            (None, Some(_)) => None,
        }
    }
}

/// One row of a queue table.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobRecord {
    pub id: String,
    pub rand: f64,
    pub started: Option<DateTime<Utc>>,
    pub finished: Option<DateTime<Utc>>,
    pub dyno: Option<String>,
}

impl JobRecord {
    pub fn state(&self) -> Option<JobState> {
        JobState::derive(self.started, self.finished)
    }
}

/// Aggregate counts of a queue taken in a single statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub total: u64,
    pub waiting: u64,
    pub claimed: u64,
    pub done: u64,
}

impl QueueCounts {
    /// Rows without a `finished` timestamp (waiting + claimed).
    pub fn unfinished(&self) -> u64 {
        self.waiting + self.claimed
    }

    /// Integer percentage of rows still waiting, `None` for an empty queue.
    pub fn percent_waiting(&self) -> Option<u64> {
        if self.total == 0 {
            return None;
        }
        Some(100 * self.waiting / self.total)
    }
}
