//! In-memory stand-ins for the queue store and the worker platform.

#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use dyno_queue::models::job::{JobRecord, JobState, JobType, QueueCounts};
use dyno_queue::services::platform::{PoolError, WorkerPlatform};
use dyno_queue::services::queue::{QueueStore, StoreError};

/// Queue store backed by a vector. Every method holds the lock for its whole
/// body, which gives the same per-statement atomicity as the database.
pub struct MemoryQueueStore {
    job_type: JobType,
    rows: Mutex<Vec<JobRecord>>,
}

impl MemoryQueueStore {
    pub fn new(job_type: JobType) -> Self {
        Self {
            job_type,
            rows: Mutex::new(Vec::new()),
        }
    }

    pub fn with_ids(count: usize) -> Self {
        let store = Self::new(JobType::Normal);
        let ids: Vec<String> = (0..count).map(|i| format!("10.1000/job-{}", i)).collect();
        store.insert(&ids).expect("fresh ids are unique");
        store
    }

    fn insert(&self, ids: &[String]) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let mut staged: Vec<JobRecord> = Vec::with_capacity(ids.len());
        for id in ids {
            let id = id.to_lowercase();
            if rows.iter().chain(staged.iter()).any(|r| r.id == id) {
                return Err(StoreError::Conflict {
                    constraint: format!("{}_pkey", self.job_type.table_name()),
                });
            }
            let n = (rows.len() + staged.len()) as u64;
            staged.push(JobRecord {
                id,
                rand: (n.wrapping_mul(2_654_435_761) % 10_007) as f64 / 10_007.0,
                started: None,
                finished: None,
                dyno: None,
            });
        }
        let inserted = staged.len() as u64;
        rows.extend(staged);
        Ok(inserted)
    }

    pub fn states(&self) -> Vec<Option<JobState>> {
        self.rows.lock().unwrap().iter().map(JobRecord::state).collect()
    }

    pub fn snapshot(&self) -> Vec<JobRecord> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn counts(&self) -> Result<QueueCounts, StoreError> {
        let rows = self.rows.lock().unwrap();
        let mut counts = QueueCounts::default();
        for row in rows.iter() {
            counts.total += 1;
            match row.state() {
                Some(JobState::Waiting) => counts.waiting += 1,
                Some(JobState::Claimed) => counts.claimed += 1,
                Some(JobState::Done) => counts.done += 1,
                None => {}
            }
        }
        Ok(counts)
    }

    async fn count_total(&self) -> Result<u64, StoreError> {
        Ok(self.rows.lock().unwrap().len() as u64)
    }

    async fn count_waiting(&self) -> Result<u64, StoreError> {
        Ok(self.rows.lock().unwrap().iter().filter(|r| r.started.is_none()).count() as u64)
    }

    async fn count_unfinished(&self) -> Result<u64, StoreError> {
        Ok(self.rows.lock().unwrap().iter().filter(|r| r.finished.is_none()).count() as u64)
    }

    async fn in_flight_workers(&self) -> Result<Vec<String>, StoreError> {
        let rows = self.rows.lock().unwrap();
        let mut workers: Vec<String> = rows
            .iter()
            .filter(|r| r.state() == Some(JobState::Claimed))
            .filter_map(|r| r.dyno.clone())
            .collect();
        workers.sort();
        workers.dedup();
        Ok(workers)
    }

    async fn reset_all(&self) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        for row in rows.iter_mut() {
            row.started = None;
            row.finished = None;
            row.dyno = None;
        }
        Ok(rows.len() as u64)
    }

    async fn kick(&self) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let mut kicked = 0;
        for row in rows.iter_mut().filter(|r| r.started.is_some() && r.finished.is_none()) {
            row.started = None;
            row.dyno = None;
            kicked += 1;
        }
        Ok(kicked)
    }

    async fn truncate(&self) -> Result<(), StoreError> {
        self.rows.lock().unwrap().clear();
        Ok(())
    }

    async fn bulk_insert(&self, ids: &[String]) -> Result<u64, StoreError> {
        self.insert(ids)
    }

    async fn claim_next(&self, worker: &str) -> Result<Option<String>, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let next = rows
            .iter_mut()
            .filter(|r| r.started.is_none())
            .min_by(|a, b| a.rand.total_cmp(&b.rand));
        Ok(next.map(|row| {
            row.started = Some(Utc::now());
            row.dyno = Some(worker.to_string());
            row.id.clone()
        }))
    }

    async fn mark_finished(&self, id: &str) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.iter_mut().find(|r| r.id == id && r.finished.is_none()) {
            Some(row) => {
                let now = Utc::now();
                row.started.get_or_insert(now);
                row.finished = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_job(&self, id: &str) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.rows.lock().unwrap().iter().find(|r| r.id == id).cloned())
    }
}

/// Worker platform that applies scale requests immediately.
#[derive(Default)]
pub struct FakePlatform {
    pub running: Mutex<u32>,
    pub requests: Mutex<Vec<u32>>,
    pub fail_lookups: bool,
    pub fail_scaling: bool,
}

impl FakePlatform {
    pub fn running(n: u32) -> Self {
        Self {
            running: Mutex::new(n),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<u32> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkerPlatform for FakePlatform {
    async fn running_workers(&self, _process: &str) -> Result<u32, PoolError> {
        if self.fail_lookups {
            return Err(PoolError::NotFound("formation not found".to_string()));
        }
        Ok(*self.running.lock().unwrap())
    }

    async fn set_workers(&self, _process: &str, quantity: u32) -> Result<(), PoolError> {
        self.requests.lock().unwrap().push(quantity);
        if self.fail_scaling {
            return Err(PoolError::NotFound("formation not found".to_string()));
        }
        *self.running.lock().unwrap() = quantity;
        Ok(())
    }
}
