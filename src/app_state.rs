use sqlx::PgPool;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::models::job::JobType;
use crate::services::{
    platform::WorkerPlatform,
    pool::PoolController,
    queue::{PgQueueStore, QueueStore},
};

/// Everything a command needs, built once and passed down explicitly.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub job_type: JobType,
    pub store: Arc<dyn QueueStore>,
    pub pool: Option<PoolController>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        job_type: JobType,
        platform: Option<Arc<dyn WorkerPlatform>>,
        config: AppConfig,
    ) -> Self {
        let pool = platform
            .map(|platform| PoolController::new(platform, job_type, config.monitor.settle_delay()));
        Self {
            store: Arc::new(PgQueueStore::new(db.clone(), job_type)),
            db,
            job_type,
            pool,
            config: Arc::new(config),
        }
    }

    /// The pool controller, or an error naming the missing credentials.
    pub fn pool(&self) -> Result<&PoolController, crate::config::ConfigError> {
        self.pool
            .as_ref()
            .ok_or(crate::config::ConfigError::Missing("HEROKU_APP_NAME and HEROKU_API_KEY"))
    }
}
