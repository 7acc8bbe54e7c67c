use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

/// Initialize structured logging. Workers log JSON lines, the CLI logs text.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    }
}

/// Install the Prometheus recorder with its own scrape listener and register
/// metric descriptions.
pub fn init_metrics(bind_addr: &str) -> Result<(), TelemetryError> {
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|_| TelemetryError::BindAddr(bind_addr.to_string()))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

    metrics::describe_gauge!("queue_jobs_total", "Rows in the queue when monitoring started");
    metrics::describe_gauge!("queue_jobs_unfinished", "Rows without a finished timestamp");
    metrics::describe_gauge!("worker_pool_size", "Workers reported running by the platform");
    metrics::describe_counter!("worker_pool_scale_requests_total", "Scale requests sent to the platform");
    metrics::describe_counter!("queue_jobs_processed_total", "Jobs finished by this worker");
    metrics::describe_counter!("queue_jobs_failed_total", "Jobs whose processor failed");
    metrics::describe_histogram!("job_processing_seconds", "Time to process a single job");

    tracing::info!(%addr, "Prometheus metrics listener started");
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Invalid metrics bind address: {0}")]
    BindAddr(String),

    #[error("Failed to install Prometheus exporter: {0}")]
    Exporter(String),
}
