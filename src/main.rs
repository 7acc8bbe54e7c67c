use dyno_queue::{cli, config::LogSettings, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logging = LogSettings::from_env()?;
    telemetry::init_tracing(logging.json());

    cli::run().await
}
