use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;

const HEROKU_API: &str = "https://api.heroku.com";
const HEROKU_ACCEPT: &str = "application/vnd.heroku+json; version=3";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The external service that runs worker processes in named groups.
#[async_trait]
pub trait WorkerPlatform: Send + Sync {
    /// Number of processes currently running in `process`.
    async fn running_workers(&self, process: &str) -> Result<u32, PoolError>;

    /// Request that `process` run exactly `quantity` processes.
    async fn set_workers(&self, process: &str, quantity: u32) -> Result<(), PoolError>;
}

/// Client for the Heroku Platform API.
pub struct HerokuClient {
    http: Client,
    api_base: String,
    app_name: String,
    api_key: String,
    request_timeout: Duration,
}

#[derive(Deserialize)]
struct Dyno {
    name: String,
    #[serde(rename = "type")]
    process_type: String,
}

#[derive(Deserialize)]
struct LogSession {
    logplex_url: String,
}

impl HerokuClient {
    pub fn new(app_name: String, api_key: String) -> Result<Self, PoolError> {
        Self::with_endpoint(HEROKU_API.to_string(), app_name, api_key, REQUEST_TIMEOUT)
    }

    /// The client itself only bounds connecting. API calls carry
    /// `request_timeout` each; the log stream is unbounded.
    fn with_endpoint(
        api_base: String,
        app_name: String,
        api_key: String,
        request_timeout: Duration,
    ) -> Result<Self, PoolError> {
        let http = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_base,
            app_name,
            api_key,
            request_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/apps/{}/{}", self.api_base, self.app_name, path)
    }

    fn api(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, HEROKU_ACCEPT)
            .timeout(self.request_timeout)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, PoolError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(PoolError::NotFound(message));
        }
        Err(PoolError::Api { status, message })
    }

    /// Open a tailing log session and feed every line that mentions
    /// `process` to `on_line` until the stream closes.
    pub async fn tail_logs<F>(&self, process: &str, mut on_line: F) -> Result<(), PoolError>
    where
        F: FnMut(&str) + Send,
    {
        let response = self
            .api(self.http.post(self.url("log-sessions")))
            .json(&serde_json::json!({ "tail": true, "lines": 100 }))
            .send()
            .await?;
        let session: LogSession = Self::check(response).await?.json().await?;

        let mut stream = Self::check(self.http.get(&session.logplex_url).send().await?).await?;
        let mut pending = String::new();
        while let Some(chunk) = stream.chunk().await? {
            pending.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = pending.find('\n') {
                let line: String = pending.drain(..=pos).collect();
                let line = line.trim_end();
                if line.contains(process) {
                    on_line(line);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl WorkerPlatform for HerokuClient {
    async fn running_workers(&self, process: &str) -> Result<u32, PoolError> {
        let response = self.api(self.http.get(self.url("dynos"))).send().await?;
        let dynos: Vec<Dyno> = Self::check(response).await?.json().await?;

        let running: Vec<&str> = dynos
            .iter()
            .filter(|d| d.process_type == process)
            .map(|d| d.name.as_str())
            .collect();
        tracing::debug!(process, dynos = ?running, "Listed dynos");
        Ok(running.len() as u32)
    }

    async fn set_workers(&self, process: &str, quantity: u32) -> Result<(), PoolError> {
        let response = self
            .api(self.http.patch(self.url(&format!("formation/{}", process))))
            .json(&serde_json::json!({ "quantity": quantity }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("HTTP request to worker platform failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Worker platform returned {status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("Process group or app not found: {0}")]
    NotFound(String),
}
