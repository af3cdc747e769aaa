use crate::{config::Config, error::RelayError};
use axum::http::HeaderValue;
use metrics_exporter_prometheus::PrometheusHandle;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Application state shared across all handlers
///
/// Everything in here is read-only after startup; requests share nothing
/// mutable.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Shared HTTP client for connection pooling
    pub http_client: Client,
    /// Pre-validated User-Agent presented to origins
    pub user_agent: HeaderValue,
    /// Prometheus render handle, when the recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create a new AppState with the given configuration
    pub fn new(config: Config) -> Result<Self, RelayError> {
        // No request timeout: a segment stream lasts as long as the player
        // keeps reading it.
        let http_client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| RelayError::Internal(format!("Failed to create HTTP client: {e}")))?;

        let user_agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|e| RelayError::Internal(format!("Invalid User-Agent: {e}")))?;

        Ok(Self {
            config: Arc::new(config),
            http_client,
            user_agent,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
