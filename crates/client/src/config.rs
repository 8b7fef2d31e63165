use std::time::Duration;

use cartoon_core::config::{parse_var_or, require_var};
use cartoon_core::ConfigError;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Connection settings for the job service.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL, without a trailing slash (e.g. `http://localhost:8000`).
    pub base_url: String,
    /// Timeout applied to every request.
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(&base_url.into()),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// | Env Var                        | Default |
    /// |--------------------------------|---------|
    /// | `CARTOON_API_URL`              | required |
    /// | `CARTOON_REQUEST_TIMEOUT_SECS` | `30`    |
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = require_var("CARTOON_API_URL")?;
        let timeout_secs =
            parse_var_or("CARTOON_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;

        Ok(Self::new(base_url).with_request_timeout(Duration::from_secs(timeout_secs)))
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
