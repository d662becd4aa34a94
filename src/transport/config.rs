//! Transport configuration

use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Configuration for the HTTP transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Base URL of the thread API, e.g. `https://api.example.com/v1`
    pub base_url: String,
    pub api_token: Option<String>,
    pub timeout: Duration,
}

impl TransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Read `CHAT_SYNC_API_URL`, `CHAT_SYNC_API_TOKEN` and
    /// `CHAT_SYNC_TIMEOUT_SECS`. Returns `None` without a base URL.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("CHAT_SYNC_API_URL").ok()?;
        let timeout = std::env::var("CHAT_SYNC_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS), Duration::from_secs);

        Some(Self {
            base_url,
            api_token: std::env::var("CHAT_SYNC_API_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
            timeout,
        })
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
