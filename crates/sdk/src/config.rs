// SDK configuration
//
// SomaConfig holds everything the SDK needs to talk to the Soma server.
// It can be built directly or loaded from the environment (a `.env` file
// is honored through dotenvy).

use std::time::Duration;

use soma_durable::RetryPolicy;

/// Default Soma server base URL
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Configuration for the Soma SDK
#[derive(Debug, Clone, PartialEq)]
pub struct SomaConfig {
    /// Base URL of the Soma server (e.g., "http://localhost:3000")
    pub base_url: String,

    /// Optional API key sent as a bearer token
    pub api_key: Option<String>,

    /// Request timeout for HTTP calls
    pub http_timeout: Duration,

    /// Maximum number of startup resync attempts
    pub resync_max_attempts: u32,

    /// Base delay of the linear resync backoff
    pub resync_base_delay: Duration,
}

impl Default for SomaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            http_timeout: Duration::from_secs(30),
            resync_max_attempts: 10,
            resync_base_delay: Duration::from_millis(500),
        }
    }
}

impl SomaConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `SOMA_SERVER_BASE_URL`: Server base URL (default: "http://localhost:3000")
    /// - `SOMA_API_KEY`: API key
    /// - `SOMA_HTTP_TIMEOUT_SECS`: HTTP timeout in seconds (default: 30)
    /// - `SOMA_RESYNC_MAX_ATTEMPTS`: Resync attempts (default: 10)
    /// - `SOMA_RESYNC_BASE_DELAY_MS`: Resync base delay (default: 500)
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Self {
            base_url: std::env::var("SOMA_SERVER_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            api_key: std::env::var("SOMA_API_KEY").ok().filter(|k| !k.is_empty()),
            http_timeout: std::env::var("SOMA_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
            resync_max_attempts: std::env::var("SOMA_RESYNC_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.resync_max_attempts),
            resync_base_delay: std::env::var("SOMA_RESYNC_BASE_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.resync_base_delay),
        }
    }

    /// Set the base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the HTTP timeout
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Set the resync attempts and base delay
    pub fn with_resync(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.resync_max_attempts = max_attempts;
        self.resync_base_delay = base_delay;
        self
    }

    /// Retry policy used for the startup resync
    pub fn resync_policy(&self) -> RetryPolicy {
        RetryPolicy::linear(self.resync_base_delay, self.resync_max_attempts)
    }

    /// Base URL without a trailing slash
    pub fn normalized_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}
