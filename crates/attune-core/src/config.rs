use std::time::Duration;

/// Connection settings for the plan service backend.
///
/// Built by the binary from flags, environment and config file; the
/// defaults point at a local backend with a 30 second timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Root URL the `/api/adaptive-therapy/...` routes hang off.
    pub base_url: String,
    /// Per-request timeout applied by the HTTP binding.
    pub timeout: Duration,
}

impl ServiceConfig {
    /// The default base URL used when nothing else is configured.
    pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";

    /// The default per-request timeout, in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Build a config from an explicit URL with the default timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Replace the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
