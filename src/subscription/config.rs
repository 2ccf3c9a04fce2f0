use reqwest::Url;
use std::time::Duration;

use super::error::{Error, Result};

/// Environment variable holding the backend base address
pub const BASE_URL_ENV: &str = "EVENTSTORE_URL";

/// Environment variables holding basic-auth credentials
pub const USERNAME_ENV: &str = "EVENTSTORE_USERNAME";
pub const PASSWORD_ENV: &str = "EVENTSTORE_PASSWORD";

/// Basic authentication for the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Configuration for a competing consumer
///
/// All settings are fixed once a [`Consumer`](super::consumer::Consumer) has
/// been built from them.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Stream the subscription group reads from
    pub stream: String,

    /// Subscription group name
    pub group: String,

    /// Explicit backend address; takes precedence over `EVENTSTORE_URL`
    pub base_url: Option<String>,

    /// Explicit credentials; take precedence over the environment
    pub credentials: Option<Credentials>,

    /// Maximum concurrent handler invocations
    pub concurrency: usize,

    /// Wait before re-polling an idle or failing subscription
    pub poll_delay: Duration,

    /// Maximum ack/nack attempts before giving up on an event
    pub ack_retry_attempts: u32,

    /// Fixed wait between ack/nack attempts
    pub ack_retry_delay: Duration,

    /// Per-request timeout for the HTTP binding
    pub request_timeout: Duration,
}

impl ConsumerConfig {
    /// Create a new consumer configuration
    ///
    /// # Example
    ///
    /// ```
    /// use competing_consumer::subscription::ConsumerConfig;
    /// use std::time::Duration;
    ///
    /// let config = ConsumerConfig::new("orders", "billing")
    ///     .with_base_url("http://localhost:2113")
    ///     .with_concurrency(8)
    ///     .with_poll_delay(Duration::from_millis(250));
    /// ```
    pub fn new(stream: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            group: group.into(),
            base_url: None,
            credentials: None,
            concurrency: 1,
            poll_delay: Duration::from_millis(500),
            ack_retry_attempts: 3,
            ack_retry_delay: Duration::from_millis(500),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Set the backend address (builder pattern)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set basic-auth credentials (builder pattern)
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the concurrency ceiling (builder pattern)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the idle re-poll interval (builder pattern)
    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    /// Set the maximum ack/nack attempts (builder pattern)
    pub fn with_ack_retry_attempts(mut self, attempts: u32) -> Self {
        self.ack_retry_attempts = attempts;
        self
    }

    /// Set the delay between ack/nack attempts (builder pattern)
    pub fn with_ack_retry_delay(mut self, delay: Duration) -> Self {
        self.ack_retry_delay = delay;
        self
    }

    /// Set the HTTP request timeout (builder pattern)
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Check the settings a consumer cannot run without
    pub fn validate(&self) -> Result<()> {
        if self.stream.trim().is_empty() {
            return Err(Error::Configuration("stream name is required".to_string()));
        }
        if self.group.trim().is_empty() {
            return Err(Error::Configuration("group name is required".to_string()));
        }
        if self.concurrency == 0 {
            return Err(Error::Configuration(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.ack_retry_attempts == 0 {
            return Err(Error::Configuration(
                "ack retry attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the backend address from this config or the process environment
    pub fn resolve_base_url(&self) -> Result<Url> {
        self.resolve_base_url_with(|key| std::env::var(key).ok())
    }

    /// Resolve the backend address using `lookup` for environment variables
    ///
    /// An explicit `base_url` always wins over `EVENTSTORE_URL`.
    pub fn resolve_base_url_with<F>(&self, lookup: F) -> Result<Url>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = self
            .base_url
            .clone()
            .or_else(|| lookup(BASE_URL_ENV))
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "base URL is required (set it explicitly or via {})",
                    BASE_URL_ENV
                ))
            })?;

        let url = Url::parse(raw.trim())
            .map_err(|e| Error::Configuration(format!("invalid base URL '{}': {}", raw, e)))?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(Error::Configuration(format!(
                "unsupported base URL scheme '{}'",
                other
            ))),
        }
    }

    /// Resolve credentials from this config or the process environment
    pub fn resolve_credentials(&self) -> Option<Credentials> {
        self.resolve_credentials_with(|key| std::env::var(key).ok())
    }

    /// Resolve credentials using `lookup` for environment variables
    pub fn resolve_credentials_with<F>(&self, lookup: F) -> Option<Credentials>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ref credentials) = self.credentials {
            return Some(credentials.clone());
        }
        match (lookup(USERNAME_ENV), lookup(PASSWORD_ENV)) {
            (Some(username), Some(password)) => Some(Credentials { username, password }),
            _ => None,
        }
    }
}
