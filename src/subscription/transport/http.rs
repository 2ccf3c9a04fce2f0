//! Competing-consumer HTTP binding

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_LENGTH};
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::debug;

use super::Transport;
use crate::subscription::config::{ConsumerConfig, Credentials};
use crate::subscription::error::{Error, Result};
use crate::subscription::types::{AckKind, Event, EventFeed};

/// Media type of a competing-consumer batch response
pub const COMPETING_ATOM_JSON: &str = "application/vnd.eventstore.competingatom+json";

/// HTTP client for a subscription group
pub struct HttpTransport {
    /// HTTP client for making requests
    http_client: Client,
    /// Backend base address
    base_url: Url,
    /// Optional basic authentication
    credentials: Option<Credentials>,
}

impl HttpTransport {
    /// Create a new transport for the given backend address
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: Url, credentials: Option<Credentials>, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
            credentials,
        })
    }

    /// Create a transport from a consumer configuration
    ///
    /// Resolves the base address and credentials, consulting the environment
    /// only for settings the configuration leaves unset.
    pub fn from_config(config: &ConsumerConfig) -> Result<Self> {
        let base_url = config.resolve_base_url()?;
        Self::new(
            base_url,
            config.resolve_credentials(),
            config.request_timeout,
        )
    }

    /// Backend base address
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build the batch endpoint URL
    ///
    /// `{base}/subscriptions/{stream}/{group}/{count}?embed=Body`
    pub fn batch_url(&self, stream: &str, group: &str, max_count: usize) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                Error::Configuration(format!("base URL '{}' cannot be a base", self.base_url))
            })?;
            segments
                .pop_if_empty()
                .push("subscriptions")
                .push(stream)
                .push(group)
                .push(&max_count.to_string());
        }
        url.query_pairs_mut().append_pair("embed", "Body");
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.credentials {
            Some(ref credentials) => {
                request.basic_auth(&credentials.username, Some(&credentials.password))
            }
            None => request,
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::Http {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_batch(&self, stream: &str, group: &str, max_count: usize) -> Result<Vec<Event>> {
        let url = self.batch_url(stream, group, max_count)?;
        debug!(%url, max_count, "Fetching subscription batch");

        let request = self.http_client.get(url).header(ACCEPT, COMPETING_ATOM_JSON);
        let response = self.authorize(request).send().await?;
        let response = Self::check_status(response).await?;

        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        let feed: EventFeed = serde_json::from_slice(&body)?;
        Ok(feed.entries)
    }

    async fn acknowledge(&self, reference: &str, kind: AckKind) -> Result<()> {
        let url = Url::parse(reference)
            .or_else(|_| self.base_url.join(reference))
            .map_err(|e| Error::Transport(format!("invalid {} link '{}': {}", kind, reference, e)))?;
        debug!(%url, %kind, "Sending acknowledgement");

        let request = self.http_client.post(url).header(CONTENT_LENGTH, 0);
        let response = self.authorize(request).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }
}
