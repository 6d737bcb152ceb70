use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::feed::parser::{parse_rss, FetchedFeedDocument, ParseError};

/// Errors that can occur while fetching a feed.
///
/// Everything except [`FetchError::Parse`] is a network-class failure.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request and body read did not finish within the fetch timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Response body exceeded the configured size limit
    #[error("Response too large (limit {0} bytes)")]
    ResponseTooLarge(usize),
    /// Body was not an RSS document
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

impl FetchError {
    /// True for failures of the transport rather than the document.
    pub fn is_network(&self) -> bool {
        !matches!(self, FetchError::Parse(_))
    }
}

/// HTTP fetcher for RSS feeds.
///
/// Holds one `reqwest::Client` so connections are pooled across polling
/// cycles. Each request is bounded by a single timeout covering connect,
/// headers and the full body.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
}

impl Fetcher {
    pub const DEFAULT_USER_AGENT: &'static str = "gator";
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;

    /// Builds a fetcher with its own client.
    ///
    /// # Errors
    ///
    /// Fails if the TLS backend cannot be initialised.
    pub fn new(user_agent: &str, timeout: Duration, max_bytes: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self::with_client(client, timeout, max_bytes))
    }

    /// Builds a fetcher from configuration.
    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        Self::new(
            &config.user_agent,
            Duration::from_secs(config.fetch_timeout_secs),
            config.max_feed_bytes,
        )
    }

    /// Wraps an existing client; the caller is responsible for the user agent.
    pub fn with_client(client: reqwest::Client, timeout: Duration, max_bytes: usize) -> Self {
        Self {
            client,
            timeout,
            max_bytes,
        }
    }

    /// Fetches `url` and parses it as RSS.
    ///
    /// No retries: a failed fetch is simply picked up again once the feed
    /// becomes least recently fetched.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Network`] - connection, TLS or body stream errors
    /// - [`FetchError::Timeout`] - the configured timeout elapsed
    /// - [`FetchError::HttpStatus`] - non-2xx response
    /// - [`FetchError::ResponseTooLarge`] - body over the size limit
    /// - [`FetchError::Parse`] - malformed XML or no `<channel>`
    pub async fn fetch(&self, url: &str) -> Result<FetchedFeedDocument, FetchError> {
        let bytes = tokio::time::timeout(self.timeout, self.fetch_bytes(url))
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))??;

        let document = parse_rss(&bytes)?;
        tracing::debug!(
            feed = %url,
            bytes = bytes.len(),
            items = document.items.len(),
            "Fetched feed"
        );
        Ok(document)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        read_limited_bytes(response, self.max_bytes).await
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: reject on Content-Length before reading anything
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
