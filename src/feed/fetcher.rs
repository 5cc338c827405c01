use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use crate::feed::parser::{parse_feed, ScrapedDocument};

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while retrieving a feed document.
///
/// None of these are retried here; a failed feed is reconsidered on a later
/// cycle.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, client timeout, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Feed XML could not be decoded as RSS
    #[error("Parse error: {0}")]
    Parse(String),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Turns a feed URL into a decoded document.
#[async_trait]
pub trait FeedRetriever: Send + Sync {
    /// Fetch the document at `url` and decode it. Makes exactly one attempt.
    async fn fetch_and_parse(&self, url: &str) -> Result<ScrapedDocument, FetchError>;
}

/// [`FeedRetriever`] over HTTP.
#[derive(Clone)]
pub struct HttpRetriever {
    client: reqwest::Client,
}

impl HttpRetriever {
    /// Build a retriever whose requests carry `user_agent` and give up
    /// after `timeout`.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedRetriever for HttpRetriever {
    async fn fetch_and_parse(&self, url: &str) -> Result<ScrapedDocument, FetchError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;
        let document = parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))?;

        tracing::debug!(
            url = %url,
            bytes = bytes.len(),
            items = document.items.len(),
            "Fetched feed document"
        );
        Ok(document)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Capture Content-Length for completeness check
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
