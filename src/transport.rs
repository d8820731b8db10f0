//! HTTP transport for ranged requests.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{Error, ReaderConfig, Result, RetryConfig};

/// An inclusive byte range, as written on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Start byte.
    pub start: u64,
    /// End byte (inclusive).
    pub end: u64,
}

impl ByteRange {
    /// Create a new byte range.
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Get the `Range` header value.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }

    /// Get the expected content length.
    pub fn content_length(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// What a single GET or HEAD yields: the status line plus the headers the
/// reader cares about.
///
/// Implementations pass HTTP statuses through unmapped; interpreting `206`
/// versus `200` versus `416` belongs to the chunk cache.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body. Empty for HEAD.
    pub body: Bytes,
    /// `ETag` header, if present.
    pub etag: Option<String>,
    /// `Last-Modified` header, if present.
    pub last_modified: Option<String>,
    /// Raw `Content-Range` header, if present.
    pub content_range: Option<String>,
    /// `Content-Length` header, if present.
    pub content_length: Option<u64>,
    /// Whether the server advertised `Accept-Ranges: bytes`.
    pub accept_ranges: bool,
}

impl FetchResponse {
    /// Map a non-success status to the matching error.
    pub fn error_for_status(&self, url: &str) -> Result<()> {
        match self.status {
            200..=299 => Ok(()),
            404 => Err(Error::NotFound(url.to_string())),
            status => Err(Error::Http {
                status,
                message: format!("unexpected status for {url}"),
            }),
        }
    }
}

/// Issues the actual HTTP requests.
///
/// Implementations fail only on network-level problems (connect, timeout);
/// timeouts, retries, and backoff are their concern, not the reader's.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a GET, optionally ranged, with extra conditional headers.
    async fn fetch(
        &self,
        url: &str,
        range: Option<ByteRange>,
        conditional: &[(String, String)],
    ) -> Result<FetchResponse>;

    /// Issue a HEAD request.
    async fn head(&self, url: &str) -> Result<FetchResponse>;
}

/// Default transport: a `reqwest` HTTP/1.1 client with bounded
/// exponential-backoff retry for transient failures and 5xx responses.
pub struct HttpTransport {
    client: Client,
    headers: Vec<(String, String)>,
    retry: RetryConfig,
}

impl HttpTransport {
    /// Create a transport from reader configuration.
    pub fn new(config: &ReaderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| Error::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            headers: config.headers.clone(),
            retry: config.retry.clone(),
        })
    }

    /// Single request attempt.
    async fn request(
        &self,
        url: &str,
        range: Option<ByteRange>,
        conditional: &[(String, String)],
    ) -> Result<FetchResponse> {
        let mut request = self.client.get(url);

        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if let Some(ref range) = range {
            request = request.header(header::RANGE, range.header_value());
        }
        for (key, value) in conditional {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await?;
        convert(response).await
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(
        &self,
        url: &str,
        range: Option<ByteRange>,
        conditional: &[(String, String)],
    ) -> Result<FetchResponse> {
        let mut last_error = Error::Connection("no attempts made".into());
        let mut backoff = self.retry.initial_backoff;

        for attempt in 0..=self.retry.max_retries {
            if attempt > 0 {
                debug!("Retry attempt {} after {:?}", attempt, backoff);
                tokio::time::sleep(backoff).await;
                backoff = Duration::from_secs_f64(
                    (backoff.as_secs_f64() * self.retry.multiplier)
                        .min(self.retry.max_backoff.as_secs_f64()),
                );
            }

            match self.request(url, range, conditional).await {
                Ok(response) if response.status >= 500 => {
                    warn!("Server error {} (attempt {})", response.status, attempt + 1);
                    last_error = Error::Http {
                        status: response.status,
                        message: format!("server error for {url}"),
                    };
                }
                Ok(response) => return Ok(response),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    warn!("Request failed (attempt {}): {}", attempt + 1, e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn head(&self, url: &str) -> Result<FetchResponse> {
        let mut request = self.client.head(url);
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await?;
        convert(response).await
    }
}

async fn convert(response: reqwest::Response) -> Result<FetchResponse> {
    let status = response.status().as_u16();
    let headers = response.headers();

    let text_header = |name: header::HeaderName| {
        headers
            .get(&name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    };

    let etag = text_header(header::ETAG);
    let last_modified = text_header(header::LAST_MODIFIED);
    let content_range = text_header(header::CONTENT_RANGE);
    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());
    let accept_ranges = headers
        .get(header::ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("bytes"));

    let body = response.bytes().await?;

    Ok(FetchResponse {
        status,
        body,
        etag,
        last_modified,
        content_range,
        content_length,
        accept_ranges,
    })
}
