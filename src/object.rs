//! Remote object discovery and range resolution.

use bytes::Bytes;
use tracing::debug;

use crate::transport::{ByteRange, Transport};
use crate::validator::ValidatorToken;
use crate::{Error, Result};

/// Identity and discovered shape of the remote resource.
///
/// Length, range support, and the validator token are discovered once at
/// open time and are immutable for the life of the stream.
#[derive(Debug, Clone)]
pub(crate) struct RemoteObject {
    url: String,
    length: u64,
    supports_ranges: bool,
    token: Option<ValidatorToken>,
}

impl RemoteObject {
    /// Discover total length, range support, and validator identity.
    ///
    /// Tries a HEAD first; if that leaves the length unknown or range
    /// support unconfirmed, issues a probing GET for `bytes=0-0`. A server
    /// that answers the probe with `200` and the full body does not honor
    /// `Range`; the body is handed back so the cache can keep the whole
    /// object resident instead (memory traded for correctness).
    pub(crate) async fn discover(
        transport: &dyn Transport,
        url: &str,
    ) -> Result<(Self, Option<Bytes>)> {
        let head = transport.head(url).await?;
        head.error_for_status(url)?;

        let mut length = head.content_length.filter(|len| *len > 0);
        let mut supports_ranges = head.accept_ranges;
        let mut token =
            ValidatorToken::from_headers(head.etag.as_deref(), head.last_modified.as_deref());
        let mut fallback_body = None;

        if length.is_none() || !supports_ranges {
            let probe = transport.fetch(url, Some(ByteRange::new(0, 0)), &[]).await?;
            match probe.status {
                206 => {
                    supports_ranges = true;
                    if let Some((_, _, total)) = probe
                        .content_range
                        .as_deref()
                        .and_then(parse_content_range)
                    {
                        length = Some(total);
                    }
                    if token.is_none() {
                        token = ValidatorToken::from_headers(
                            probe.etag.as_deref(),
                            probe.last_modified.as_deref(),
                        );
                    }
                }
                200 => {
                    supports_ranges = false;
                    length = Some(probe.body.len() as u64);
                    debug!(
                        "Server ignored Range for {}; caching the whole object ({} bytes)",
                        url,
                        probe.body.len()
                    );
                    if token.is_none() {
                        token = ValidatorToken::from_headers(
                            probe.etag.as_deref(),
                            probe.last_modified.as_deref(),
                        );
                    }
                    fallback_body = Some(probe.body);
                }
                _ => probe.error_for_status(url)?,
            }
        }

        let length = length.ok_or_else(|| {
            Error::InvalidResponse(format!("unable to determine remote size for {url}"))
        })?;

        Ok((
            Self {
                url: url.to_string(),
                length,
                supports_ranges,
                token,
            },
            fallback_body,
        ))
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    /// Total object length in bytes.
    pub(crate) fn len(&self) -> u64 {
        self.length
    }

    pub(crate) fn supports_ranges(&self) -> bool {
        self.supports_ranges
    }

    /// The validator token accepted at open time.
    pub(crate) fn token(&self) -> Option<&ValidatorToken> {
        self.token.as_ref()
    }

    /// The span of the chunk containing `offset`, clamped to object length.
    pub(crate) fn chunk_span(&self, offset: u64, chunk_size: u64) -> ByteRange {
        let start = (offset / chunk_size) * chunk_size;
        let end = (start + chunk_size - 1).min(self.length.saturating_sub(1));
        ByteRange::new(start, end)
    }
}

/// Parse `Content-Range: bytes <start>-<end>/<total>`.
pub(crate) fn parse_content_range(value: &str) -> Option<(u64, u64, u64)> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (range_part, total_part) = rest.split_once('/')?;
    let (start_part, end_part) = range_part.split_once('-')?;
    let start = start_part.trim().parse().ok()?;
    let end = end_part.trim().parse().ok()?;
    let total = total_part.trim().parse().ok()?;
    Some((start, end, total))
}
