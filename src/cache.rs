//! Two-slot chunk cache: the core read path.
//!
//! The cache owns exactly two named slots, `current` and `previous`. A chunk
//! install promotes `current` into `previous` and drops whatever occupied
//! `previous`, which makes the eviction order a strict 2-entry LRU with no
//! general cache structure behind it. Back-seeks landing in the previous
//! chunk swap the slots and never touch the network, which is the reason
//! for keeping two chunks instead of one.

use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::ReaderConfig;
use crate::object::RemoteObject;
use crate::prefetch::Prefetcher;
use crate::transport::{ByteRange, FetchResponse, Transport};
use crate::validator::{self, ValidatorToken};
use crate::{Error, Result};

/// A fetched span of the remote object.
#[derive(Debug, Clone)]
pub(crate) struct Chunk {
    start: u64,
    data: Bytes,
    /// Fetch sequence number, assigned at install.
    epoch: u64,
    /// Validator observed when this chunk was fetched.
    token: Option<ValidatorToken>,
}

impl Chunk {
    fn end(&self) -> u64 {
        self.start + self.data.len() as u64
    }

    fn contains(&self, pos: u64) -> bool {
        pos >= self.start && pos < self.end()
    }
}

/// Counters describing cache behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReaderStats {
    /// Reads served from a resident chunk.
    pub hits: u64,
    /// Reads that needed a chunk not resident in either slot.
    pub misses: u64,
    /// Synchronous fetches issued by the read path.
    pub fetches: u64,
    /// Chunks adopted from the background prefetch.
    pub prefetch_adoptions: u64,
}

impl ReaderStats {
    /// Fraction of chunk lookups served without a synchronous fetch.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

enum Outcome {
    Chunk(Chunk),
    Mismatch { actual: Option<String> },
}

/// Chunk cache and fetch coordinator for one open stream.
pub(crate) struct ChunkCache {
    transport: Arc<dyn Transport>,
    object: RemoteObject,
    chunk_size: u64,
    current: Option<Chunk>,
    previous: Option<Chunk>,
    epoch: u64,
    prefetcher: Prefetcher,
    stats: ReaderStats,
}

impl ChunkCache {
    /// Create a cache for a discovered object.
    ///
    /// `seed` is the whole-object body from the fallback path; when present
    /// it becomes the single resident chunk and no further fetches happen.
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        object: RemoteObject,
        config: &ReaderConfig,
        seed: Option<Bytes>,
    ) -> Self {
        let prefetch = config.prefetch && object.supports_ranges();
        let mut cache = Self {
            transport,
            object,
            chunk_size: config.chunk_size as u64,
            current: None,
            previous: None,
            epoch: 0,
            prefetcher: Prefetcher::new(prefetch),
            stats: ReaderStats::default(),
        };
        if let Some(body) = seed {
            let token = cache.object.token().cloned();
            cache.install(Chunk {
                start: 0,
                data: body,
                epoch: 0,
                token,
            });
        }
        cache
    }

    pub(crate) fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// Read `[offset, offset + len)`, clamped to the object length.
    ///
    /// Assembles across chunk boundaries; a request inside a single resident
    /// chunk is returned as a zero-copy slice.
    pub(crate) async fn get(&mut self, offset: u64, len: usize) -> Result<Bytes> {
        let end = offset.saturating_add(len as u64).min(self.object.len());
        if len == 0 || offset >= end {
            return Ok(Bytes::new());
        }

        let mut out = BytesMut::new();
        let mut pos = offset;
        while pos < end {
            if !self.ensure_current(pos).await? {
                break;
            }
            let Some(chunk) = &self.current else { break };
            if pos == offset && end <= chunk.end() {
                let lo = (offset - chunk.start) as usize;
                return Ok(chunk.data.slice(lo..lo + (end - offset) as usize));
            }
            let lo = (pos - chunk.start) as usize;
            let hi = (end.min(chunk.end()) - chunk.start) as usize;
            out.extend_from_slice(&chunk.data[lo..hi]);
            pos = chunk.start + hi as u64;
        }
        Ok(out.freeze())
    }

    /// Make `current` cover `pos`. Returns false at (server-side) EOF.
    async fn ensure_current(&mut self, pos: u64) -> Result<bool> {
        if pos >= self.object.len() {
            return Ok(false);
        }

        if self.current.as_ref().is_some_and(|c| c.contains(pos)) {
            self.stats.hits += 1;
            return Ok(true);
        }

        if self.previous.as_ref().is_some_and(|c| c.contains(pos)) {
            // back-seek into the previous chunk: swap slots, no network
            std::mem::swap(&mut self.current, &mut self.previous);
            self.stats.hits += 1;
            self.schedule_next();
            return Ok(true);
        }

        self.stats.misses += 1;
        let span = self.object.chunk_span(pos, self.chunk_size);
        let index = pos / self.chunk_size;

        let mut adopted = None;
        if let Some(result) = self.prefetcher.take(index, self.epoch).await {
            match result {
                Ok(response) => match self.interpret(span, response) {
                    Ok(Outcome::Chunk(chunk)) => {
                        self.stats.prefetch_adoptions += 1;
                        adopted = Some(chunk);
                    }
                    Ok(Outcome::Mismatch { actual }) => {
                        // prefetched bytes came from another object version
                        adopted = Some(self.retry_after_mismatch(span, actual).await?);
                    }
                    Err(e) => {
                        debug!("Prefetched response unusable, refetching: {}", e);
                    }
                },
                Err(e) => {
                    debug!("Prefetch for chunk {} failed, refetching: {}", index, e);
                }
            }
        }

        let chunk = match adopted {
            Some(chunk) => chunk,
            None => self.fetch_chunk(span).await?,
        };

        if chunk.data.is_empty() {
            // 416: the server's object ends before the discovered length
            return Ok(false);
        }
        let covers = chunk.contains(pos);
        self.install(chunk);
        if covers {
            self.schedule_next();
        }
        Ok(covers)
    }

    /// Synchronous fetch with conditional headers, with a single retry after
    /// a validator mismatch.
    async fn fetch_chunk(&mut self, span: ByteRange) -> Result<Chunk> {
        let conditional = validator::conditional_headers(self.object.token());
        let response = self
            .transport
            .fetch(self.object.url(), Some(span), &conditional)
            .await?;
        self.stats.fetches += 1;
        match self.interpret(span, response)? {
            Outcome::Chunk(chunk) => Ok(chunk),
            Outcome::Mismatch { actual } => self.retry_after_mismatch(span, actual).await,
        }
    }

    /// A mismatch invalidates both slots and is verified with one more
    /// conditional fetch against the token accepted at open. A recurring
    /// mismatch means the remote object mutated mid-session; the read fails
    /// rather than splicing bytes from two object versions.
    async fn retry_after_mismatch(
        &mut self,
        span: ByteRange,
        first_actual: Option<String>,
    ) -> Result<Chunk> {
        warn!(
            "Validator mismatch for {}; invalidating cached chunks and retrying once",
            self.object.url()
        );
        self.invalidate();
        let conditional = validator::conditional_headers(self.object.token());
        let response = self
            .transport
            .fetch(self.object.url(), Some(span), &conditional)
            .await?;
        self.stats.fetches += 1;
        match self.interpret(span, response)? {
            Outcome::Chunk(chunk) => Ok(chunk),
            Outcome::Mismatch { actual } => Err(Error::StaleObject {
                expected: self.object.token().map(|t| t.value().to_string()),
                actual: actual.or(first_actual),
            }),
        }
    }

    /// Turn a transport response for `span` into a chunk or a mismatch.
    fn interpret(&self, span: ByteRange, response: FetchResponse) -> Result<Outcome> {
        let url = self.object.url();
        let observed = ValidatorToken::from_headers(
            response.etag.as_deref(),
            response.last_modified.as_deref(),
        );

        match response.status {
            206 => {
                if !validator::matches(self.object.token(), observed.as_ref()) {
                    return Ok(Outcome::Mismatch {
                        actual: observed.map(|t| t.value().to_string()),
                    });
                }
                if response.body.len() as u64 != span.content_length()
                    && !response.body.is_empty()
                {
                    warn!(
                        "Short range body from {}: expected {} bytes, got {}",
                        url,
                        span.content_length(),
                        response.body.len()
                    );
                }
                let token = observed.or_else(|| self.object.token().cloned());
                Ok(Outcome::Chunk(Chunk {
                    start: span.start,
                    data: response.body,
                    epoch: 0,
                    token,
                }))
            }
            200 => {
                if self.object.token().is_some() {
                    // If-Range went out with the request; a full body means
                    // the server no longer recognizes the token
                    Ok(Outcome::Mismatch {
                        actual: observed.map(|t| t.value().to_string()),
                    })
                } else if response.body.len() as u64 == self.object.len() {
                    warn!("Server ignored Range for {}; caching the whole object", url);
                    Ok(Outcome::Chunk(Chunk {
                        start: 0,
                        data: response.body,
                        epoch: 0,
                        token: observed,
                    }))
                } else {
                    Err(Error::UnsupportedRange(format!(
                        "server ignored Range and returned {} bytes for {}",
                        response.body.len(),
                        url
                    )))
                }
            }
            416 => Ok(Outcome::Chunk(Chunk {
                start: self.object.len(),
                data: Bytes::new(),
                epoch: 0,
                token: self.object.token().cloned(),
            })),
            _ => {
                response.error_for_status(url)?;
                Err(Error::InvalidResponse(format!(
                    "unexpected status {} for ranged request to {}",
                    response.status, url
                )))
            }
        }
    }

    /// Promote `current` to `previous` (evicting the old `previous`) and
    /// make `chunk` the new `current`.
    fn install(&mut self, mut chunk: Chunk) {
        debug_assert!(validator::matches(self.object.token(), chunk.token.as_ref()));
        self.epoch += 1;
        chunk.epoch = self.epoch;
        debug!(
            "Installed chunk {}..{} (epoch {})",
            chunk.start,
            chunk.end(),
            chunk.epoch
        );
        self.previous = self.current.take();
        self.current = Some(chunk);
    }

    /// Drop both slots. The epoch bump orphans any in-flight prefetch issued
    /// before the invalidation.
    fn invalidate(&mut self) {
        self.current = None;
        self.previous = None;
        self.epoch += 1;
        self.prefetcher.discard();
    }

    /// Start prefetching the chunk after `current` if the reader is moving
    /// sequentially and the next chunk is not already resident.
    fn schedule_next(&mut self) {
        if !self.object.supports_ranges() {
            return;
        }
        let Some(current) = &self.current else { return };
        let next_start = current.end();
        if next_start >= self.object.len() {
            return;
        }
        if self.previous.as_ref().is_some_and(|c| c.contains(next_start)) {
            return;
        }
        let span = self.object.chunk_span(next_start, self.chunk_size);
        let index = next_start / self.chunk_size;
        let conditional = validator::conditional_headers(self.object.token());
        self.prefetcher.trigger(
            &self.transport,
            self.object.url(),
            span,
            conditional,
            index,
            self.epoch,
        );
    }

    /// Release the prefetch task and both buffers.
    pub(crate) fn close(&mut self) {
        self.prefetcher.discard();
        self.current = None;
        self.previous = None;
    }

    #[cfg(test)]
    pub(crate) fn resident_chunks(&self) -> usize {
        usize::from(self.current.is_some()) + usize::from(self.previous.is_some())
    }
}
