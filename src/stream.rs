//! Seekable stream façade over the chunk cache.

use std::io::SeekFrom;
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::cache::{ChunkCache, ReaderStats};
use crate::config::ReaderConfig;
use crate::object::RemoteObject;
use crate::transport::{HttpTransport, Transport};
use crate::{Error, Result};

/// A read-only, seekable byte stream over a remote HTTP object.
///
/// Bytes are fetched in fixed-size chunks through ranged GETs; at most two
/// chunks stay resident and the next sequential chunk is prefetched in the
/// background. The stream is single-reader: `&mut self` on every operation
/// enforces that only the internal prefetch task ever runs concurrently
/// with a read.
///
/// Dropping the stream (on any exit path) releases the cached buffers and
/// detaches the prefetch task, so wrapping `close` in explicit scope
/// management is never required.
pub struct RangeStream {
    cache: Option<ChunkCache>,
    pos: u64,
    length: u64,
}

impl std::fmt::Debug for RangeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeStream")
            .field("open", &self.cache.is_some())
            .field("pos", &self.pos)
            .field("length", &self.length)
            .finish()
    }
}

impl RangeStream {
    /// Open a stream with default configuration.
    pub async fn open(url: &str) -> Result<Self> {
        Self::open_with(url, ReaderConfig::default()).await
    }

    /// Open a stream with the given configuration and the default
    /// `reqwest`-backed transport.
    pub async fn open_with(url: &str, config: ReaderConfig) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config)?);
        Self::open_with_transport(url, config, transport).await
    }

    /// Open a stream over a caller-provided transport.
    pub async fn open_with_transport(
        url: &str,
        config: ReaderConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        url::Url::parse(url)?;

        let (object, fallback) = RemoteObject::discover(transport.as_ref(), url).await?;
        let length = object.len();
        debug!(
            "Opened {} ({} bytes, ranges: {})",
            url,
            length,
            object.supports_ranges()
        );
        let cache = ChunkCache::new(transport, object, &config, fallback);
        Ok(Self {
            cache: Some(cache),
            pos: 0,
            length,
        })
    }

    /// Read up to `n` bytes from the cursor, advancing it by the number of
    /// bytes returned.
    ///
    /// Returns fewer than `n` bytes only at end-of-object and an empty
    /// buffer exactly at end-of-object. `read(0)` is side-effect free.
    pub async fn read(&mut self, n: usize) -> Result<Bytes> {
        let pos = self.pos;
        let cache = self.cache.as_mut().ok_or(Error::Closed)?;
        if n == 0 || pos >= self.length {
            return Ok(Bytes::new());
        }
        let data = cache.get(pos, n).await?;
        self.pos += data.len() as u64;
        Ok(data)
    }

    /// Read into a caller buffer, returning the number of bytes written.
    pub async fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        let data = self.read(buf.len()).await?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    /// Move the cursor without any I/O; the fetch happens on the next read.
    ///
    /// A position past end-of-object clamps to the object length. A negative
    /// resultant position fails with [`Error::InvalidSeek`].
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        if self.cache.is_none() {
            return Err(Error::Closed);
        }
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => offset_by(self.pos, delta),
            SeekFrom::End(delta) => offset_by(self.length, delta),
        };
        let Some(target) = target else {
            let delta = match pos {
                SeekFrom::Current(delta) | SeekFrom::End(delta) => delta,
                SeekFrom::Start(_) => 0,
            };
            return Err(Error::InvalidSeek { position: delta });
        };
        self.pos = target.min(self.length);
        Ok(self.pos)
    }

    /// Current cursor position.
    pub fn position(&self) -> Result<u64> {
        if self.cache.is_none() {
            return Err(Error::Closed);
        }
        Ok(self.pos)
    }

    /// Total object length in bytes.
    pub fn len(&self) -> u64 {
        self.length
    }

    /// Whether the remote object is empty.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Cache behavior counters for this stream.
    pub fn stats(&self) -> Result<ReaderStats> {
        self.cache
            .as_ref()
            .map(|cache| cache.stats())
            .ok_or(Error::Closed)
    }

    /// Release cached buffers and detach any in-flight prefetch.
    ///
    /// Idempotent; every operation after the first `close` fails with
    /// [`Error::Closed`]. Dropping the stream performs the same teardown.
    pub fn close(&mut self) {
        if let Some(mut cache) = self.cache.take() {
            cache.close();
        }
    }
}

impl Drop for RangeStream {
    fn drop(&mut self) {
        self.close();
    }
}

fn offset_by(base: u64, delta: i64) -> Option<u64> {
    if delta >= 0 {
        base.checked_add(delta as u64)
    } else {
        base.checked_sub(delta.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeTransport;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    async fn open_fake(data: Vec<u8>, chunk_size: usize) -> (Arc<FakeTransport>, RangeStream) {
        open_fake_with(Arc::new(FakeTransport::new(data)), chunk_size, false).await
    }

    async fn open_fake_with(
        transport: Arc<FakeTransport>,
        chunk_size: usize,
        prefetch: bool,
    ) -> (Arc<FakeTransport>, RangeStream) {
        let config = ReaderConfig::default()
            .with_chunk_size(chunk_size)
            .with_prefetch(prefetch);
        let stream = RangeStream::open_with_transport(
            "http://fake/object",
            config,
            transport.clone() as Arc<dyn Transport>,
        )
        .await
        .unwrap();
        (transport, stream)
    }

    #[tokio::test]
    async fn test_sequential_then_backseek() {
        let data: Vec<u8> = b"abcdefghijklmnopqrstuvwxyz".repeat(100);
        let (_transport, mut stream) = open_fake(data.clone(), 64).await;

        // read across a chunk boundary, then seek back into the previous chunk
        let a = stream.read(80).await.unwrap();
        assert_eq!(a.len(), 80);
        assert_eq!(&a[..], &data[..80]);

        let mid = stream.position().unwrap() - 10;
        stream.seek(SeekFrom::Start(mid)).unwrap();
        let b = stream.read(20).await.unwrap();
        assert_eq!(&b[..], &data[mid as usize..mid as usize + 20]);
    }

    #[tokio::test]
    async fn test_round_trip_against_reference() {
        let data = pattern(3000);
        let (_transport, mut stream) = open_fake(data.clone(), 256).await;

        let mut state = 0x9e3779b9u64;
        for _ in 0..100 {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let offset = (state >> 17) % 3000;
            let len = 1 + (state % 500) as usize;
            stream.seek(SeekFrom::Start(offset)).unwrap();
            let got = stream.read(len).await.unwrap();
            let want = &data[offset as usize..(offset as usize + len).min(data.len())];
            assert_eq!(&got[..], want, "offset {} len {}", offset, len);
        }
    }

    #[tokio::test]
    async fn test_len_and_seek_clamp() {
        let data = b"0123456789".to_vec();
        let (_transport, mut stream) = open_fake(data, 4).await;

        assert_eq!(stream.len(), 10);
        assert_eq!(stream.seek(SeekFrom::Start(999_999)).unwrap(), 10);
        assert_eq!(stream.position().unwrap(), 10);
        assert_eq!(stream.seek(SeekFrom::End(-3)).unwrap(), 7);
        assert_eq!(stream.seek(SeekFrom::Current(1)).unwrap(), 8);
    }

    #[tokio::test]
    async fn test_negative_seek_fails() {
        let data = pattern(100);
        let (_transport, mut stream) = open_fake(data, 32).await;

        let err = stream.seek(SeekFrom::End(-200)).unwrap_err();
        assert!(matches!(err, Error::InvalidSeek { .. }));
        // the failed seek leaves the cursor where it was
        assert_eq!(stream.position().unwrap(), 0);

        stream.seek(SeekFrom::Start(5)).unwrap();
        let err = stream.seek(SeekFrom::Current(-6)).unwrap_err();
        assert!(matches!(err, Error::InvalidSeek { position: -6 }));
        assert_eq!(stream.position().unwrap(), 5);
    }

    #[tokio::test]
    async fn test_read_zero_and_eof() {
        let data = pattern(100);
        let (transport, mut stream) = open_fake(data.clone(), 64).await;

        assert!(stream.read(0).await.unwrap().is_empty());
        assert_eq!(transport.fetch_count(), 0);

        stream.seek(SeekFrom::End(0)).unwrap();
        assert!(stream.read(10).await.unwrap().is_empty());
        assert_eq!(transport.fetch_count(), 0);

        // a read that runs into EOF comes back short
        stream.seek(SeekFrom::Start(90)).unwrap();
        let got = stream.read(50).await.unwrap();
        assert_eq!(&got[..], &data[90..]);
        assert!(stream.read(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_into() {
        let data = pattern(200);
        let (_transport, mut stream) = open_fake(data.clone(), 64).await;

        let mut buf = [0u8; 50];
        stream.seek(SeekFrom::Start(20)).unwrap();
        let n = stream.read_into(&mut buf).await.unwrap();
        assert_eq!(n, 50);
        assert_eq!(&buf[..], &data[20..70]);

        stream.seek(SeekFrom::Start(190)).unwrap();
        let n = stream.read_into(&mut buf).await.unwrap();
        assert_eq!(n, 10);
        assert_eq!(&buf[..10], &data[190..]);
    }

    #[tokio::test]
    async fn test_closed_stream_fails() {
        let data = pattern(100);
        let (_transport, mut stream) = open_fake(data, 64).await;

        stream.close();
        assert!(matches!(stream.read(1).await, Err(Error::Closed)));
        assert!(matches!(stream.seek(SeekFrom::Start(0)), Err(Error::Closed)));
        assert!(matches!(stream.position(), Err(Error::Closed)));
        assert!(matches!(stream.stats(), Err(Error::Closed)));
        stream.close(); // idempotent
    }

    #[tokio::test]
    async fn test_fallback_stream_matches_reference() {
        let data = pattern(900);
        let transport = Arc::new(FakeTransport::new(data.clone()).without_ranges());
        let (transport, mut stream) = open_fake_with(transport, 128, true).await;

        let mut all = Vec::new();
        loop {
            let piece = stream.read(200).await.unwrap();
            if piece.is_empty() {
                break;
            }
            all.extend_from_slice(&piece);
        }
        assert_eq!(all, data);
        assert_eq!(transport.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_probe_discovers_length_without_head_info() {
        let data = pattern(500);
        let transport = Arc::new(FakeTransport::new(data.clone()).without_head_length());
        let (transport, mut stream) = open_fake_with(transport, 128, false).await;

        assert_eq!(stream.len(), 500);
        assert_eq!(transport.head_count(), 1);
        assert_eq!(transport.fetch_count(), 1); // the bytes=0-0 probe

        stream.seek(SeekFrom::Start(400)).unwrap();
        let got = stream.read(100).await.unwrap();
        assert_eq!(&got[..], &data[400..]);
    }

    #[tokio::test]
    async fn test_missing_object_fails_to_open() {
        let transport = Arc::new(FakeTransport::new(vec![1, 2, 3]).missing());
        let config = ReaderConfig::default();
        let err = RangeStream::open_with_transport(
            "http://fake/object",
            config,
            transport as Arc<dyn Transport>,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_no_validators_still_reads() {
        let data = pattern(300);
        let transport = Arc::new(FakeTransport::new(data.clone()).without_validators());
        let (_transport, mut stream) = open_fake_with(transport, 128, false).await;

        let got = stream.read(300).await.unwrap();
        assert_eq!(&got[..], &data[..]);
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let transport = Arc::new(FakeTransport::new(vec![]));
        let err = RangeStream::open_with_transport(
            "not a url",
            ReaderConfig::default(),
            transport as Arc<dyn Transport>,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_zero_chunk_size_rejected_at_open() {
        let transport = Arc::new(FakeTransport::new(vec![1]));
        let err = RangeStream::open_with_transport(
            "http://fake/object",
            ReaderConfig::default().with_chunk_size(0),
            transport as Arc<dyn Transport>,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
