//! In-memory transport for exercising the reader without a network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::transport::{ByteRange, FetchResponse, Transport};
use crate::Result;

/// Fake `Transport` backed by a byte vector, emulating 206/200/404/416 and
/// `If-Range` semantics. Counts invocations so tests can assert exactly how
/// often the network was touched.
pub(crate) struct FakeTransport {
    data: Vec<u8>,
    etag: Mutex<Option<String>>,
    last_modified: Option<String>,
    supports_ranges: bool,
    honors_if_range: bool,
    head_has_length: bool,
    missing: bool,
    fail_fetches: AtomicUsize,
    fetches: AtomicUsize,
    heads: AtomicUsize,
}

impl FakeTransport {
    pub(crate) fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            etag: Mutex::new(Some("\"v1\"".to_string())),
            last_modified: None,
            supports_ranges: true,
            honors_if_range: true,
            head_has_length: true,
            missing: false,
            fail_fetches: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            heads: AtomicUsize::new(0),
        }
    }

    /// Emulate a server that ignores `Range` and always sends the full body.
    pub(crate) fn without_ranges(mut self) -> Self {
        self.supports_ranges = false;
        self
    }

    /// Emulate a server that honors `Range` but ignores `If-Range`.
    pub(crate) fn ignoring_if_range(mut self) -> Self {
        self.honors_if_range = false;
        self
    }

    /// Emulate a HEAD response without `Content-Length`, forcing the probe.
    pub(crate) fn without_head_length(mut self) -> Self {
        self.head_has_length = false;
        self
    }

    /// Serve no validators at all.
    pub(crate) fn without_validators(mut self) -> Self {
        self.etag = Mutex::new(None);
        self.last_modified = None;
        self
    }

    /// Answer 404 to everything.
    pub(crate) fn missing(mut self) -> Self {
        self.missing = true;
        self
    }

    /// Fail the next `n` GETs with a connection error.
    pub(crate) fn fail_next_fetches(&self, n: usize) {
        self.fail_fetches.store(n, Ordering::SeqCst);
    }

    /// Change the served ETag, simulating remote mutation.
    pub(crate) fn set_etag(&self, etag: Option<&str>) {
        *self.etag.lock().unwrap() = etag.map(String::from);
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn head_count(&self) -> usize {
        self.heads.load(Ordering::SeqCst)
    }

    fn current_etag(&self) -> Option<String> {
        self.etag.lock().unwrap().clone()
    }

    fn validator_value(&self) -> Option<String> {
        self.current_etag().or_else(|| self.last_modified.clone())
    }

    fn full_body(&self) -> FetchResponse {
        FetchResponse {
            status: 200,
            body: Bytes::from(self.data.clone()),
            etag: self.current_etag(),
            last_modified: self.last_modified.clone(),
            content_range: None,
            content_length: Some(self.data.len() as u64),
            accept_ranges: self.supports_ranges,
        }
    }

    fn not_found(&self) -> FetchResponse {
        FetchResponse {
            status: 404,
            body: Bytes::new(),
            etag: None,
            last_modified: None,
            content_range: None,
            content_length: None,
            accept_ranges: false,
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch(
        &self,
        _url: &str,
        range: Option<ByteRange>,
        conditional: &[(String, String)],
    ) -> Result<FetchResponse> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self
            .fail_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(crate::Error::Connection("injected failure".into()));
        }
        if self.missing {
            return Ok(self.not_found());
        }

        let len = self.data.len() as u64;
        let range = match range {
            Some(range) if self.supports_ranges => range,
            _ => return Ok(self.full_body()),
        };

        if self.honors_if_range {
            let if_range = conditional
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("if-range"))
                .map(|(_, v)| v.as_str());
            if let Some(token) = if_range {
                if self.validator_value().as_deref() != Some(token) {
                    // changed resource: full body instead of a stale range
                    return Ok(self.full_body());
                }
            }
        }

        if range.start >= len {
            return Ok(FetchResponse {
                status: 416,
                body: Bytes::new(),
                etag: self.current_etag(),
                last_modified: self.last_modified.clone(),
                content_range: Some(format!("bytes */{len}")),
                content_length: None,
                accept_ranges: true,
            });
        }

        let end = range.end.min(len - 1);
        let body = Bytes::from(self.data[range.start as usize..=end as usize].to_vec());
        Ok(FetchResponse {
            status: 206,
            body: body.clone(),
            etag: self.current_etag(),
            last_modified: self.last_modified.clone(),
            content_range: Some(format!("bytes {}-{}/{}", range.start, end, len)),
            content_length: Some(body.len() as u64),
            accept_ranges: true,
        })
    }

    async fn head(&self, _url: &str) -> Result<FetchResponse> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        if self.missing {
            return Ok(self.not_found());
        }
        Ok(FetchResponse {
            status: 200,
            body: Bytes::new(),
            etag: self.current_etag(),
            last_modified: self.last_modified.clone(),
            content_range: None,
            content_length: self.head_has_length.then_some(self.data.len() as u64),
            accept_ranges: self.supports_ranges,
        })
    }
}
