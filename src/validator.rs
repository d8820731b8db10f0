//! Remote object identity via HTTP validators.

/// Identity token of the remote object, captured at open time and checked on
/// every subsequent fetch.
///
/// A strong `ETag` is preferred; `Last-Modified` is the weak fallback. When
/// the server provides neither, mismatch detection is disabled and the stream
/// trusts the server to serve consistent ranges, a strictly weaker guarantee
/// than validator-checked reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatorToken {
    /// Strong validator from the `ETag` header.
    ETag(String),
    /// Weak validator from the `Last-Modified` header.
    LastModified(String),
}

impl ValidatorToken {
    /// Derive a token from response headers, preferring `ETag`.
    pub fn from_headers(etag: Option<&str>, last_modified: Option<&str>) -> Option<Self> {
        if let Some(etag) = etag {
            return Some(ValidatorToken::ETag(etag.to_string()));
        }
        last_modified.map(|lm| ValidatorToken::LastModified(lm.to_string()))
    }

    /// The raw validator value as the server sent it.
    pub fn value(&self) -> &str {
        match self {
            ValidatorToken::ETag(v) => v,
            ValidatorToken::LastModified(v) => v,
        }
    }

    /// `If-Range` header pairing this token with a `Range` request.
    ///
    /// A server that no longer recognizes the token answers with the full
    /// body and `200` instead of a stale byte range; the chunk cache treats
    /// that response shape as a validator mismatch, not as a chunk.
    pub fn if_range_header(&self) -> (String, String) {
        ("If-Range".to_string(), self.value().to_string())
    }
}

/// Conditional headers for a ranged fetch under the accepted token.
pub(crate) fn conditional_headers(token: Option<&ValidatorToken>) -> Vec<(String, String)> {
    token.map(|t| vec![t.if_range_header()]).unwrap_or_default()
}

/// Whether an observed token is consistent with the accepted one.
///
/// Absent tokens on either side cannot be compared, so they pass; only a
/// definite difference counts as a mismatch.
pub(crate) fn matches(accepted: Option<&ValidatorToken>, observed: Option<&ValidatorToken>) -> bool {
    match (accepted, observed) {
        (Some(a), Some(o)) => a == o,
        _ => true,
    }
}
