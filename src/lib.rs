//! Seekable Read-Only Streams over HTTP Byte Ranges
//!
//! This crate presents a large remote object as a seekable byte stream
//! without downloading the whole object, using standard HTTP `Range` and
//! conditional-request semantics:
//!
//! - **Chunked Reads**: fixed-size ranged GETs, 1 MiB by default
//! - **Two-Slot Cache**: current + previous chunk, strict LRU
//! - **Background Prefetch**: the next sequential chunk loads while the
//!   reader consumes the current one
//! - **Validator Checks**: `ETag`/`Last-Modified` via `If-Range`, so remote
//!   mutation is detected instead of silently splicing object versions
//! - **Graceful Fallback**: servers that ignore `Range` are served from one
//!   whole-object download
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        RangeStream                          │
//! │                 seek / read / position / close              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │   ┌──────────────┐    ┌──────────────┐    ┌─────────────┐   │
//! │   │  ChunkCache  │ -> │  Prefetcher  │ -> │  Transport  │   │
//! │   │ (two slots)  │    │ (one task)   │    │  (reqwest)  │   │
//! │   └──────────────┘    └──────────────┘    └─────────────┘   │
//! │          ↑                                       ↑          │
//! │   ValidatorToken                           RemoteObject     │
//! │   (If-Range)                               (discovery)      │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use httpseek::{RangeStream, ReaderConfig};
//! use std::io::SeekFrom;
//!
//! let mut stream = RangeStream::open("https://example.com/archive.zip").await?;
//! stream.seek(SeekFrom::End(-22))?; // zip end-of-central-directory
//! let tail = stream.read(22).await?;
//! ```
//!
//! The stream is single-reader. Only the internal prefetch task overlaps
//! with foreground reads; dropping the stream detaches it.

mod cache;
mod config;
mod error;
mod object;
mod prefetch;
mod stream;
mod transport;
mod validator;

#[cfg(test)]
mod testutil;

pub use cache::ReaderStats;
pub use config::{ReaderConfig, RetryConfig, DEFAULT_CHUNK_SIZE};
pub use error::{Error, Result};
pub use stream::RangeStream;
pub use transport::{ByteRange, FetchResponse, HttpTransport, Transport};
pub use validator::ValidatorToken;

/// Prelude for common imports.
pub mod prelude {
    pub use super::{RangeStream, ReaderConfig, Result, Transport};
}
