//! Centralized error handling for parblock.
//!
//! Every failure path of the writer surfaces as a [`BlockError`]. The library
//! never panics on a runtime condition; lints in `lib.rs` enforce the absence of
//! `unwrap()` and `panic!()`.
//!
//! ## Fatal errors and poisoning
//!
//! Most errors produced while a block is in flight are *fatal* for the stream:
//! once a codec fails, the sink rejects a write, the thread pool refuses a task
//! or an ordering wait times out, the writer records the first error and every
//! later operation returns a clone of it. This is why [`BlockError`] is `Clone`:
//! the same error has to be handed to the caller of `write`, `flush_block`,
//! `flush` and `finish`, and it originates on a worker thread.
//!
//! ## Error Categories
//!
//! - **I/O Errors** ([`BlockError::Io`]): the sink failed.
//! - **Compression Errors** ([`BlockError::Compression`]): the codec failed.
//! - **Capacity Errors** ([`BlockError::Capacity`]): caller handed more bytes than a
//!   slot holds, or a block would not fit the 32-bit size fields.
//! - **Rejection Errors** ([`BlockError::Rejected`]): the thread pool refused a task.
//! - **Timeout Errors** ([`BlockError::Timeout`]): an ordering or backpressure wait expired.
//! - **Config Errors** ([`BlockError::Config`]): invalid writer configuration.
//! - **Format Errors** ([`BlockError::Format`]): malformed stream given to the inspector.
//! - **Internal Errors** ([`BlockError::Internal`]): logic errors and mutex poisoning.
//!
//! ## Usage
//!
//! ```rust
//! use parblock::{BlockError, NoCompression, ParallelCompressedWriter, WriterConfig};
//! use std::sync::Arc;
//!
//! # fn main() -> parblock::Result<()> {
//! let config = WriterConfig::builder().block_size(64).num_threads(2).build()?;
//! let mut writer = ParallelCompressedWriter::new(Vec::new(), Arc::new(NoCompression), config)?;
//!
//! match writer.append(&[0u8; 65]) {
//!     Err(BlockError::Capacity(msg)) => eprintln!("too large: {msg}"),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! let _sink = writer.finish()?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;

/// A specialized `Result` type for parblock operations.
pub type Result<T> = std::result::Result<T, BlockError>;

/// The master error enum covering all failure domains of the writer.
///
/// I/O errors are wrapped in `Arc` so the type stays cheap to clone when a
/// poisoned writer keeps reporting the same failure.
#[derive(Debug, Clone)]
pub enum BlockError {
    /// The sink rejected a write or a flush.
    ///
    /// The block that hit the failure is never marked free, so no later block
    /// can reach the broken sink out of turn.
    Io(Arc<io::Error>),

    /// The codec failed to compress a block.
    ///
    /// Nothing of the failed block reaches the sink.
    Compression(String),

    /// A capacity limit was exceeded.
    ///
    /// ## Common Causes
    ///
    /// - A strict `append` larger than the configured block size
    /// - A compressed block that does not fit the 32-bit header fields
    Capacity(String),

    /// The thread pool refused a compression task under `RejectPolicy::Fail`.
    Rejected(String),

    /// An ordering or backpressure wait exceeded the configured timeout.
    ///
    /// Usually a stuck predecessor block. Treated as fatal.
    Timeout(String),

    /// The writer configuration is invalid.
    Config(String),

    /// The byte stream handed to the inspector is malformed.
    ///
    /// - Truncated checksum, header or payload
    /// - Header sizes that disagree with each other
    /// - Checksum mismatch
    Format(String),

    /// Logic error or mutex poisoning.
    ///
    /// This error should not occur in production. It usually means a worker
    /// thread panicked while holding a lock.
    Internal(String),
}

impl BlockError {
    /// Returns true for errors that poison a writer.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Compression(_) | Self::Rejected(_) | Self::Timeout(_) | Self::Internal(_)
        )
    }
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O Error: {e}"),
            Self::Compression(s) => write!(f, "Compression Error: {s}"),
            Self::Capacity(s) => write!(f, "Capacity Error: {s}"),
            Self::Rejected(s) => write!(f, "Task Rejected: {s}"),
            Self::Timeout(s) => write!(f, "Timeout: {s}"),
            Self::Config(s) => write!(f, "Config Error: {s}"),
            Self::Format(s) => write!(f, "Format Error: {s}"),
            Self::Internal(s) => write!(f, "Internal Logic Error: {s}"),
        }
    }
}

impl std::error::Error for BlockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for BlockError {
    fn from(err: io::Error) -> Self {
        // Errors that crossed a `std::io::Write` boundary keep their original variant.
        match err.get_ref().and_then(|inner| inner.downcast_ref::<BlockError>()) {
            Some(inner) => inner.clone(),
            None => Self::Io(Arc::new(err)),
        }
    }
}

impl From<BlockError> for io::Error {
    fn from(err: BlockError) -> Self {
        match err {
            BlockError::Io(e) => io::Error::new(e.kind(), BlockError::Io(e)),
            BlockError::Capacity(_) | BlockError::Config(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            BlockError::Format(_) => io::Error::new(io::ErrorKind::InvalidData, err),
            BlockError::Timeout(_) => io::Error::new(io::ErrorKind::TimedOut, err),
            _ => io::Error::other(err),
        }
    }
}
