//! # parblock
//!
//! Parallel block compression with strictly ordered output.
//!
//! ## Overview
//!
//! [`ParallelCompressedWriter`] accepts a continuous byte stream, cuts it into
//! fixed-size blocks and compresses those blocks concurrently on a worker pool.
//! The blocks reach the underlying sink in exactly the order they were
//! written, byte-for-byte identical to what the single-threaded
//! [`CompressedWriter`] produces. A sequential reader cannot tell the stream
//! was compressed in parallel.
//!
//! ## Architecture
//!
//! ### The Buffer Pool
//!
//! The writer owns a ring of staging slots, grown lazily up to `num_threads`
//! and then reused cyclically. The caller fills the *current* slot; when it is
//! full the slot is frozen, handed to a worker, and the cursor advances. If
//! the next slot still has a block in flight, the caller blocks. This is the
//! only flow control: at most `num_threads` blocks are ever in memory.
//!
//! ### Ordering
//!
//! Every frozen slot records the slot submitted right before it (its
//! *predecessor*), as an index plus a generation counter. A worker compresses
//! and checksums its block immediately, then waits until the predecessor has
//! reached the sink before appending. Compression runs fully out of order;
//! only the append is serialized.
//!
//! ### Stream Format
//!
//! ```text
//! [Checksum Low u64 LE] [Checksum High u64 LE] [Method u8] [Compressed Size u32 LE] [Decompressed Size u32 LE] [Payload]
//! ```
//!
//! The 128-bit checksum (XXH3) covers the block header and payload. See [`format`].
//!
//! ## Usage
//!
//! ```rust
//! use parblock::{BlockInspector, NoCompression, ParallelCompressedWriter, WriterConfig};
//! use std::io::Write;
//! use std::sync::Arc;
//!
//! # fn main() -> parblock::Result<()> {
//! let config = WriterConfig::builder().block_size(4096).num_threads(4).build()?;
//! let mut writer = ParallelCompressedWriter::new(Vec::new(), Arc::new(NoCompression), config)?;
//!
//! for row in 0..10_000u32 {
//!     writer.write_all(&row.to_le_bytes())?;
//! }
//! let bytes = writer.finish()?;
//!
//! let report = BlockInspector::inspect_bytes(&bytes)?;
//! assert_eq!(report.block_count(), 10);
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! Codec failures, sink failures, thread pool rejections and wait timeouts
//! poison the writer: no partial or out-of-order block reaches the sink and
//! every later call returns the first error. See [`error`].

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// --- PUBLIC API MODULES ---
pub mod api;
pub mod compression;
pub mod config;
pub mod error;
pub mod format;
pub mod inspector;
pub mod sequential;
pub mod stats;
pub mod writer;

// --- INTERNAL IMPLEMENTATION MODULES (Hidden from Docs) ---
#[doc(hidden)]
pub mod executor;
#[doc(hidden)]
pub mod io;
#[doc(hidden)]
pub mod pool;

// --- RE-EXPORTS ---

#[cfg(feature = "lz4_flex")]
pub use compression::Lz4Codec;
#[cfg(feature = "zstd")]
pub use compression::ZstdCodec;
pub use compression::{Codec, NoCompression};

pub use api::Parblock;
pub use config::{RejectPolicy, WriterConfig};
pub use error::{BlockError, Result};
pub use executor::{GlobalRayon, InlineExecutor, Task, TaskExecutor};
pub use inspector::{BlockInspector, DebugReport};
pub use sequential::CompressedWriter;
pub use stats::{StatsSnapshot, TaskEvent, TaskObserver};
pub use writer::ParallelCompressedWriter;

/// Constants used throughout the library.
pub mod constants {
    /// The default uncompressed block size.
    pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;
    /// Bytes of the checksum in front of every block.
    pub const CHECKSUM_SIZE: usize = 16;
    /// Bytes of the header every codec writes in front of its payload.
    pub const BLOCK_HEADER_SIZE: usize = 9;
}
