//! Pluggable compression backend.
//!
//! A [`Codec`] turns one staged block into a self-delimiting compressed block:
//! the codec-specific payload preceded by a [`BlockHeader`]. Codecs are
//! invoked concurrently from worker threads on independent buffers, so every
//! implementation must be `Send + Sync` and must not keep per-call state.

use std::fmt;

use crate::constants::BLOCK_HEADER_SIZE;
use crate::error::{BlockError, Result};
use crate::format::{self, BlockHeader, Checksum128};

/// Interface for compression algorithms.
///
/// Implementors provide the raw payload transformation; the provided
/// [`Codec::compress`] frames it with the block header.
pub trait Codec: Send + Sync + fmt::Debug {
    /// Method byte stored in the block header.
    fn method(&self) -> u8;

    /// Upper bound of the payload size for `uncompressed_len` input bytes.
    fn max_payload_size(&self, uncompressed_len: usize) -> usize;

    /// Compresses `src` into `dst`, returning the number of payload bytes written.
    ///
    /// `dst` is at least `max_payload_size(src.len())` bytes long.
    fn compress_payload(&self, src: &[u8], dst: &mut [u8]) -> Result<usize>;

    /// Capacity the destination buffer needs to compress `uncompressed_len` bytes.
    fn reserve_size(&self, uncompressed_len: usize) -> usize {
        BLOCK_HEADER_SIZE + self.max_payload_size(uncompressed_len)
    }

    /// Compresses `src` into `dst` as a framed block.
    ///
    /// Returns the compressed size, header included.
    ///
    /// # Errors
    /// `BlockError::Compression` if the codec fails, `BlockError::Capacity` if
    /// the result does not fit the 32-bit header fields.
    fn compress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        let dst_len = dst.len();
        let (head, body) = dst.split_at_mut_checked(BLOCK_HEADER_SIZE).ok_or_else(|| {
            BlockError::Internal(format!(
                "Destination of {dst_len} bytes cannot hold a block header"
            ))
        })?;
        let payload_len = self.compress_payload(src, body)?;
        BlockHeader::new(self.method(), payload_len, src.len())?.write_into(head)?;
        Ok(BLOCK_HEADER_SIZE + payload_len)
    }

    /// Short human readable name.
    fn name(&self) -> &'static str {
        format::method_name(self.method())
    }
}

// --- No Compression (Pass-through) ---

/// A codec that stores blocks verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompression;

impl Codec for NoCompression {
    fn method(&self) -> u8 {
        format::METHOD_NONE
    }

    fn max_payload_size(&self, uncompressed_len: usize) -> usize {
        uncompressed_len
    }

    fn compress_payload(&self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        let dst_len = dst.len();
        let out = dst.get_mut(..src.len()).ok_or_else(|| {
            BlockError::Compression(format!(
                "Destination of {dst_len} bytes too small for {} raw bytes",
                src.len()
            ))
        })?;
        out.copy_from_slice(src);
        Ok(src.len())
    }
}

// --- LZ4 Implementation ---

#[cfg(feature = "lz4_flex")]
/// A codec using the LZ4 block format.
///
/// Available when the `lz4_flex` feature is enabled (default).
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Codec;

#[cfg(feature = "lz4_flex")]
impl Codec for Lz4Codec {
    fn method(&self) -> u8 {
        format::METHOD_LZ4
    }

    fn max_payload_size(&self, uncompressed_len: usize) -> usize {
        lz4_flex::block::get_maximum_output_size(uncompressed_len)
    }

    fn compress_payload(&self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        lz4_flex::block::compress_into(src, dst).map_err(|e| BlockError::Compression(e.to_string()))
    }
}

// --- Zstandard Implementation ---

#[cfg(feature = "zstd")]
/// A codec using Zstandard at a fixed level.
///
/// Available when the `zstd` feature is enabled.
#[derive(Debug, Clone, Copy)]
pub struct ZstdCodec {
    level: i32,
}

#[cfg(feature = "zstd")]
impl ZstdCodec {
    /// Default compression level.
    pub const DEFAULT_LEVEL: i32 = 1;

    /// Creates a codec compressing at `level`.
    pub fn new(level: i32) -> Self {
        Self { level }
    }

    /// Returns the configured level.
    pub fn level(&self) -> i32 {
        self.level
    }
}

#[cfg(feature = "zstd")]
impl Default for ZstdCodec {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LEVEL)
    }
}

#[cfg(feature = "zstd")]
impl Codec for ZstdCodec {
    fn method(&self) -> u8 {
        format::METHOD_ZSTD
    }

    fn max_payload_size(&self, uncompressed_len: usize) -> usize {
        zstd::zstd_safe::compress_bound(uncompressed_len)
    }

    fn compress_payload(&self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        zstd::bulk::compress_to_buffer(src, dst, self.level)
            .map_err(|e| BlockError::Compression(e.to_string()))
    }
}

/// Compresses `src` into `dst` and checksums the framed result.
///
/// `dst` is resized to the codec's reserve size; on success its first
/// `compressed_size` bytes hold the block. Shared by the sequential writer and
/// the parallel workers so both produce identical bytes.
pub fn encode_block(
    codec: &dyn Codec,
    src: &[u8],
    dst: &mut Vec<u8>,
) -> Result<(Checksum128, usize)> {
    dst.resize(codec.reserve_size(src.len()), 0);
    let compressed_size = codec.compress(src, dst)?;
    let block = dst.get(..compressed_size).ok_or_else(|| {
        BlockError::Internal(format!(
            "Codec {} reported {compressed_size} bytes for a {} byte buffer",
            codec.name(),
            dst.len()
        ))
    })?;
    Ok((Checksum128::compute(block), compressed_size))
}
