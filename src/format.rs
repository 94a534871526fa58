//! Defines the physical binary layout of a compressed block stream.
//!
//! # Layout
//! The stream is a plain concatenation of framed blocks, with no global header
//! or footer, so it can be appended to an existing file and read sequentially.
//!
//! Stream: `[Frame 0] [Frame 1] ... [Frame N]`
//!
//! ## Frame Anatomy
//! `[ Checksum Low (8) ] [ Checksum High (8) ] [ Block Header (9) ] [ Payload ]`
//!
//! The checksum covers the block header and the payload. The block header is
//! written by the codec and makes each frame self-delimiting:
//! `[ Method (1) ] [ Compressed Size incl. header (4, LE) ] [ Decompressed Size (4, LE) ]`

use crate::constants::{BLOCK_HEADER_SIZE, CHECKSUM_SIZE};
use crate::error::{BlockError, Result};
use twox_hash::XxHash3_128;

/// Method byte for blocks stored without compression.
pub const METHOD_NONE: u8 = 0x02;
/// Method byte for LZ4 blocks.
pub const METHOD_LZ4: u8 = 0x82;
/// Method byte for Zstandard blocks.
pub const METHOD_ZSTD: u8 = 0x90;

/// Human readable name of a method byte.
pub fn method_name(method: u8) -> &'static str {
    match method {
        METHOD_NONE => "none",
        METHOD_LZ4 => "lz4",
        METHOD_ZSTD => "zstd",
        _ => "unknown",
    }
}

/// 128-bit checksum over the compressed bytes of one block.
///
/// Stored on the sink as two little-endian halves, low first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum128 {
    /// Lower 64 bits.
    pub low: u64,
    /// Upper 64 bits.
    pub high: u64,
}

impl Checksum128 {
    /// Hashes exactly `data`.
    pub fn compute(data: &[u8]) -> Self {
        Self::from_u128(XxHash3_128::oneshot(data))
    }

    /// Splits a 128-bit value into its halves.
    pub fn from_u128(value: u128) -> Self {
        Self {
            low: value as u64,
            high: (value >> 64) as u64,
        }
    }

    /// Serializes to the on-sink representation.
    pub fn to_bytes(&self) -> [u8; CHECKSUM_SIZE] {
        let mut buf = [0u8; CHECKSUM_SIZE];
        buf[0..8].copy_from_slice(&self.low.to_le_bytes());
        buf[8..16].copy_from_slice(&self.high.to_le_bytes());
        buf
    }

    /// Deserializes from the on-sink representation.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < CHECKSUM_SIZE {
            return Err(BlockError::Format("Buffer too small for checksum".into()));
        }
        Ok(Self {
            low: read_u64(&bytes[0..8]),
            high: read_u64(&bytes[8..16]),
        })
    }
}

/// Header written by every codec in front of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Codec method byte.
    pub method: u8,
    /// Size of header plus payload.
    pub compressed_size: u32,
    /// Size of the block before compression.
    pub decompressed_size: u32,
}

impl BlockHeader {
    /// Builds a header for a payload of `payload_len` bytes.
    ///
    /// # Errors
    /// Returns `BlockError::Capacity` if either size exceeds the 32-bit fields.
    pub fn new(method: u8, payload_len: usize, decompressed_len: usize) -> Result<Self> {
        let compressed_size = payload_len
            .checked_add(BLOCK_HEADER_SIZE)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                BlockError::Capacity(format!(
                    "compressed block of {payload_len} bytes does not fit a 32-bit size"
                ))
            })?;
        let decompressed_size = u32::try_from(decompressed_len).map_err(|_| {
            BlockError::Capacity(format!(
                "block of {decompressed_len} bytes does not fit a 32-bit size"
            ))
        })?;
        Ok(Self {
            method,
            compressed_size,
            decompressed_size,
        })
    }

    /// Writes the header into the first `BLOCK_HEADER_SIZE` bytes of `dst`.
    pub fn write_into(&self, dst: &mut [u8]) -> Result<()> {
        let dst = dst
            .get_mut(..BLOCK_HEADER_SIZE)
            .ok_or_else(|| BlockError::Internal("Destination too small for block header".into()))?;
        dst[0] = self.method;
        dst[1..5].copy_from_slice(&self.compressed_size.to_le_bytes());
        dst[5..9].copy_from_slice(&self.decompressed_size.to_le_bytes());
        Ok(())
    }

    /// Parses a header from the front of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < BLOCK_HEADER_SIZE {
            return Err(BlockError::Format("Buffer too small for block header".into()));
        }
        let header = Self {
            method: bytes[0],
            compressed_size: read_u32(&bytes[1..5]),
            decompressed_size: read_u32(&bytes[5..9]),
        };
        if (header.compressed_size as usize) < BLOCK_HEADER_SIZE {
            return Err(BlockError::Format(format!(
                "Compressed size {} smaller than block header",
                header.compressed_size
            )));
        }
        Ok(header)
    }

    /// Payload length after the header.
    pub fn payload_len(&self) -> usize {
        self.compressed_size as usize - BLOCK_HEADER_SIZE
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    u64::from_le_bytes(bytes.try_into().unwrap_or([0; 8]))
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes(bytes.try_into().unwrap_or([0; 4]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_halves_are_little_endian_low_first() {
        let sum = Checksum128::from_u128(0x0102_0304_0506_0708_1112_1314_1516_1718);
        let bytes = sum.to_bytes();
        assert_eq!(bytes[0], 0x18);
        assert_eq!(bytes[8], 0x08);
        assert_eq!(Checksum128::from_bytes(&bytes).ok(), Some(sum));
    }

    #[test]
    fn header_rejects_sizes_smaller_than_itself() {
        let mut bytes = [0u8; BLOCK_HEADER_SIZE];
        bytes[0] = METHOD_NONE;
        bytes[1..5].copy_from_slice(&3u32.to_le_bytes());
        assert!(matches!(BlockHeader::from_bytes(&bytes), Err(BlockError::Format(_))));
    }

    #[test]
    fn header_counts_itself_in_compressed_size() -> Result<()> {
        let header = BlockHeader::new(METHOD_LZ4, 100, 400)?;
        assert_eq!(header.compressed_size as usize, 100 + BLOCK_HEADER_SIZE);
        assert_eq!(header.payload_len(), 100);
        Ok(())
    }
}
