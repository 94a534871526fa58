//! Tools for inspecting the physical structure of a block stream.
//! Useful for verifying writer output without decompressing anything.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use serde::Serialize;

use crate::constants::{BLOCK_HEADER_SIZE, CHECKSUM_SIZE};
use crate::error::{BlockError, Result};
use crate::format::{self, BlockHeader, Checksum128};

/// A structural report of a block stream.
#[derive(Debug, Clone, Serialize)]
pub struct DebugReport {
    /// Total size of the stream.
    pub stream_size: u64,
    /// Sum of the blocks' uncompressed sizes.
    pub total_decompressed: u64,
    /// Every block, in stream order.
    pub blocks: Vec<BlockInfo>,
}

/// Metadata for a single framed block.
#[derive(Debug, Clone, Serialize)]
pub struct BlockInfo {
    /// Offset of the frame (its checksum) in the stream.
    pub offset: u64,
    /// Header plus payload size, the bytes covered by the checksum.
    pub compressed_size: u32,
    /// Size before compression.
    pub decompressed_size: u32,
    /// Codec name derived from the method byte.
    pub method: String,
    /// Stored checksum, low half.
    pub checksum_low: u64,
    /// Stored checksum, high half.
    pub checksum_high: u64,
}

impl DebugReport {
    /// Number of blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

/// Inspector for block streams.
#[derive(Debug)]
pub struct BlockInspector;

impl BlockInspector {
    /// Walks `bytes`, validating every frame and checksum.
    ///
    /// # Errors
    /// `BlockError::Format` on truncation, malformed headers or checksum mismatch.
    pub fn inspect_bytes(bytes: &[u8]) -> Result<DebugReport> {
        let mut blocks = Vec::new();
        let mut total_decompressed = 0u64;
        let mut offset = 0usize;

        while offset < bytes.len() {
            let frame = &bytes[offset..];
            let stored = Checksum128::from_bytes(frame).map_err(|_| {
                BlockError::Format(format!("Truncated checksum at offset {offset}"))
            })?;

            let block = &frame[CHECKSUM_SIZE..];
            if block.len() < BLOCK_HEADER_SIZE {
                return Err(BlockError::Format(format!(
                    "Truncated block header at offset {}",
                    offset + CHECKSUM_SIZE
                )));
            }
            let header = BlockHeader::from_bytes(block)?;
            let covered = block.get(..header.compressed_size as usize).ok_or_else(|| {
                BlockError::Format(format!(
                    "Block at offset {offset} claims {} bytes, {} left",
                    header.compressed_size,
                    block.len()
                ))
            })?;

            let computed = Checksum128::compute(covered);
            if computed != stored {
                return Err(BlockError::Format(format!(
                    "Checksum mismatch at offset {offset}: stored {:016x}{:016x}, computed {:016x}{:016x}",
                    stored.high, stored.low, computed.high, computed.low
                )));
            }

            total_decompressed += u64::from(header.decompressed_size);
            blocks.push(BlockInfo {
                offset: offset as u64,
                compressed_size: header.compressed_size,
                decompressed_size: header.decompressed_size,
                method: format::method_name(header.method).to_string(),
                checksum_low: stored.low,
                checksum_high: stored.high,
            });
            offset += CHECKSUM_SIZE + covered.len();
        }

        Ok(DebugReport {
            stream_size: bytes.len() as u64,
            total_decompressed,
            blocks,
        })
    }

    /// Memory-maps a file and inspects it.
    pub fn inspect_file<P: AsRef<Path>>(path: P) -> Result<DebugReport> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Self::inspect_bytes(&[]);
        }

        // Safety: the mapping is read-only and dropped before returning; the file
        // is assumed not to be modified concurrently.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Self::inspect_bytes(&mmap)
    }
}
