//! Single-threaded block writer.
//!
//! Produces the same frames as the parallel writer, one block at a time on
//! the caller's thread. Useful on its own for small streams and as the
//! reference the parallel writer is measured against.

use std::io::{self, Write};
use std::sync::Arc;

use crate::compression::{Codec, encode_block};
use crate::constants::DEFAULT_BLOCK_SIZE;
use crate::error::{BlockError, Result};

/// Sequential compressing writer.
#[derive(Debug)]
pub struct CompressedWriter<W: Write> {
    sink: W,
    codec: Arc<dyn Codec>,
    block_size: usize,
    uncompressed: Vec<u8>,
    compressed: Vec<u8>,
    blocks_written: u64,
}

impl<W: Write> CompressedWriter<W> {
    /// Creates a writer with the default block size.
    pub fn new(sink: W, codec: Arc<dyn Codec>) -> Self {
        Self {
            sink,
            codec,
            block_size: DEFAULT_BLOCK_SIZE,
            uncompressed: Vec::with_capacity(DEFAULT_BLOCK_SIZE),
            compressed: Vec::new(),
            blocks_written: 0,
        }
    }

    /// Creates a writer with blocks of `block_size` bytes.
    pub fn with_block_size(sink: W, codec: Arc<dyn Codec>, block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(BlockError::Config("block_size must be at least 1".into()));
        }
        if u32::try_from(codec.reserve_size(block_size)).is_err() {
            return Err(BlockError::Config(format!(
                "block_size {block_size} over the 32-bit limit for codec {}",
                codec.name()
            )));
        }
        Ok(Self {
            sink,
            codec,
            block_size,
            uncompressed: Vec::with_capacity(block_size),
            compressed: Vec::new(),
            blocks_written: 0,
        })
    }

    /// Blocks appended to the sink so far.
    pub fn blocks_written(&self) -> u64 {
        self.blocks_written
    }

    /// Compresses and appends the buffered bytes, if any.
    pub fn flush_block(&mut self) -> Result<()> {
        if self.uncompressed.is_empty() {
            return Ok(());
        }
        let (checksum, size) =
            encode_block(self.codec.as_ref(), &self.uncompressed, &mut self.compressed)?;
        self.sink.write_all(&checksum.to_bytes())?;
        self.sink.write_all(&self.compressed[..size])?;
        self.uncompressed.clear();
        self.blocks_written += 1;
        Ok(())
    }

    /// Writes the last block, flushes and returns the sink.
    pub fn finish(mut self) -> Result<W> {
        self.flush_block()?;
        self.sink.flush()?;
        Ok(self.sink)
    }
}

impl<W: Write> Write for CompressedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let room = self.block_size - self.uncompressed.len();
        let n = room.min(buf.len());
        self.uncompressed.extend_from_slice(&buf[..n]);
        if self.uncompressed.len() == self.block_size {
            self.flush_block()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_block()?;
        self.sink.flush()
    }
}
