//! Low-level sink handling for sequential appends.
//!
//! Workers write from arbitrary pool threads, so the sink sits behind a mutex.
//! The mutex gives exclusive access; the *order* of appends is enforced one
//! level up by the predecessor protocol of the buffer pool.

use std::io::Write;
use std::sync::Mutex;

use crate::error::{BlockError, Result};
use crate::format::Checksum128;

/// A thread-safe writer that appends framed blocks and tracks the current offset.
#[derive(Debug)]
pub struct SeqWriter<W> {
    inner: Mutex<WriterState<W>>,
}

#[derive(Debug)]
struct WriterState<W> {
    /// `None` once the sink has been handed back to the caller.
    writer: Option<W>,
    current_offset: u64,
}

impl<W: Write> SeqWriter<W> {
    /// Wraps an existing sink.
    pub fn new(writer: W) -> Self {
        Self {
            inner: Mutex::new(WriterState {
                writer: Some(writer),
                current_offset: 0,
            }),
        }
    }

    /// Appends one frame: checksum low, checksum high, then the compressed bytes.
    ///
    /// Returns the offset where the frame starts.
    pub fn write_frame(&self, checksum: &Checksum128, compressed: &[u8]) -> Result<u64> {
        let mut state = self.lock()?;
        let start_offset = state.current_offset;
        let writer = state.writer_mut()?;

        writer.write_all(&checksum.to_bytes())?;
        writer.write_all(compressed)?;

        state.current_offset += (checksum.to_bytes().len() + compressed.len()) as u64;
        Ok(start_offset)
    }

    /// Flushes the sink.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.writer_mut()?.flush()?;
        Ok(())
    }

    /// Hands the sink back. Later writes fail with `BlockError::Internal`.
    pub fn take(&self) -> Result<W> {
        self.lock()?
            .writer
            .take()
            .ok_or_else(|| BlockError::Internal("Sink already taken".into()))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, WriterState<W>>> {
        self.inner
            .lock()
            .map_err(|_| BlockError::Internal("SeqWriter Mutex poisoned".into()))
    }
}

impl<W> WriterState<W> {
    fn writer_mut(&mut self) -> Result<&mut W> {
        self.writer
            .as_mut()
            .ok_or_else(|| BlockError::Internal("Sink already taken".into()))
    }
}
