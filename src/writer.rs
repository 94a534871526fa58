//! The write coordinator.
//!
//! [`ParallelCompressedWriter`] runs on the caller's thread. It fills the
//! current slot of the buffer pool, freezes it when full, hands it to a
//! worker and advances to the next slot, blocking while that slot still has
//! a block in flight. The caller can therefore never get more than
//! `num_threads` blocks ahead of the sink.

use std::io::{self, Write};
use std::mem;
use std::sync::Arc;

use crate::compression::Codec;
use crate::config::{RejectPolicy, WriterConfig};
use crate::error::{BlockError, Result};
use crate::executor::{self, BlockJob, SharedState, TaskExecutor, WriterShared, process_block};
use crate::io::SeqWriter;
use crate::pool::{BlockBuffers, BufferPool};
use crate::stats::{StatsSnapshot, TaskObserver};

/// Compresses a byte stream in parallel, appending blocks to the sink in order.
///
/// The output is byte-for-byte identical to
/// [`CompressedWriter`](crate::CompressedWriter) given the same codec and
/// block size.
///
/// Call [`finish`](Self::finish) to get the sink back and observe errors.
/// Dropping an unfinished writer still drains every block, but can only log
/// failures.
///
/// ```rust
/// use parblock::{NoCompression, ParallelCompressedWriter, WriterConfig};
/// use std::io::Write;
/// use std::sync::Arc;
///
/// # fn main() -> parblock::Result<()> {
/// let config = WriterConfig::builder().block_size(1024).num_threads(4).build()?;
/// let mut writer = ParallelCompressedWriter::new(Vec::new(), Arc::new(NoCompression), config)?;
/// writer.write_all(&[7u8; 10_000])?;
/// let sink = writer.finish()?;
/// assert!(sink.len() > 10_000);
/// # Ok(())
/// # }
/// ```
pub struct ParallelCompressedWriter<W: Write + Send + 'static> {
    shared: Arc<WriterShared<W>>,
    executor: Arc<dyn TaskExecutor>,
    config: WriterConfig,
    /// Buffers of the current slot, owned by the caller's thread while it fills them.
    staging: BlockBuffers,
    next_seq: u64,
    finished: bool,
}

impl<W: Write + Send + 'static> ParallelCompressedWriter<W> {
    /// Creates a writer backed by a dedicated Rayon pool of `config.num_threads` workers.
    pub fn new(sink: W, codec: Arc<dyn Codec>, config: WriterConfig) -> Result<Self> {
        Self::build(sink, codec, config, None, None)
    }

    /// Creates a writer submitting its tasks to `executor`.
    pub fn with_executor(
        sink: W,
        codec: Arc<dyn Codec>,
        config: WriterConfig,
        executor: Arc<dyn TaskExecutor>,
    ) -> Result<Self> {
        Self::build(sink, codec, config, Some(executor), None)
    }

    /// Like [`with_executor`](Self::with_executor), calling `observer` around every task.
    pub fn with_observer(
        sink: W,
        codec: Arc<dyn Codec>,
        config: WriterConfig,
        executor: Arc<dyn TaskExecutor>,
        observer: Arc<dyn TaskObserver>,
    ) -> Result<Self> {
        Self::build(sink, codec, config, Some(executor), Some(observer))
    }

    fn build(
        sink: W,
        codec: Arc<dyn Codec>,
        config: WriterConfig,
        executor: Option<Arc<dyn TaskExecutor>>,
        observer: Option<Arc<dyn TaskObserver>>,
    ) -> Result<Self> {
        config.validate_for(codec.as_ref())?;
        let executor: Arc<dyn TaskExecutor> = match executor {
            Some(executor) => executor,
            None => Arc::new(executor::dedicated_pool(config.num_threads)?),
        };

        let mut pool = BufferPool::new(config.num_threads, config.block_size);
        let staging = pool.take_buffers(pool.current());
        let shared = WriterShared::new(
            pool,
            SeqWriter::new(sink),
            codec,
            observer,
            config.wait_timeout,
        );

        tracing::debug!(
            block_size = config.block_size,
            num_threads = config.num_threads,
            "parallel compressed writer created"
        );

        Ok(Self {
            shared: Arc::new(shared),
            executor,
            config,
            staging,
            next_seq: 0,
            finished: false,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Bytes buffered in the current slot.
    pub fn pending(&self) -> usize {
        self.staging.uncompressed.len()
    }

    /// Blocks handed to workers so far.
    pub fn blocks_submitted(&self) -> u64 {
        self.next_seq
    }

    /// Reads the writer's counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Appends `bytes`, which must fit in one slot.
    ///
    /// Crosses at most one block boundary.
    ///
    /// # Errors
    /// `BlockError::Capacity` if `bytes` is larger than the block size; nothing
    /// is written in that case.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.config.block_size {
            return Err(BlockError::Capacity(format!(
                "write of {} bytes exceeds block size {}",
                bytes.len(),
                self.config.block_size
            )));
        }
        self.write_bytes(bytes)
    }

    fn write_bytes(&mut self, mut bytes: &[u8]) -> Result<()> {
        self.check_failure()?;
        while !bytes.is_empty() {
            let room = self.config.block_size - self.staging.uncompressed.len();
            let (head, tail) = bytes.split_at(room.min(bytes.len()));
            self.staging.uncompressed.extend_from_slice(head);
            bytes = tail;

            if self.staging.uncompressed.len() == self.config.block_size {
                self.flush_block()?;
            }
        }
        Ok(())
    }

    /// Hands the buffered bytes to a worker as one block.
    ///
    /// Without buffered bytes this does nothing. Otherwise it blocks while the
    /// next slot still has a block in flight.
    pub fn flush_block(&mut self) -> Result<()> {
        self.check_failure()?;
        if self.staging.uncompressed.is_empty() {
            return Ok(());
        }

        let seq = self.next_seq;
        let (job, next) = {
            let mut state = self.shared.lock()?;
            WriterShared::<W>::check_failure(&state)?;

            let slot = state.pool.mark_current_busy();
            let predecessor = state.pool.predecessor(slot.index);
            state.in_flight += 1;
            self.shared.stats.block_submitted();

            let (_, next) = state.pool.advance();
            let job = BlockJob {
                slot,
                predecessor,
                seq,
                buffers: mem::take(&mut self.staging),
            };
            (job, next)
        };
        self.next_seq += 1;

        let submitted = job.slot;
        let shared = Arc::clone(&self.shared);
        let task: executor::Task = Box::new(move || process_block(&shared, job));

        if let Err(task) = self.executor.submit(task) {
            match self.config.reject_policy {
                RejectPolicy::RunInline => {
                    tracing::debug!(seq, "thread pool rejected block, compressing inline");
                    task();
                }
                RejectPolicy::Fail => {
                    drop(task);
                    let err = BlockError::Rejected(format!("thread pool refused block {seq}"));
                    {
                        let mut state = self.shared.lock_recovering();
                        state.in_flight = state.in_flight.saturating_sub(1);
                        self.shared.signal_error(&mut state, err.clone());
                    }
                    self.shared.notify();
                    return Err(err);
                }
            }
        }

        let state = self.shared.lock()?;
        let mut state = self.wait_for_slot(state, next)?;
        state.pool.set_predecessor(next, Some(submitted));
        self.staging = state.pool.take_buffers(next);
        self.staging.uncompressed.clear();
        Ok(())
    }

    /// Backpressure: waits until the slot at `index` is free.
    fn wait_for_slot<'a>(
        &self,
        state: std::sync::MutexGuard<'a, SharedState>,
        index: usize,
    ) -> Result<std::sync::MutexGuard<'a, SharedState>> {
        if state.pool.is_busy(index) {
            self.shared.stats.backpressure_wait();
            tracing::trace!(slot = index, "all slots in flight, waiting");
        }
        let waited = self
            .shared
            .wait_until(state, self.config.wait_timeout, "backpressure wait", |s| {
                s.failure.is_some() || !s.pool.is_busy(index)
            });
        let state = match waited {
            Ok(state) => state,
            Err(err) => {
                {
                    let mut state = self.shared.lock_recovering();
                    self.shared.signal_error(&mut state, err.clone());
                }
                self.shared.notify();
                return Err(err);
            }
        };
        WriterShared::<W>::check_failure(&state)?;
        Ok(state)
    }

    /// Submits pending bytes and waits until every block has reached the sink,
    /// then flushes the sink.
    pub fn sync(&mut self) -> Result<()> {
        let submitted = self.flush_block();
        self.shared.drain()?;
        submitted?;
        self.check_failure()?;
        self.shared.sink.flush()
    }

    /// Submits pending bytes, drains every in-flight block and returns the sink.
    ///
    /// In-flight blocks are drained even when the writer is poisoned; the first
    /// fatal error is returned afterwards.
    pub fn finish(mut self) -> Result<W> {
        self.finished = true;
        let submitted = self.flush_block();
        self.shared.drain()?;
        submitted?;
        self.check_failure()?;
        self.shared.sink.flush()?;

        let stats = self.shared.stats.snapshot();
        tracing::debug!(
            blocks = stats.blocks_written,
            bytes_in = stats.bytes_in,
            bytes_out = stats.bytes_out,
            "parallel compressed writer finished"
        );
        self.shared.sink.take()
    }

    fn check_failure(&self) -> Result<()> {
        if !self.shared.should_abort() {
            return Ok(());
        }
        let state = self.shared.lock()?;
        WriterShared::<W>::check_failure(&state)
    }
}

impl<W: Write + Send + 'static> Write for ParallelCompressedWriter<W> {
    /// Accepts at most the room left in the current slot.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let room = self.config.block_size - self.staging.uncompressed.len();
        let n = buf.len().min(room);
        self.write_bytes(&buf[..n])?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.sync()?)
    }
}

impl<W: Write + Send + 'static> Drop for ParallelCompressedWriter<W> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let submitted = self.flush_block();
        if let Err(err) = self.shared.drain() {
            tracing::error!(error = %err, "failed to drain compression tasks on drop");
            return;
        }
        let result = submitted
            .and_then(|()| self.check_failure())
            .and_then(|()| self.shared.sink.flush());
        if let Err(err) = result {
            tracing::error!(error = %err, "parallel compressed writer dropped with an error");
        }
    }
}

impl<W: Write + Send + 'static> std::fmt::Debug for ParallelCompressedWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelCompressedWriter")
            .field("config", &self.config)
            .field("pending", &self.pending())
            .field("next_seq", &self.next_seq)
            .finish()
    }
}
