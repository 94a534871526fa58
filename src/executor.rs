//! The compression worker and the thread pool seam.
//!
//! Workers are purely reactive: each one compresses its block as soon as it
//! runs, then parks on the shared condition variable until the block submitted
//! right before it has reached the sink. Compression (the expensive part)
//! proceeds fully out of order; only the append is serialized, and each worker
//! waits on exactly one predecessor instead of a global turnstile.

use std::io::Write;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::compression::{Codec, encode_block};
use crate::error::{BlockError, Result};
use crate::io::SeqWriter;
use crate::pool::{BlockBuffers, BufferPool, SlotRef};
use crate::stats::{TaskEvent, TaskObserver, WriterStats};

/// A unit of work handed to a [`TaskExecutor`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Work-submission service running compression tasks.
///
/// A rejected task is handed back so the writer can apply its
/// [`RejectPolicy`](crate::RejectPolicy).
pub trait TaskExecutor: Send + Sync {
    /// Schedules `task`, or returns it if the executor refuses it.
    fn submit(&self, task: Task) -> std::result::Result<(), Task>;
}

impl TaskExecutor for rayon::ThreadPool {
    fn submit(&self, task: Task) -> std::result::Result<(), Task> {
        self.spawn(task);
        Ok(())
    }
}

/// Runs every task on Rayon's global pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalRayon;

impl TaskExecutor for GlobalRayon {
    fn submit(&self, task: Task) -> std::result::Result<(), Task> {
        rayon::spawn(task);
        Ok(())
    }
}

/// Runs every task synchronously on the submitting thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl TaskExecutor for InlineExecutor {
    fn submit(&self, task: Task) -> std::result::Result<(), Task> {
        task();
        Ok(())
    }
}

/// Builds a dedicated Rayon pool with `num_threads` workers.
pub fn dedicated_pool(num_threads: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("parblock-{i}"))
        .build()
        .map_err(|e| BlockError::Config(format!("cannot build thread pool: {e}")))
}

/// State guarded by the single mutex shared by the caller and the workers.
#[derive(Debug)]
pub(crate) struct SharedState {
    pub(crate) pool: BufferPool,
    /// Tasks submitted and not yet returned.
    pub(crate) in_flight: usize,
    /// First fatal error; once set the writer is poisoned.
    pub(crate) failure: Option<BlockError>,
}

/// Context shared between the writer and all of its tasks.
pub(crate) struct WriterShared<W> {
    state: Mutex<SharedState>,
    cond: Condvar,
    abort_flag: AtomicBool,
    pub(crate) sink: SeqWriter<W>,
    pub(crate) codec: Arc<dyn Codec>,
    pub(crate) stats: WriterStats,
    pub(crate) observer: Option<Arc<dyn TaskObserver>>,
    pub(crate) wait_timeout: Option<Duration>,
}

/// One frozen block on its way to the sink.
#[derive(Debug)]
pub(crate) struct BlockJob {
    pub(crate) slot: SlotRef,
    pub(crate) predecessor: Option<SlotRef>,
    pub(crate) seq: u64,
    pub(crate) buffers: BlockBuffers,
}

impl<W> WriterShared<W> {
    pub(crate) fn new(
        pool: BufferPool,
        sink: SeqWriter<W>,
        codec: Arc<dyn Codec>,
        observer: Option<Arc<dyn TaskObserver>>,
        wait_timeout: Option<Duration>,
    ) -> Self {
        Self {
            state: Mutex::new(SharedState {
                pool,
                in_flight: 0,
                failure: None,
            }),
            cond: Condvar::new(),
            abort_flag: AtomicBool::new(false),
            sink,
            codec,
            stats: WriterStats::default(),
            observer,
            wait_timeout,
        }
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, SharedState>> {
        self.state
            .lock()
            .map_err(|_| BlockError::Internal("Writer state mutex poisoned".into()))
    }

    /// Locks even if a thread panicked while holding the mutex.
    ///
    /// Used on paths that must release bookkeeping no matter what.
    pub(crate) fn lock_recovering(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Wakes every waiter: the caller in backpressure and workers in ordering waits.
    pub(crate) fn notify(&self) {
        self.cond.notify_all();
    }

    pub(crate) fn should_abort(&self) -> bool {
        self.abort_flag.load(Ordering::Relaxed)
    }

    /// Records the first fatal error. Callers notify after releasing the lock.
    pub(crate) fn signal_error(&self, state: &mut SharedState, err: BlockError) {
        if state.failure.is_none() {
            tracing::warn!(error = %err, "parallel compressed writer poisoned");
            state.failure = Some(err);
            self.abort_flag.store(true, Ordering::SeqCst);
        }
    }

    pub(crate) fn check_failure(state: &SharedState) -> Result<()> {
        match &state.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Blocks until `ready` holds, honoring `timeout`.
    ///
    /// # Errors
    /// `BlockError::Timeout` if the deadline passes first.
    pub(crate) fn wait_until<'a, F>(
        &self,
        guard: MutexGuard<'a, SharedState>,
        timeout: Option<Duration>,
        what: &str,
        mut ready: F,
    ) -> Result<MutexGuard<'a, SharedState>>
    where
        F: FnMut(&SharedState) -> bool,
    {
        let poisoned = || BlockError::Internal("Writer state mutex poisoned".into());
        match timeout {
            None => self
                .cond
                .wait_while(guard, |s| !ready(s))
                .map_err(|_| poisoned()),
            Some(limit) => {
                let started = Instant::now();
                let (guard, result) = self
                    .cond
                    .wait_timeout_while(guard, limit, |s| !ready(s))
                    .map_err(|_| poisoned())?;
                if result.timed_out() && !ready(&guard) {
                    return Err(BlockError::Timeout(format!(
                        "{what} exceeded {:?} (waited {:?})",
                        limit,
                        started.elapsed()
                    )));
                }
                Ok(guard)
            }
        }
    }

    /// Blocks until no task is running.
    pub(crate) fn drain(&self) -> Result<()> {
        let state = self.lock()?;
        let _state = self.wait_until(state, None, "drain", |s| s.in_flight == 0)?;
        Ok(())
    }

    /// Runs a user hook. A panicking hook becomes `BlockError::Internal`.
    fn observe(&self, seq: u64, f: impl FnOnce(&dyn TaskObserver)) -> Result<()> {
        let Some(observer) = self.observer.as_deref() else {
            return Ok(());
        };
        catch_unwind(AssertUnwindSafe(|| f(observer)))
            .map_err(|_| BlockError::Internal(format!("task observer panicked on block {seq}")))
    }
}

/// The worker function executed by pool threads.
///
/// Compression -> Checksum -> Ordering wait -> Append -> Release.
pub(crate) fn process_block<W: Write>(shared: &WriterShared<W>, job: BlockJob) {
    let BlockJob {
        slot,
        predecessor,
        seq,
        mut buffers,
    } = job;
    let _span = tracing::debug_span!("compress block", seq, slot = slot.index).entered();

    let mut event = TaskEvent {
        seq,
        slot: slot.index,
        decompressed_size: buffers.uncompressed.len(),
        written_size: 0,
    };
    let started = shared.observe(seq, |o| o.task_started(&event));

    let outcome = if let Err(err) = started {
        Err(err)
    } else if shared.should_abort() {
        Err(BlockError::Internal("writer poisoned before block ran".into()))
    } else {
        catch_unwind(AssertUnwindSafe(|| {
            compress_and_append(shared, predecessor, &mut buffers)
        }))
        .unwrap_or_else(|_| Err(BlockError::Internal(format!("worker for block {seq} panicked"))))
    };

    let ok = outcome.is_ok();
    if let Ok(written) = &outcome {
        event.written_size = *written;
    }
    tracing::trace!(seq, ok, "block task finished");
    // Before the slot is released, so `finish` never returns ahead of the hook.
    let finished = shared.observe(seq, |o| o.task_finished(&event, ok));

    {
        let mut state = shared.lock_recovering();
        match outcome {
            Ok(written) => {
                shared.stats.block_written(event.decompressed_size, written);
                state.pool.release(slot, buffers);
                shared.stats.block_retired();
            }
            // The slot stays busy: nothing queued behind it may touch the sink.
            Err(err) => shared.signal_error(&mut state, err),
        }
        // The block is already on the sink; only later blocks are stopped.
        if let Err(err) = finished {
            shared.signal_error(&mut state, err);
        }
        state.in_flight = state.in_flight.saturating_sub(1);
    }
    shared.notify();
}

/// Returns the number of bytes appended to the sink.
fn compress_and_append<W: Write>(
    shared: &WriterShared<W>,
    predecessor: Option<SlotRef>,
    buffers: &mut BlockBuffers,
) -> Result<usize> {
    let BlockBuffers {
        uncompressed,
        compressed,
    } = buffers;

    let (checksum, compressed_size) = encode_block(shared.codec.as_ref(), uncompressed, compressed)?;

    wait_for_predecessor(shared, predecessor)?;

    let block = compressed
        .get(..compressed_size)
        .ok_or_else(|| BlockError::Internal("compressed size out of buffer bounds".into()))?;
    let offset = shared.sink.write_frame(&checksum, block)?;
    tracing::trace!(offset, compressed_size, "block appended");

    Ok(checksum.to_bytes().len() + compressed_size)
}

/// Ordering wait: returns once the predecessor block has been appended.
fn wait_for_predecessor<W>(shared: &WriterShared<W>, predecessor: Option<SlotRef>) -> Result<()> {
    let state = shared.lock()?;
    WriterShared::<W>::check_failure(&state)?;

    let Some(predecessor) = predecessor else {
        return Ok(());
    };
    if !state.pool.is_finished(predecessor) {
        shared.stats.ordering_wait();
        tracing::trace!(?predecessor, "waiting for predecessor block");
    }

    let state = shared.wait_until(state, shared.wait_timeout, "ordering wait", |s| {
        s.failure.is_some() || s.pool.is_finished(predecessor)
    })?;
    WriterShared::<W>::check_failure(&state)
}
