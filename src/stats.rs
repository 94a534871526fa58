//! Observability hooks around compression tasks.
//!
//! Nothing in here influences scheduling or ordering. Counters are relaxed
//! atomics read through [`WriterStats::snapshot`].

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Information handed to a [`TaskObserver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskEvent {
    /// Position of the block in the caller's stream, starting at 0.
    pub seq: u64,
    /// Ring index of the slot carrying the block.
    pub slot: usize,
    /// Bytes staged in the block.
    pub decompressed_size: usize,
    /// Bytes appended to the sink for this block, checksum included. Zero until written.
    pub written_size: usize,
}

/// User hook called by worker threads.
///
/// Both methods run on the worker thread, outside of any lock. A panicking
/// hook poisons the writer with `BlockError::Internal`.
pub trait TaskObserver: Send + Sync {
    /// A worker picked up a block.
    fn task_started(&self, _event: &TaskEvent) {}

    /// A block reached the sink (`ok == true`) or the task gave up.
    fn task_finished(&self, _event: &TaskEvent, _ok: bool) {}
}

/// Live counters of a writer.
#[derive(Debug, Default)]
pub struct WriterStats {
    blocks_written: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    backpressure_waits: AtomicU64,
    ordering_waits: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Point-in-time copy of [`WriterStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct StatsSnapshot {
    /// Blocks appended to the sink.
    pub blocks_written: u64,
    /// Uncompressed bytes of the written blocks.
    pub bytes_in: u64,
    /// Bytes appended to the sink, checksums included.
    pub bytes_out: u64,
    /// Times the caller blocked because the next slot was busy.
    pub backpressure_waits: u64,
    /// Times a worker blocked on its predecessor.
    pub ordering_waits: u64,
    /// Blocks currently marked busy.
    pub in_flight: usize,
    /// Highest number of blocks marked busy at once.
    pub max_in_flight: usize,
}

impl WriterStats {
    pub(crate) fn block_submitted(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.max_in_flight.fetch_max(now, Ordering::Relaxed);
    }

    pub(crate) fn block_retired(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn block_written(&self, bytes_in: usize, bytes_out: usize) {
        self.blocks_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_in.fetch_add(bytes_in as u64, Ordering::Relaxed);
        self.bytes_out.fetch_add(bytes_out as u64, Ordering::Relaxed);
    }

    pub(crate) fn backpressure_wait(&self) {
        self.backpressure_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn ordering_wait(&self) {
        self.ordering_waits.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            blocks_written: self.blocks_written.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            backpressure_waits: self.backpressure_waits.load(Ordering::Relaxed),
            ordering_waits: self.ordering_waits.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            max_in_flight: self.max_in_flight.load(Ordering::Relaxed),
        }
    }
}
