//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use parblock::{
    BlockError, Codec, CompressedWriter, NoCompression, Result, Task, TaskExecutor,
};

/// Routes the writer's `tracing` output to the test harness.
/// Set `RUST_LOG=parblock=trace` to see slot and ordering events.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Something that happened to a block, identified by its fill byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Compressed(u8),
    Written(u8),
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

pub fn new_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn events(log: &EventLog) -> Vec<Event> {
    log.lock().map(|g| g.clone()).unwrap_or_default()
}

/// Pass-through codec that sleeps on selected blocks, fails on others and logs
/// every compression. Blocks are identified by their first byte.
#[derive(Debug, Default)]
pub struct ScriptedCodec {
    pub slow_tag: Option<(u8, Duration)>,
    pub delay_all: Option<Duration>,
    pub fail_tag: Option<u8>,
    pub log: Option<EventLog>,
}

impl Codec for ScriptedCodec {
    fn method(&self) -> u8 {
        NoCompression.method()
    }

    fn max_payload_size(&self, uncompressed_len: usize) -> usize {
        NoCompression.max_payload_size(uncompressed_len)
    }

    fn compress_payload(&self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        let tag = src.first().copied().unwrap_or_default();
        if let Some((slow, delay)) = self.slow_tag
            && slow == tag
        {
            thread::sleep(delay);
        }
        if let Some(delay) = self.delay_all {
            thread::sleep(delay);
        }
        if self.fail_tag == Some(tag) {
            return Err(BlockError::Compression(format!("scripted failure on block {tag}")));
        }
        let written = NoCompression.compress_payload(src, dst)?;
        if let Some(log) = &self.log {
            log.lock().expect("log").push(Event::Compressed(tag));
        }
        Ok(written)
    }
}

/// Sink shared with the test, so its contents stay visible after the writer is gone.
/// Logs the fill byte of every block it receives.
#[derive(Debug, Clone, Default)]
pub struct SharedSink {
    pub bytes: Arc<Mutex<Vec<u8>>>,
    pub log: Option<EventLog>,
    /// Fail every write once this many bytes have been accepted.
    pub limit: Option<usize>,
}

/// Offset of the payload inside a frame write: the checksum is a separate
/// write call, the block starts with its 9-byte header.
const PAYLOAD_OFFSET: usize = 9;

impl SharedSink {
    pub fn contents(&self) -> Vec<u8> {
        self.bytes.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self.bytes.lock().expect("sink");
        if let Some(limit) = self.limit
            && bytes.len() + buf.len() > limit
        {
            return Err(io::Error::new(io::ErrorKind::StorageFull, "sink full"));
        }
        if buf.len() > PAYLOAD_OFFSET
            && buf.len() != 16
            && let Some(log) = &self.log
        {
            log.lock().expect("log").push(Event::Written(buf[PAYLOAD_OFFSET]));
        }
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Executor refusing every `reject_every`-th task (1 = all), running the rest
/// on Rayon's global pool.
#[derive(Debug)]
pub struct RejectingExecutor {
    pub reject_every: usize,
    pub seen: AtomicUsize,
}

impl RejectingExecutor {
    pub fn new(reject_every: usize) -> Self {
        Self {
            reject_every,
            seen: AtomicUsize::new(0),
        }
    }
}

impl TaskExecutor for RejectingExecutor {
    fn submit(&self, task: Task) -> std::result::Result<(), Task> {
        let n = self.seen.fetch_add(1, Ordering::SeqCst);
        if n % self.reject_every == 0 {
            return Err(task);
        }
        rayon::spawn(task);
        Ok(())
    }
}

/// `count` blocks of `size` bytes, block `i` filled with byte `i + 1`.
pub fn tagged_blocks(count: u8, size: usize) -> Vec<u8> {
    (1..=count).flat_map(|tag| std::iter::repeat_n(tag, size)).collect()
}

/// Varied, compressible input.
pub fn sample_input(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| ((i % 251) as u8).wrapping_add((i / 4096) as u8))
        .collect()
}

/// Output of the single-threaded writer.
pub fn sequential_output(codec: Arc<dyn Codec>, block_size: usize, input: &[u8]) -> Result<Vec<u8>> {
    let mut writer = CompressedWriter::with_block_size(Vec::new(), codec, block_size)?;
    writer.write_all(input)?;
    writer.finish()
}
