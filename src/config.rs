//! Writer configuration.

use std::time::Duration;

use crate::compression::Codec;
use crate::constants::DEFAULT_BLOCK_SIZE;
use crate::error::{BlockError, Result};

/// What the writer does when the thread pool refuses a compression task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RejectPolicy {
    /// Run the task synchronously on the caller's thread.
    #[default]
    RunInline,
    /// Treat the rejection as fatal and poison the writer.
    Fail,
}

/// Configuration of a [`ParallelCompressedWriter`](crate::ParallelCompressedWriter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterConfig {
    /// Capacity of a slot's staging area; the uncompressed size of every full block.
    pub block_size: usize,
    /// Maximum number of slots, which bounds the number of blocks in flight.
    pub num_threads: usize,
    /// Behavior on thread pool rejection.
    pub reject_policy: RejectPolicy,
    /// Upper bound for ordering and backpressure waits. `None` waits forever.
    pub wait_timeout: Option<Duration>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            num_threads: rayon::current_num_threads().max(1),
            reject_policy: RejectPolicy::default(),
            wait_timeout: None,
        }
    }
}

impl WriterConfig {
    /// Starts a builder from the defaults.
    pub fn builder() -> WriterConfigBuilder {
        WriterConfigBuilder {
            config: Self::default(),
        }
    }

    /// Checks the configuration on its own.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(BlockError::Config("block_size must be at least 1".into()));
        }
        if self.num_threads == 0 {
            return Err(BlockError::Config("num_threads must be at least 1".into()));
        }
        if self.wait_timeout == Some(Duration::ZERO) {
            return Err(BlockError::Config("wait_timeout must be non-zero".into()));
        }
        Ok(())
    }

    /// Checks the configuration against the codec that will compress the blocks.
    ///
    /// A full block's reserve size has to be addressable by the 32-bit header fields.
    pub fn validate_for(&self, codec: &dyn Codec) -> Result<()> {
        self.validate()?;
        let reserve = codec.reserve_size(self.block_size);
        if u32::try_from(reserve).is_err() {
            return Err(BlockError::Config(format!(
                "block_size {} needs {} reserved bytes with codec {}, over the 32-bit limit",
                self.block_size,
                reserve,
                codec.name()
            )));
        }
        Ok(())
    }
}

/// Builder for [`WriterConfig`].
#[derive(Debug, Clone)]
pub struct WriterConfigBuilder {
    config: WriterConfig,
}

impl WriterConfigBuilder {
    /// Sets the block size in bytes.
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.config.block_size = block_size;
        self
    }

    /// Sets the maximum number of blocks in flight.
    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.config.num_threads = num_threads;
        self
    }

    /// Sets the rejection policy.
    pub fn reject_policy(mut self, policy: RejectPolicy) -> Self {
        self.config.reject_policy = policy;
        self
    }

    /// Bounds ordering and backpressure waits.
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.wait_timeout = Some(timeout);
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<WriterConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
