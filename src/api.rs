use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use crate::compression::Codec;
use crate::config::WriterConfig;
use crate::error::Result;
use crate::inspector::{BlockInspector, DebugReport};
use crate::writer::ParallelCompressedWriter;

/// One-call entry points.
#[derive(Debug)]
pub struct Parblock;

impl Parblock {
    /// Compresses `data` into a new file at `path`.
    ///
    /// # Arguments
    /// * `path`: Destination file path, truncated if it exists.
    /// * `data`: The bytes to compress.
    pub fn compress_to_file<P: AsRef<Path>>(
        path: P,
        data: &[u8],
        codec: Arc<dyn Codec>,
        config: WriterConfig,
    ) -> Result<()> {
        let file = BufWriter::new(File::create(path.as_ref())?);
        let mut writer = ParallelCompressedWriter::new(file, codec, config)?;
        writer.write_all(data)?;
        let file = writer.finish()?;
        file.into_inner()
            .map_err(|e| e.into_error())?
            .sync_all()?;
        Ok(())
    }

    /// Compresses `data` into memory.
    pub fn compress_to_vec(data: &[u8], codec: Arc<dyn Codec>, config: WriterConfig) -> Result<Vec<u8>> {
        let mut writer = ParallelCompressedWriter::new(Vec::new(), codec, config)?;
        writer.write_all(data)?;
        writer.finish()
    }

    /// Validates a compressed file and describes its blocks.
    pub fn inspect_file<P: AsRef<Path>>(path: P) -> Result<DebugReport> {
        BlockInspector::inspect_file(path)
    }

    /// Validates a compressed buffer and describes its blocks.
    pub fn inspect_bytes(bytes: &[u8]) -> Result<DebugReport> {
        BlockInspector::inspect_bytes(bytes)
    }
}
