#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use common::{sample_input, sequential_output};
use parblock::{BlockError, CompressedWriter, NoCompression, Parblock, WriterConfig};

fn config() -> parblock::Result<WriterConfig> {
    WriterConfig::builder().block_size(4096).num_threads(4).build()
}

// --- TESTS ---

/// Standard File IO
/// Validate `Parblock::compress_to_file`, `Parblock::inspect_file`
#[test]
#[cfg(not(target_arch = "wasm32"))]
fn test_standard_file_io() -> parblock::Result<()> {
    let dir = tempfile::tempdir()?;
    let file_path = dir.path().join("std_io.blk");
    let data = sample_input(100_000);

    Parblock::compress_to_file(&file_path, &data, Arc::new(NoCompression), config()?)?;

    let report = Parblock::inspect_file(&file_path)?;
    assert_eq!(report.block_count(), 25);
    assert_eq!(report.total_decompressed, data.len() as u64);
    assert_eq!(report.stream_size, std::fs::metadata(&file_path)?.len());
    assert!(report.blocks.iter().all(|b| b.method == "none"));

    let on_disk = std::fs::read(&file_path)?;
    assert_eq!(on_disk, sequential_output(Arc::new(NoCompression), 4096, &data)?);
    Ok(())
}

/// Pure Memory IO
/// Validate `Parblock::compress_to_vec`, `Parblock::inspect_bytes`
#[test]
fn test_memory_io() -> parblock::Result<()> {
    let data = sample_input(10_001);
    let bytes = Parblock::compress_to_vec(&data, Arc::new(NoCompression), config()?)?;

    let report = Parblock::inspect_bytes(&bytes)?;
    assert_eq!(report.block_count(), 3);
    let sizes: Vec<u32> = report.blocks.iter().map(|b| b.decompressed_size).collect();
    assert_eq!(sizes, vec![4096, 4096, 1809]);
    assert_eq!(report.blocks[1].offset, 16 + 9 + 4096);
    Ok(())
}

#[test]
#[cfg(feature = "lz4_flex")]
fn test_lz4_stream_matches_sequential() -> parblock::Result<()> {
    let data = sample_input(200_000);
    let codec = Arc::new(parblock::Lz4Codec);
    let bytes = Parblock::compress_to_vec(&data, codec.clone(), config()?)?;

    assert_eq!(bytes, sequential_output(codec, 4096, &data)?);
    let report = Parblock::inspect_bytes(&bytes)?;
    assert!(report.blocks.iter().all(|b| b.method == "lz4"));
    assert!((report.stream_size as usize) < data.len());
    Ok(())
}

#[test]
fn test_empty_input_produces_empty_stream() -> parblock::Result<()> {
    let bytes = Parblock::compress_to_vec(&[], Arc::new(NoCompression), config()?)?;
    assert!(bytes.is_empty());
    assert_eq!(Parblock::inspect_bytes(&bytes)?.block_count(), 0);

    let dir = tempfile::tempdir()?;
    let file_path = dir.path().join("empty.blk");
    Parblock::compress_to_file(&file_path, &[], Arc::new(NoCompression), config()?)?;
    assert_eq!(Parblock::inspect_file(&file_path)?.block_count(), 0);
    Ok(())
}

#[test]
fn test_inspector_detects_corruption() -> parblock::Result<()> {
    let data = sample_input(9_000);
    let mut bytes = Parblock::compress_to_vec(&data, Arc::new(NoCompression), config()?)?;

    // Payload byte of the second block.
    let target = 2 * (16 + 9) + 4096 + 100;
    bytes[target] ^= 0xFF;
    assert!(matches!(Parblock::inspect_bytes(&bytes), Err(BlockError::Format(_))));

    bytes[target] ^= 0xFF;
    bytes.truncate(bytes.len() - 1);
    assert!(matches!(Parblock::inspect_bytes(&bytes), Err(BlockError::Format(_))));
    Ok(())
}

#[test]
fn test_sequential_writer_counts_blocks() -> parblock::Result<()> {
    use std::io::Write;

    let mut writer = CompressedWriter::with_block_size(Vec::new(), Arc::new(NoCompression), 100)?;
    writer.write_all(&sample_input(250))?;
    assert_eq!(writer.blocks_written(), 2);
    writer.flush_block()?;
    writer.flush_block()?;
    assert_eq!(writer.blocks_written(), 3);

    let bytes = writer.finish()?;
    assert_eq!(bytes.len(), 3 * (16 + 9) + 250);
    Ok(())
}

#[test]
fn test_stats_account_for_every_block() -> parblock::Result<()> {
    use std::io::Write;

    let config = WriterConfig::builder().block_size(512).num_threads(3).build()?;
    let mut writer =
        parblock::ParallelCompressedWriter::new(Vec::new(), Arc::new(NoCompression), config)?;
    writer.write_all(&sample_input(512 * 20))?;
    writer.sync()?;

    let stats = writer.stats();
    assert_eq!(stats.blocks_written, 20);
    assert_eq!(stats.bytes_in, 512 * 20);
    assert_eq!(stats.bytes_out, 20 * (16 + 9 + 512));
    assert_eq!(stats.in_flight, 0);
    assert!(stats.max_in_flight >= 1 && stats.max_in_flight <= 3);

    drop(writer.finish()?);
    Ok(())
}
