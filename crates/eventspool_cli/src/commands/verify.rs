//! Verify command implementation.

use super::CliError;
use eventspool_core::layout::Layout;
use eventspool_core::{decode_length, Address, StoreConfig, LENGTH_PREFIX_SIZE};
use eventspool_storage::{FileDir, StorageBackend};
use std::path::Path;
use std::sync::Arc;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of segments walked.
    pub segments_checked: usize,
    /// Number of whole records found.
    pub records_checked: usize,
    /// List of problems found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(config: &StoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    let path = config.store_dir();
    println!("Verifying store at {}", path.display());
    println!();

    let result = verify_store(&path)?;
    println!("Segments checked: {}", result.segments_checked);
    println!("Records checked:  {}", result.records_checked);
    for error in &result.errors {
        println!("  - {}", error);
    }

    println!();
    if result.is_ok() {
        println!("✓ Store verification passed");
        Ok(())
    } else {
        println!("✗ Store verification failed");
        Err(CliError::VerifyFailed(result.errors.len()).into())
    }
}

/// Walks every flushed segment above the clean boundary and checks that
/// its frames tile its durable length exactly.
pub fn verify_store(path: &Path) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let layout = Layout::new(Arc::new(FileDir::open(path)?));
    let mut result = VerifyResult::default();

    let Some(flushed_segment) = layout.read_flushed_counter()? else {
        return Ok(result);
    };
    let clean = layout.read_clean()?;
    let flushed_offset = layout.durable_length(flushed_segment)?.unwrap_or(0);
    let Ok(offset) = u32::try_from(flushed_offset) else {
        result.errors.push(format!(
            "segment {flushed_segment}: durable length {flushed_offset} exceeds u32"
        ));
        return Ok(result);
    };
    let flushed = Address::from_u64((u64::from(flushed_segment) << 32) | u64::from(offset));

    if clean > flushed {
        result
            .errors
            .push(format!("clean boundary {clean} is ahead of flushed boundary {flushed}"));
    }

    for segment in clean.segment()..=flushed_segment {
        let length = if segment == flushed_segment {
            flushed_offset
        } else {
            match layout.durable_length(segment)? {
                Some(length) => length,
                None => {
                    result
                        .errors
                        .push(format!("segment {segment}: durable length file missing"));
                    continue;
                }
            }
        };

        let backend = match layout.open_segment(segment) {
            Ok(backend) => backend,
            Err(e) => {
                result.errors.push(format!("segment {segment}: {e}"));
                continue;
            }
        };

        result.segments_checked += 1;
        verify_segment(segment, backend.as_ref(), length, &mut result)?;
    }

    Ok(result)
}

fn verify_segment(
    segment: u32,
    backend: &dyn StorageBackend,
    length: u64,
    result: &mut VerifyResult,
) -> Result<(), Box<dyn std::error::Error>> {
    let size = backend.size()?;
    if size < length {
        result.errors.push(format!(
            "segment {segment}: file holds {size} bytes, durable length is {length}"
        ));
        return Ok(());
    }

    let prefix = LENGTH_PREFIX_SIZE as u64;
    let mut offset = 0u64;
    while offset < length {
        if offset + prefix > length {
            result.errors.push(format!(
                "segment {segment}: partial length prefix at offset {offset}"
            ));
            return Ok(());
        }

        let prefix_bytes = backend.read_at(offset, LENGTH_PREFIX_SIZE)?;
        let Some(record_len) = decode_length(&prefix_bytes) else {
            result.errors.push(format!(
                "segment {segment}: short length prefix at offset {offset}"
            ));
            return Ok(());
        };
        let record_len = u64::from(record_len);

        let end = offset + prefix + record_len;
        if end > length {
            result.errors.push(format!(
                "segment {segment}: record at offset {offset} needs {} bytes, only {} durable",
                prefix + record_len,
                length - offset
            ));
            return Ok(());
        }

        result.records_checked += 1;
        offset = end;
    }

    Ok(())
}
