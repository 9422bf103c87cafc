//! Inspect command implementation.

use eventspool_core::layout::{bookkeeping_file, offset_file, segment_file, Layout, StoreFile};
use eventspool_core::StoreConfig;
use eventspool_storage::{FileDir, StorageDir};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectReport {
    /// Store directory.
    pub path: String,
    /// Flushed segment index, if anything was ever flushed.
    pub flushed_segment: Option<u32>,
    /// Durable length of the flushed segment.
    pub flushed_offset: u64,
    /// Clean boundary as `segment:offset`.
    pub clean: String,
    /// Total bytes in segment files.
    pub total_size: u64,
    /// Per-segment details, ascending.
    pub segments: Vec<SegmentReport>,
}

/// Files and lengths of one segment.
#[derive(Debug, Serialize)]
pub struct SegmentReport {
    /// Segment index.
    pub index: u32,
    /// Size of the segment file, `None` if it is missing.
    pub file_size: Option<u64>,
    /// Length from `<N>-offsetFile`.
    pub durable_length: Option<u64>,
    /// Length from `<N>-bookKeepingOffsetFile`.
    pub provisional_length: Option<u64>,
}

/// Runs the inspect command.
pub fn run(config: &StoreConfig, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let report = collect(&config.store_dir())?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print_text_output(&report);
        }
    }

    Ok(())
}

/// Reads the bookkeeping of the store at `path` without opening it.
pub fn collect(path: &Path) -> Result<InspectReport, Box<dyn std::error::Error>> {
    let dir = FileDir::open(path)?;
    let names = dir.list()?;
    let layout = Layout::new(Arc::new(dir));

    let flushed_segment = layout.read_flushed_counter()?;
    let flushed_offset = match flushed_segment {
        Some(segment) => layout.durable_length(segment)?.unwrap_or(0),
        None => 0,
    };

    let indexes: BTreeSet<u32> = names
        .iter()
        .filter_map(|name| StoreFile::parse(name))
        .filter_map(StoreFile::segment)
        .collect();

    let mut segments = Vec::with_capacity(indexes.len());
    let mut total_size = 0;
    for index in indexes {
        let file_size = match fs::metadata(path.join(segment_file(index))) {
            Ok(meta) => Some(meta.len()),
            Err(_) => None,
        };
        total_size += file_size.unwrap_or(0);
        segments.push(SegmentReport {
            index,
            file_size,
            durable_length: layout.read_length(&offset_file(index))?,
            provisional_length: layout.read_length(&bookkeeping_file(index))?,
        });
    }

    Ok(InspectReport {
        path: path.display().to_string(),
        flushed_segment,
        flushed_offset,
        clean: layout.read_clean()?.to_string(),
        total_size,
        segments,
    })
}

fn print_text_output(report: &InspectReport) {
    println!("EventSpool Store Inspection");
    println!("===========================");
    println!();
    println!("Path: {}", report.path);
    println!();
    println!("Watermarks:");
    match report.flushed_segment {
        Some(segment) => println!("  Flushed: {}:{}", segment, report.flushed_offset),
        None => println!("  Flushed: (nothing flushed)"),
    }
    println!("  Clean:   {}", report.clean);
    println!();
    println!(
        "Segments: {} ({})",
        report.segments.len(),
        format_size(report.total_size)
    );
    for segment in &report.segments {
        println!(
            "  [{}] file={} durable={} provisional={}",
            segment.index,
            show(segment.file_size),
            show(segment.durable_length),
            show(segment.provisional_length),
        );
    }
}

fn show(value: Option<u64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
