//! Dump command implementation.

use eventspool_core::{Address, RetrievedRecord, SegmentedLogStore, StoreConfig};

/// Bytes of payload shown per record.
const PREVIEW_LEN: usize = 48;

/// Runs the dump command.
pub fn run(
    config: StoreConfig,
    from: Address,
    limit: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = SegmentedLogStore::open(config)?;
    let records = collect(&store, from, limit)?;

    println!("{:<14} {:>10}  preview", "next", "length");
    for record in &records {
        println!(
            "{:<14} {:>10}  {}",
            record.next.to_string(),
            record.payload.len(),
            preview(&record.payload)
        );
    }
    println!();
    println!("{} record(s)", records.len());

    store.close()?;
    Ok(())
}

/// Reads up to `limit` records starting at `from`.
pub fn collect(
    store: &SegmentedLogStore,
    from: Address,
    limit: Option<usize>,
) -> Result<Vec<RetrievedRecord>, Box<dyn std::error::Error>> {
    let limit = limit.unwrap_or(usize::MAX);
    let mut records = Vec::new();
    if limit == 0 {
        return Ok(records);
    }

    let mut next = store.retrieve(from)?;
    while let Some(record) = next {
        records.push(record);
        if records.len() >= limit {
            break;
        }
        next = store.retrieve_next()?;
    }
    Ok(records)
}

fn preview(payload: &[u8]) -> String {
    let shown = &payload[..payload.len().min(PREVIEW_LEN)];
    let mut text: String = String::from_utf8_lossy(shown)
        .chars()
        .map(|c| if c.is_control() { '.' } else { c })
        .collect();
    if payload.len() > PREVIEW_LEN {
        text.push_str("...");
    }
    text
}
