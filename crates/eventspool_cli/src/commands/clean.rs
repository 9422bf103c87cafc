//! Clean command implementation.

use eventspool_core::{Address, SegmentedLogStore, StoreConfig};
use tracing::info;

/// What a clean changed.
#[derive(Debug)]
pub struct CleanReport {
    /// Boundary asked for on the command line.
    pub requested: Address,
    /// Clean boundary before the command.
    pub before: Address,
    /// Clean boundary after clamping.
    pub after: Address,
    /// Flushed boundary the request was clamped to.
    pub flushed: Address,
    /// Number of segment files deleted.
    pub segments_deleted: u32,
}

/// Runs the clean command.
pub fn run(config: StoreConfig, to: Address) -> Result<(), Box<dyn std::error::Error>> {
    let report = clean_store(config, to)?;

    println!("Requested:      {}", report.requested);
    println!("Clean boundary: {} -> {}", report.before, report.after);
    println!("Segments deleted: {}", report.segments_deleted);
    if report.after < report.requested {
        println!("(clamped to the flushed boundary {})", report.flushed);
    }
    Ok(())
}

/// Opens the store, cleans up to `to` and closes it again.
pub fn clean_store(
    config: StoreConfig,
    to: Address,
) -> Result<CleanReport, Box<dyn std::error::Error>> {
    let store = SegmentedLogStore::open(config)?;
    let before = store.state();

    store.clean(to)?;
    let after = store.state();
    store.close()?;

    if after.clean != before.clean {
        info!(from = %before.clean, to = %after.clean, "clean boundary advanced");
    }
    Ok(CleanReport {
        requested: to,
        before: before.clean,
        after: after.clean,
        flushed: after.flushed,
        segments_deleted: after.cleaned_segment - before.cleaned_segment,
    })
}
