//! The consumer loop: the only place scans meet the track store.

use crate::{
    error::IngestError,
    queue::{CancelToken, ScanReceiver},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use tracker_core::{ScanError, ScanOutput, ScanProcessor, TrackStore};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerStats {
    /// Scans committed to the store
    pub processed: u64,
    /// Scans rejected as older than the last processed one
    pub out_of_order: u64,
    /// Scans rejected for any other reason (e.g. a non-finite timestamp)
    pub rejected: u64,
}

/// Dequeue scans in arrival order and run each through `processor`.
///
/// Cancellation is checked between scans only, so every scan is either fully
/// committed or never started. Per-scan errors are logged and counted and
/// processing continues. Returns when cancelled or when every producer has
/// hung up and the queue is drained.
pub fn run_consumer<F>(
    receiver: &ScanReceiver,
    processor: &mut ScanProcessor,
    store: &mut TrackStore,
    cancel: &CancelToken,
    mut sink: F,
) -> ConsumerStats
where
    F: FnMut(&ScanOutput),
{
    let mut stats = ConsumerStats::default();

    while !cancel.is_cancelled() {
        let scan = match receiver.recv_timeout(POLL_INTERVAL) {
            Ok(Some(scan)) => scan,
            Ok(None) => continue,
            Err(IngestError::QueueClosed) => {
                debug!("all producers finished");
                break;
            }
            Err(e) => {
                warn!(error = %e, "scan queue failure");
                break;
            }
        };

        match processor.process_scan(store, &scan) {
            Ok(output) => {
                stats.processed += 1;
                sink(&output);
            }
            Err(e @ ScanError::OutOfOrderScan { .. }) => {
                stats.out_of_order += 1;
                warn!(error = %e, "scan skipped");
            }
            Err(e) => {
                stats.rejected += 1;
                warn!(error = %e, "scan skipped");
            }
        }
    }

    info!(
        processed = stats.processed,
        out_of_order = stats.out_of_order,
        rejected = stats.rejected,
        dropped_upstream = receiver.dropped(),
        tracks = store.len(),
        "consumer stopped"
    );
    stats
}
