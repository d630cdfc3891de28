//! `ingest`: Measurement ingestion: flat-record parsing, file and datagram
//! sources, scan batching, and the bounded queue feeding the scan processor.

pub mod batcher;
pub mod error;
pub mod file;
pub mod queue;
pub mod record;
pub mod udp;
pub mod worker;

pub use batcher::ScanBatcher;
pub use error::{IngestError, RecordError};
pub use file::{load_scans, read_scans, spawn_file_producer};
pub use queue::{scan_queue, CancelToken, OverflowPolicy, ScanReceiver, ScanSender};
pub use record::{parse_measurement, RawRecord, RecordLayout};
pub use udp::{UdpConfig, UdpListener};
pub use worker::{run_consumer, ConsumerStats};

use serde::{Deserialize, Serialize};

/// Counters kept by every ingestion source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    /// Records seen, well-formed or not
    pub records: u64,
    /// Records skipped because they failed to parse or validate
    pub malformed: u64,
    /// Measurements dropped for arriving behind the open scan
    pub late: u64,
    /// Scans handed to the queue (or collected)
    pub scans: u64,
    /// Scans lost to a full queue
    pub dropped_scans: u64,
}
