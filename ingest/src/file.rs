//! Bulk load of a tabular measurement file.

use crate::{
    batcher::ScanBatcher,
    error::IngestError,
    queue::ScanSender,
    record::{is_blank, reader_builder, RawRecord, RecordLayout},
    IngestStats,
};
use csv::ByteRecord;
use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    thread::{self, JoinHandle},
};
use tracing::{info, warn};
use tracker_core::{Measurement, Scan};

/// Read every record from `reader` and group them into scans.
///
/// The whole file is available up front, so records are put in time order
/// (stable, file order within equal timestamps) before batching and none
/// are lost as late. A record that cannot be decoded is counted as
/// malformed; only a failing reader aborts the load.
pub fn read_scans<R: Read>(
    reader: R,
    layout: &RecordLayout,
    window: f64,
) -> Result<(Vec<Scan>, IngestStats), IngestError> {
    let mut stats = IngestStats::default();
    let mut measurements: Vec<Measurement> = Vec::new();

    let mut reader = reader_builder(layout.has_header).from_reader(reader);
    let mut record = ByteRecord::new();
    while reader.read_byte_record(&mut record)? {
        if is_blank(&record) {
            continue;
        }
        stats.records += 1;
        match RawRecord::from_byte_record(&record, layout).and_then(Measurement::try_from) {
            Ok(m) => measurements.push(m),
            Err(e) => {
                stats.malformed += 1;
                let line = record.position().map_or(0, |p| p.line());
                warn!(line, error = %e, "malformed record skipped");
            }
        }
    }

    measurements.sort_by(|a, b| a.timestamp().total_cmp(&b.timestamp()));

    let mut batcher = ScanBatcher::new(window);
    let mut scans: Vec<Scan> = measurements
        .into_iter()
        .filter_map(|m| batcher.push(m))
        .collect();
    scans.extend(batcher.flush());
    stats.late = batcher.late_records();
    stats.scans = scans.len() as u64;
    Ok((scans, stats))
}

/// Open and read a measurement file.
pub fn load_scans(
    path: &Path,
    layout: &RecordLayout,
    window: f64,
) -> Result<(Vec<Scan>, IngestStats), IngestError> {
    let file = File::open(path).map_err(|source| IngestError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let (scans, stats) = read_scans(file, layout, window)?;
    info!(
        path = %path.display(),
        records = stats.records,
        malformed = stats.malformed,
        scans = stats.scans,
        "file loaded"
    );
    Ok((scans, stats))
}

/// Load `path` on a background thread and feed its scans into the queue.
/// The sender is dropped when the file is exhausted, which closes the queue
/// for a consumer fed only by this producer.
pub fn spawn_file_producer(
    path: PathBuf,
    layout: RecordLayout,
    window: f64,
    sender: ScanSender,
) -> JoinHandle<Result<IngestStats, IngestError>> {
    thread::spawn(move || {
        let (scans, mut stats) = load_scans(&path, &layout, window)?;
        stats.scans = 0;
        for scan in scans {
            if sender.send(scan)? {
                stats.scans += 1;
            } else {
                stats.dropped_scans += 1;
            }
        }
        Ok(stats)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn skips_header_and_malformed_rows() {
        let text = "\
range,azimuth,elevation,time,aux
1000,10,1,0.0,
1200,20,1,0.0,
garbage
1100,10,1,1.0,
,,,,

1300,20,1,1.0,5
";
        let layout = RecordLayout {
            has_header: true,
            ..RecordLayout::DATAGRAM
        };
        let (scans, stats) = read_scans(Cursor::new(text), &layout, 0.0).unwrap();
        assert_eq!(stats.records, 6);
        assert_eq!(stats.malformed, 2);
        assert_eq!(stats.late, 0);
        assert_eq!(scans.len(), 2);
        assert_eq!(scans[0].len(), 2);
        assert_eq!(scans[1].timestamp, 1.0);
        assert_eq!(scans[1].measurements[1].auxiliary(), Some(5.0));
    }

    #[test]
    fn unordered_rows_are_sorted_before_batching() {
        let text = "3000,0,0,2.0\n1000,0,0,0.0\n2000,0,0,1.0\n1500,0,0,0.0\n";
        let (scans, stats) = read_scans(Cursor::new(text), &RecordLayout::DATAGRAM, 0.0).unwrap();
        let times: Vec<f64> = scans.iter().map(|s| s.timestamp).collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0]);
        assert_eq!(scans[0].measurements[0].range(), 1000.0);
        assert_eq!(stats.scans, 3);
    }

    #[test]
    fn undecodable_row_is_counted_not_fatal() {
        let mut bytes = b"1000,10,1,0.0\n".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, b',', b'1', b'\n']);
        bytes.extend_from_slice(b"\xc3\x28,10,1,0.5\n");
        bytes.extend_from_slice(b"1100,10,1,1.0\n");
        let (scans, stats) =
            read_scans(Cursor::new(bytes), &RecordLayout::DATAGRAM, 0.0).unwrap();
        assert_eq!(stats.records, 4);
        assert_eq!(stats.malformed, 2);
        assert_eq!(scans.len(), 2);
        assert_eq!(scans[1].measurements[0].range(), 1100.0);
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let err = load_scans(
            Path::new("/nonexistent/measurements.csv"),
            &RecordLayout::TABULAR,
            0.0,
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::Open { .. }));
    }
}
