//! Replay: serialize/deserialize simulation logs and export measurement records.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracker_core::Scan;

/// A full recorded simulation log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplayLog {
    pub scenario_name: String,
    pub seed: u64,
    pub scan_period: f64,
    /// All scans in chronological order
    pub scans: Vec<Scan>,
    /// Ground-truth target states at each scan time
    pub ground_truth: Vec<GroundTruthFrame>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroundTruthFrame {
    pub time: f64,
    pub targets: Vec<TargetState>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetState {
    pub id: u64,
    pub state: [f64; 6],
}

/// Save a replay log to a JSON file.
pub fn save_replay(log: &ReplayLog, path: &Path) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, log)?;
    Ok(())
}

/// Load a replay log from a JSON file.
pub fn load_replay(path: &Path) -> anyhow::Result<ReplayLog> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let log: ReplayLog = serde_json::from_reader(reader)?;
    Ok(log)
}

/// One exported measurement, in datagram column order.
#[derive(Serialize)]
struct RecordRow {
    range: f64,
    azimuth: f64,
    elevation: f64,
    timestamp: f64,
    auxiliary: Option<f64>,
    x: f64,
    y: f64,
    z: f64,
}

/// Write every measurement as a datagram-layout record:
/// `range,azimuth,elevation,timestamp,auxiliary,x,y,z`, no header row.
pub fn write_records<W: Write>(scans: &[Scan], out: W) -> anyhow::Result<()> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(out);
    for m in scans.iter().flat_map(|s| &s.measurements) {
        let c = m.cartesian();
        wtr.serialize(RecordRow {
            range: m.range(),
            azimuth: m.azimuth(),
            elevation: m.elevation(),
            timestamp: m.timestamp(),
            auxiliary: m.auxiliary(),
            x: c.x,
            y: c.y,
            z: c.z,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracker_core::Measurement;

    #[test]
    fn records_use_datagram_layout() {
        let scans = vec![Scan::new(
            2.5,
            vec![
                Measurement::new(1000.0, 90.0, 0.0, 2.5, Some(-4.0)),
                Measurement::new(2000.0, 0.0, 0.0, 2.5, None),
            ],
        )];
        let mut buf = Vec::new();
        write_records(&scans, &mut buf).unwrap();

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(buf.as_slice());
        let rows: Vec<csv::StringRecord> = rdr.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.len() == 8));
        let num = |r: &csv::StringRecord, i: usize| r[i].parse::<f64>().unwrap();
        assert_eq!(
            (0..5).map(|i| num(&rows[0], i)).collect::<Vec<_>>(),
            vec![1000.0, 90.0, 0.0, 2.5, -4.0]
        );
        assert_eq!(num(&rows[1], 0), 2000.0);
        assert_eq!(&rows[1][4], "");
        // x east: azimuth 90 puts the whole range on x
        assert!((num(&rows[0], 5) - 1000.0).abs() < 1e-9);
    }
}
