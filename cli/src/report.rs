//! Downstream report files: per-scan detail log, per-track summary, and
//! JSON-lines snapshots.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracker_core::{ScanOutput, TrackId, TrackReport, TrackSnapshot, TrackStatus};

pub const DETAIL_HEADER: [&str; 12] = [
    "track_id",
    "time",
    "status",
    "meas_range",
    "meas_azimuth",
    "meas_elevation",
    "pred_x",
    "pred_y",
    "pred_z",
    "filt_x",
    "filt_y",
    "filt_z",
];

pub const SUMMARY_HEADER: [&str; 16] = [
    "track_id",
    "status",
    "model",
    "age",
    "hits",
    "misses",
    "total_hits",
    "degraded",
    "first_time",
    "last_time",
    "x",
    "y",
    "z",
    "vx",
    "vy",
    "vz",
];

/// One detail-log row: a track's measurement, prediction and estimate for
/// one scan. A coasting scan leaves the measurement columns empty.
#[derive(Serialize)]
struct DetailRecord {
    track_id: u64,
    time: f64,
    status: &'static str,
    meas_range: Option<f64>,
    meas_azimuth: Option<f64>,
    meas_elevation: Option<f64>,
    pred_x: f64,
    pred_y: f64,
    pred_z: f64,
    filt_x: f64,
    filt_y: f64,
    filt_z: f64,
}

#[derive(Serialize)]
struct SummaryRecord {
    track_id: u64,
    status: &'static str,
    model: &'static str,
    age: u32,
    hits: u32,
    misses: u32,
    total_hits: u32,
    degraded: bool,
    first_time: f64,
    last_time: f64,
    x: f64,
    y: f64,
    z: f64,
    vx: f64,
    vy: f64,
    vz: f64,
}

/// Where each report goes; any may be absent.
#[derive(Debug, Default, Clone)]
pub struct ReportPaths {
    pub detail: Option<PathBuf>,
    pub summary: Option<PathBuf>,
    pub snapshots: Option<PathBuf>,
}

/// Last known state of a track, kept after deletion for the summary.
#[derive(Debug, Clone)]
struct SummaryRow {
    report: TrackReport,
    status: TrackStatus,
}

pub struct ReportWriter {
    detail: Option<csv::Writer<File>>,
    snapshots: Option<Box<dyn Write>>,
    summary_path: Option<PathBuf>,
    rows: BTreeMap<TrackId, SummaryRow>,
    scans: u64,
}

/// Headers are written explicitly so an empty report still has one.
fn csv_writer(path: &Path) -> Result<csv::Writer<File>> {
    WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))
}

fn create(path: &Path) -> Result<Box<dyn Write>> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    Ok(Box::new(BufWriter::new(file)))
}

impl ReportWriter {
    pub fn create(paths: &ReportPaths) -> Result<Self> {
        let detail = match &paths.detail {
            Some(p) => {
                let mut w = csv_writer(p)?;
                w.write_record(DETAIL_HEADER)?;
                Some(w)
            }
            None => None,
        };
        let snapshots = paths.snapshots.as_deref().map(create).transpose()?;
        Ok(Self::from_writers(detail, snapshots, paths.summary.clone()))
    }

    fn from_writers(
        detail: Option<csv::Writer<File>>,
        snapshots: Option<Box<dyn Write>>,
        summary_path: Option<PathBuf>,
    ) -> Self {
        Self {
            detail,
            snapshots,
            summary_path,
            rows: BTreeMap::new(),
            scans: 0,
        }
    }

    /// Append one scan's output to every open report.
    pub fn record(&mut self, out: &ScanOutput) -> Result<()> {
        self.scans += 1;
        if let Some(w) = self.detail.as_mut() {
            write_detail(w, &out.snapshot)?;
            w.flush()?;
        }
        if let Some(w) = self.snapshots.as_mut() {
            serde_json::to_writer(&mut *w, &out.snapshot)?;
            writeln!(w)?;
            w.flush()?;
        }
        for report in &out.snapshot.tracks {
            self.rows.insert(
                report.id,
                SummaryRow {
                    report: report.clone(),
                    status: report.status,
                },
            );
        }
        for id in &out.deleted {
            if let Some(row) = self.rows.get_mut(id) {
                row.status = TrackStatus::Deleted;
            }
        }
        Ok(())
    }

    pub fn scans(&self) -> u64 {
        self.scans
    }

    /// Tracks that were ever reported, with how many reached confirmation.
    pub fn track_counts(&self) -> (usize, usize) {
        let confirmed = self.rows.values().filter(|r| r.report.confirmed_once).count();
        (self.rows.len(), confirmed)
    }

    /// Write the summary (if requested) and flush everything.
    pub fn finish(mut self) -> Result<()> {
        if let Some(path) = self.summary_path.take() {
            let mut w = csv_writer(&path)?;
            write_summary(&mut w, &self.rows)?;
            w.flush()?;
        }
        if let Some(w) = self.detail.as_mut() {
            w.flush()?;
        }
        if let Some(w) = self.snapshots.as_mut() {
            w.flush()?;
        }
        Ok(())
    }
}

/// One row per track that has a history entry for this scan.
fn write_detail<W: Write>(w: &mut csv::Writer<W>, snapshot: &TrackSnapshot) -> Result<()> {
    for report in &snapshot.tracks {
        let Some(entry) = report.last.as_ref().filter(|e| e.timestamp == snapshot.time) else {
            continue;
        };
        let m = entry.measurement.as_ref();
        let [pred_x, pred_y, pred_z] = entry.predicted.position();
        let [filt_x, filt_y, filt_z] = entry.filtered.position();
        w.serialize(DetailRecord {
            track_id: report.id.0,
            time: entry.timestamp,
            status: report.status.label(),
            meas_range: m.map(|m| m.range()),
            meas_azimuth: m.map(|m| m.azimuth()),
            meas_elevation: m.map(|m| m.elevation()),
            pred_x,
            pred_y,
            pred_z,
            filt_x,
            filt_y,
            filt_z,
        })?;
    }
    Ok(())
}

fn write_summary<W: Write>(
    w: &mut csv::Writer<W>,
    rows: &BTreeMap<TrackId, SummaryRow>,
) -> Result<()> {
    w.write_record(SUMMARY_HEADER)?;
    for row in rows.values() {
        let t = &row.report;
        let [x, y, z] = t.estimate.position();
        let [vx, vy, vz] = t.estimate.velocity();
        w.serialize(SummaryRecord {
            track_id: t.id.0,
            status: row.status.label(),
            model: t.model.label(),
            age: t.age,
            hits: t.hits,
            misses: t.misses,
            total_hits: t.total_hits,
            degraded: t.degraded,
            first_time: t.born_at,
            last_time: t.last_time,
            x,
            y,
            z,
            vx,
            vy,
            vz,
        })?;
    }
    Ok(())
}

/// Read back a JSON-lines snapshot file.
pub fn read_snapshots(path: &Path) -> Result<Vec<TrackSnapshot>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .enumerate()
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("snapshot line {}", i + 1))
        })
        .collect()
}
