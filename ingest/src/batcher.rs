//! Groups a time-ordered stream of measurements into scans.

use tracker_core::{Measurement, Scan};
use tracing::warn;

/// Scan grouping by timestamp window.
///
/// A scan opens with its first measurement and takes that measurement's
/// timestamp as its own. Later measurements join while they lie within
/// `window` seconds of that start; the first one beyond it closes the scan
/// and opens the next. A measurement earlier than the open scan's start
/// cannot be placed without reordering already-emitted scans, so it is
/// dropped and counted as late.
#[derive(Debug)]
pub struct ScanBatcher {
    window: f64,
    start: Option<f64>,
    pending: Vec<Measurement>,
    late: u64,
}

impl ScanBatcher {
    /// `window = 0` groups only identical timestamps.
    pub fn new(window: f64) -> Self {
        Self {
            window: window.max(0.0),
            start: None,
            pending: Vec::new(),
            late: 0,
        }
    }

    /// Add one measurement; returns the scan it closed, if any.
    pub fn push(&mut self, m: Measurement) -> Option<Scan> {
        let t = m.timestamp();
        let Some(start) = self.start else {
            self.start = Some(t);
            self.pending.push(m);
            return None;
        };

        if t < start {
            self.late += 1;
            warn!(timestamp = t, scan_start = start, "late measurement dropped");
            return None;
        }
        if t - start <= self.window {
            self.pending.push(m);
            return None;
        }

        let closed = Scan::new(start, std::mem::take(&mut self.pending));
        self.start = Some(t);
        self.pending.push(m);
        Some(closed)
    }

    /// Close the open scan, if it holds anything. The start time is kept so
    /// that later arrivals older than it are still rejected.
    pub fn flush(&mut self) -> Option<Scan> {
        let start = self.start?;
        if self.pending.is_empty() {
            return None;
        }
        Some(Scan::new(start, std::mem::take(&mut self.pending)))
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Measurements dropped because they arrived behind the open scan.
    pub fn late_records(&self) -> u64 {
        self.late
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(t: f64) -> Measurement {
        Measurement::new(1000.0, 0.0, 0.0, t, None)
    }

    #[test]
    fn groups_identical_timestamps() {
        let mut b = ScanBatcher::new(0.0);
        assert!(b.push(m(1.0)).is_none());
        assert!(b.push(m(1.0)).is_none());
        let scan = b.push(m(2.0)).unwrap();
        assert_eq!(scan.timestamp, 1.0);
        assert_eq!(scan.len(), 2);
        let last = b.flush().unwrap();
        assert_eq!(last.timestamp, 2.0);
        assert_eq!(last.len(), 1);
        assert!(b.flush().is_none());
    }

    #[test]
    fn window_spans_nearby_timestamps() {
        let mut b = ScanBatcher::new(0.5);
        for t in [10.0, 10.2, 10.5] {
            assert!(b.push(m(t)).is_none());
        }
        let scan = b.push(m(10.6)).unwrap();
        assert_eq!(scan.timestamp, 10.0);
        assert_eq!(scan.len(), 3);
    }

    #[test]
    fn late_measurements_are_counted() {
        let mut b = ScanBatcher::new(0.0);
        b.push(m(5.0));
        b.push(m(6.0));
        assert!(b.push(m(5.5)).is_none());
        assert_eq!(b.late_records(), 1);

        // still late after a flush
        b.flush();
        b.push(m(4.0));
        assert_eq!(b.late_records(), 2);
        assert!(!b.has_pending());
    }
}
