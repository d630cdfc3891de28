//! Bounded scan queue between ingestion producers and the scan processor.
//!
//! Producers only ever write scans into the queue; the single consumer owns
//! the processor and the track store.

use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError},
        Arc,
    },
    time::Duration,
};
use tracing::warn;
use tracker_core::Scan;

/// What a producer does when the queue is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Wait for the consumer to make room.
    #[default]
    Block,
    /// Discard the incoming scan and count it.
    DropNewest,
}

/// Producer half. Cloneable so several sources can feed one consumer.
#[derive(Clone, Debug)]
pub struct ScanSender {
    tx: SyncSender<Scan>,
    policy: OverflowPolicy,
    dropped: Arc<AtomicU64>,
}

/// Consumer half.
#[derive(Debug)]
pub struct ScanReceiver {
    rx: Receiver<Scan>,
    dropped: Arc<AtomicU64>,
}

/// Create a queue holding at most `capacity` scans (at least one).
pub fn scan_queue(capacity: usize, policy: OverflowPolicy) -> (ScanSender, ScanReceiver) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        ScanSender {
            tx,
            policy,
            dropped: Arc::clone(&dropped),
        },
        ScanReceiver { rx, dropped },
    )
}

impl ScanSender {
    /// Enqueue a scan. Returns `Ok(false)` when the scan was dropped under
    /// [`OverflowPolicy::DropNewest`].
    pub fn send(&self, scan: Scan) -> Result<bool, IngestError> {
        match self.policy {
            OverflowPolicy::Block => self
                .tx
                .send(scan)
                .map(|_| true)
                .map_err(|_| IngestError::QueueClosed),
            OverflowPolicy::DropNewest => match self.tx.try_send(scan) {
                Ok(()) => Ok(true),
                Err(TrySendError::Full(scan)) => {
                    let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(
                        timestamp = scan.timestamp,
                        measurements = scan.len(),
                        total_dropped = total,
                        "scan queue full, scan dropped"
                    );
                    Ok(false)
                }
                Err(TrySendError::Disconnected(_)) => Err(IngestError::QueueClosed),
            },
        }
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl ScanReceiver {
    /// Wait up to `timeout` for the next scan. `Ok(None)` on timeout,
    /// `Err(QueueClosed)` once every sender is gone and the queue is drained.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Scan>, IngestError> {
        match self.rx.recv_timeout(timeout) {
            Ok(scan) => Ok(Some(scan)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(IngestError::QueueClosed),
        }
    }

    /// Scans discarded by producers so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Cooperative stop signal shared between the consumer and its producers.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(t: f64) -> Scan {
        Scan::new(t, vec![])
    }

    #[test]
    fn drop_newest_counts_losses() {
        let (tx, rx) = scan_queue(2, OverflowPolicy::DropNewest);
        assert!(tx.send(scan(0.0)).unwrap());
        assert!(tx.send(scan(1.0)).unwrap());
        assert!(!tx.send(scan(2.0)).unwrap());
        assert!(!tx.send(scan(3.0)).unwrap());
        assert_eq!(rx.dropped(), 2);

        // the oldest scans survive, in order
        let got: Vec<f64> = std::iter::from_fn(|| rx.recv_timeout(Duration::ZERO).ok().flatten())
            .map(|s| s.timestamp)
            .collect();
        assert_eq!(got, vec![0.0, 1.0]);
    }

    #[test]
    fn block_waits_for_consumer() {
        let (tx, rx) = scan_queue(1, OverflowPolicy::Block);
        let producer = std::thread::spawn(move || {
            for t in 0..5 {
                tx.send(scan(t as f64)).unwrap();
            }
        });
        let mut got = Vec::new();
        while got.len() < 5 {
            if let Some(s) = rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                got.push(s.timestamp);
            }
        }
        producer.join().unwrap();
        assert_eq!(got, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(rx.dropped(), 0);
    }

    #[test]
    fn closed_queue_is_reported() {
        let (tx, rx) = scan_queue(1, OverflowPolicy::Block);
        drop(rx);
        assert!(matches!(tx.send(scan(0.0)), Err(IngestError::QueueClosed)));

        let (tx, rx) = scan_queue(1, OverflowPolicy::Block);
        drop(tx);
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(10)),
            Err(IngestError::QueueClosed)
        ));
    }

    #[test]
    fn cancel_is_shared() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
    }
}
