//! Datagram source: one flat record per datagram on a connectionless socket.

use crate::{
    batcher::ScanBatcher,
    error::{IngestError, RecordError},
    queue::{CancelToken, ScanSender},
    record::{is_blank, reader_builder, RawRecord, RecordLayout},
    IngestStats,
};
use serde::{Deserialize, Serialize};
use std::{
    io::ErrorKind,
    net::{SocketAddr, UdpSocket},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};
use tracker_core::{Measurement, Scan};

const RECV_BUF_SIZE: usize = 2048;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UdpConfig {
    /// Local bind address
    pub addr: SocketAddr,
    /// Scan grouping window (seconds of measurement time)
    pub window: f64,
    /// Socket read timeout; bounds how long cancellation goes unnoticed
    pub read_timeout: Duration,
    /// Close the open scan after this long without traffic
    pub idle_flush: Duration,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 12345)),
            window: 0.0,
            read_timeout: Duration::from_millis(100),
            idle_flush: Duration::from_millis(500),
        }
    }
}

/// A bound datagram listener. Binding is the only fatal step; everything
/// after it is counted and logged.
#[derive(Debug)]
pub struct UdpListener {
    socket: UdpSocket,
    config: UdpConfig,
}

impl UdpListener {
    pub fn bind(config: UdpConfig) -> Result<Self, IngestError> {
        let bind_err = |source| IngestError::Bind {
            addr: config.addr,
            source,
        };
        let socket = UdpSocket::bind(config.addr).map_err(bind_err)?;
        // A zero timeout would make reads block forever.
        let timeout = config.read_timeout.max(Duration::from_millis(1));
        socket.set_read_timeout(Some(timeout)).map_err(bind_err)?;
        info!(addr = %config.addr, "datagram listener bound");
        Ok(Self { socket, config })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, IngestError> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive until cancelled or until the consumer goes away.
    pub fn run(self, sender: ScanSender, cancel: CancelToken) -> Result<IngestStats, IngestError> {
        let mut stats = IngestStats::default();
        let mut batcher = ScanBatcher::new(self.config.window);
        let mut buf = [0u8; RECV_BUF_SIZE];
        let mut last_rx = Instant::now();

        while !cancel.is_cancelled() {
            match self.socket.recv_from(&mut buf) {
                Ok((n, from)) => {
                    last_rx = Instant::now();
                    let mut records = reader_builder(false).from_reader(&buf[..n]);
                    for record in records.byte_records() {
                        if record.as_ref().is_ok_and(is_blank) {
                            continue;
                        }
                        stats.records += 1;
                        let parsed = record
                            .map_err(|e| RecordError::Unreadable(e.to_string()))
                            .and_then(|r| RawRecord::from_byte_record(&r, &RecordLayout::DATAGRAM))
                            .and_then(Measurement::try_from);
                        match parsed {
                            Ok(m) => {
                                if let Some(scan) = batcher.push(m) {
                                    if !forward(&sender, scan, &mut stats)? {
                                        return Ok(finish(stats, &batcher));
                                    }
                                }
                            }
                            Err(e) => {
                                stats.malformed += 1;
                                warn!(%from, error = %e, "malformed datagram skipped");
                            }
                        }
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    if batcher.has_pending() && last_rx.elapsed() >= self.config.idle_flush {
                        if let Some(scan) = batcher.flush() {
                            debug!(timestamp = scan.timestamp, "idle flush");
                            if !forward(&sender, scan, &mut stats)? {
                                return Ok(finish(stats, &batcher));
                            }
                        }
                    }
                }
                Err(e) => return Err(IngestError::Io(e)),
            }
        }

        if let Some(scan) = batcher.flush() {
            forward(&sender, scan, &mut stats)?;
        }
        Ok(finish(stats, &batcher))
    }

    /// Run the listener on its own thread.
    pub fn spawn(
        self,
        sender: ScanSender,
        cancel: CancelToken,
    ) -> JoinHandle<Result<IngestStats, IngestError>> {
        thread::spawn(move || self.run(sender, cancel))
    }
}

/// Returns `Ok(false)` once the consumer has hung up.
fn forward(sender: &ScanSender, scan: Scan, stats: &mut IngestStats) -> Result<bool, IngestError> {
    match sender.send(scan) {
        Ok(true) => stats.scans += 1,
        Ok(false) => stats.dropped_scans += 1,
        Err(IngestError::QueueClosed) => {
            info!("scan queue closed, listener stopping");
            return Ok(false);
        }
        Err(e) => return Err(e),
    }
    Ok(true)
}

fn finish(mut stats: IngestStats, batcher: &ScanBatcher) -> IngestStats {
    stats.late = batcher.late_records();
    info!(
        records = stats.records,
        malformed = stats.malformed,
        late = stats.late,
        scans = stats.scans,
        dropped = stats.dropped_scans,
        "datagram listener stopped"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{scan_queue, OverflowPolicy};

    fn loopback() -> UdpConfig {
        UdpConfig {
            addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            window: 0.0,
            read_timeout: Duration::from_millis(10),
            idle_flush: Duration::from_millis(50),
        }
    }

    #[test]
    fn second_bind_on_same_port_fails() {
        let first = UdpListener::bind(loopback()).unwrap();
        let taken = first.local_addr().unwrap();
        let err = UdpListener::bind(UdpConfig {
            addr: taken,
            ..loopback()
        })
        .unwrap_err();
        assert!(matches!(err, IngestError::Bind { addr, .. } if addr == taken));
    }

    #[test]
    fn datagrams_become_scans() {
        let listener = UdpListener::bind(loopback()).unwrap();
        let target = listener.local_addr().unwrap();
        let (tx, rx) = scan_queue(8, OverflowPolicy::Block);
        let cancel = CancelToken::new();
        let handle = listener.spawn(tx, cancel.clone());

        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        for payload in [
            "1000,10,1,1.0,0,0,0,0",
            "1100,20,1,1.0,0,0,0,0",
            "not a record",
            "1200,30,1,2.0,0,0,0,0",
        ] {
            client.send_to(payload.as_bytes(), target).unwrap();
        }

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(first.timestamp, 1.0);
        assert_eq!(first.len(), 2);
        // the second scan only closes on the idle flush
        let second = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(second.timestamp, 2.0);

        cancel.cancel();
        let stats = handle.join().unwrap().unwrap();
        assert_eq!(stats.records, 4);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.scans, 2);
    }
}
