//! Error types for measurement ingestion.

use std::{io, net::SocketAddr, path::PathBuf};
use thiserror::Error;

/// A single flat record could not be turned into a measurement.
///
/// Always local to one record: the caller skips it and keeps going.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("record has {found} fields, need at least {needed}")]
    MissingField { needed: usize, found: usize },

    #[error("field {index} ({name}) is not a number: {value:?}")]
    NotANumber {
        index: usize,
        name: &'static str,
        value: String,
    },

    #[error("field {name} is not finite: {value}")]
    NonFinite { name: &'static str, value: f64 },

    #[error("negative range {0}")]
    NegativeRange(f64),

    #[error("record is not valid UTF-8")]
    Encoding,

    #[error("record could not be split: {0}")]
    Unreadable(String),
}

/// Transport-level failures. These are fatal for the source that raised them.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("cannot bind datagram socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("cannot read {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("read failed: {0}")]
    Io(#[from] io::Error),

    #[error("record stream failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("scan queue is closed")]
    QueueClosed,
}
