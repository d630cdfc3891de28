//! Error types for the tracking core.

use thiserror::Error;

/// Numerical and configuration failures raised by the filter and gate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackerError {
    /// S = H·P·Hᵀ + R could not be inverted to working precision.
    #[error("innovation covariance is singular")]
    SingularInnovationCovariance,

    /// A vector or matrix did not match the motion model's state dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Per-scan errors surfaced to the caller of the scan processor.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScanError {
    /// The scan is older than the last processed scan; nothing was changed.
    #[error("out-of-order scan at t={scan_time} (last processed t={last_time})")]
    OutOfOrderScan { scan_time: f64, last_time: f64 },

    /// The scan timestamp is NaN or infinite.
    #[error("scan timestamp {0} is not finite")]
    InvalidTimestamp(f64),
}
