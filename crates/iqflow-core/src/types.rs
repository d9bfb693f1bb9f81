//! Core types shared across the iqflow crates.
//!
//! The streaming graph runs on 32-bit float I/Q samples: the in-phase
//! component in the real part, quadrature in the imaginary part. Hardware
//! delivers fixed-point batches; the conversion unit normalizes them to
//! this format before anything downstream sees them.

use num_complex::Complex32;

/// A single I/Q sample point (float32 I, float32 Q).
pub type IQSample = Complex32;

/// A buffer of I/Q samples.
pub type IQBuffer = Vec<IQSample>;

/// Result type for device and session operations.
pub type SdrResult<T> = Result<T, SdrError>;

/// Errors surfaced by device control and streaming sessions.
///
/// `Unsupported` is a distinguished outcome: callers that probe optional
/// hardware features downgrade it to a warning instead of failing.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SdrError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Hardware error: {0}")]
    HardwareError(String),

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Timeout waiting for {0}")]
    Timeout(String),

    #[error("Device not started")]
    NotStarted,

    #[error("Device already running")]
    AlreadyRunning,

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// Result type for sample-domain operations.
pub type DspResult<T> = Result<T, DspError>;

/// Contract violations in the conversion and routing units.
///
/// These are caller bugs, not runtime conditions: buffer sizes and port
/// counts are fixed when a session starts, so a mismatch here means the
/// adapter wired its scratch buffers wrong. They fail fast rather than
/// truncate silently.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DspError {
    #[error("buffer length mismatch: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("output port count mismatch: expected {expected}, got {got}")]
    PortCountMismatch { expected: usize, got: usize },
}

impl From<DspError> for SdrError {
    fn from(e: DspError) -> Self {
        SdrError::StreamError(e.to_string())
    }
}
