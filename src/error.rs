//! Error handling for the heat pump communication service
//!
//! The taxonomy separates framing errors (never retried), transient transport
//! errors (retried by the protocol client with a reconnect), and terminal
//! failures surfaced to the poll loop.

use thiserror::Error;

/// Heat pump service error type
#[derive(Error, Debug, Clone)]
pub enum HeatSrvError {
    /// Response header shorter than the fixed 8-byte frame header, or the
    /// element count is implausible. Fatal to the current read.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// Response body shorter than the element count announced in the header.
    /// Fatal to the current read.
    #[error("truncated body: expected {expected} bytes, got {actual}")]
    TruncatedBody { expected: usize, actual: usize },

    /// Could not open or use the TCP connection to the controller.
    #[error("connection unavailable: {0}")]
    ConnectionUnavailable(String),

    /// The controller echoed a different command code than the one sent.
    /// The channel is desynchronized and must be reconnected.
    #[error("echo mismatch: sent {sent}, received {received}")]
    EchoMismatch { sent: i32, received: i32 },

    /// A bounded read deadline elapsed before the expected bytes arrived.
    #[error("read timeout: {0}")]
    ReadTimeout(String),

    /// All retry attempts were exhausted; the connection is left closed.
    #[error("protocol failure after {attempts} attempts: {last}")]
    ProtocolFailure { attempts: u32, last: String },

    /// A write command's echoed (index, value) did not match what was sent.
    #[error("write not acknowledged: sent ({index}, {value}), echoed {echoed}")]
    WriteNotAcknowledged {
        index: i32,
        value: i32,
        echoed: String,
    },

    /// A poll cycle failed to produce a snapshot; the previous snapshot
    /// remains authoritative.
    #[error("snapshot unavailable: {0}")]
    SnapshotUnavailable(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Validation errors (e.g. a write value outside the permitted set)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Internal errors (channel closed, shutdown races)
    #[error("internal error: {0}")]
    InternalError(String),
}

/// Result type alias for the heat pump service
pub type Result<T> = std::result::Result<T, HeatSrvError>;

impl HeatSrvError {
    pub fn connection(msg: impl Into<String>) -> Self {
        HeatSrvError::ConnectionUnavailable(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        HeatSrvError::ConfigError(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        HeatSrvError::ValidationError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        HeatSrvError::InternalError(msg.into())
    }

    /// Transient transport errors are retried by the protocol client after
    /// a reconnect. Framing errors and write rejections are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HeatSrvError::ConnectionUnavailable(_)
                | HeatSrvError::EchoMismatch { .. }
                | HeatSrvError::ReadTimeout(_)
        )
    }
}

impl From<std::io::Error> for HeatSrvError {
    fn from(err: std::io::Error) -> Self {
        HeatSrvError::ConnectionUnavailable(err.to_string())
    }
}

impl From<figment::Error> for HeatSrvError {
    fn from(err: figment::Error) -> Self {
        HeatSrvError::ConfigError(err.to_string())
    }
}
