use thiserror::Error;

/// Result type for licht operations
pub type Result<T> = std::result::Result<T, LichtError>;

/// Errors that can occur when talking to LIFX devices
#[derive(Error, Debug)]
pub enum LichtError {
    /// A frame failed to decode: short buffer, size mismatch, or a
    /// structurally invalid field
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The decoder encountered a message type it has no payload schema for
    #[error("unsupported message type {0}")]
    UnsupportedMessage(u16),

    /// No matching response arrived before the deadline
    #[error("request timed out")]
    Timeout,

    /// Caller-supplied parameter outside the protocol range, raised before
    /// any network I/O
    #[error("validation error: {0}")]
    Validation(String),

    /// Socket-level failure
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// The backend's receive loop has shut down
    #[error("connection closed")]
    ConnectionClosed,

    /// All 256 sequence numbers are currently in flight
    #[error("no free sequence number")]
    SequenceExhausted,
}
