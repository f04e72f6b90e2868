//! Error types for the pose pipeline

use std::fmt;

use thiserror::Error;

/// Core posesync errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoseError {
    // Configuration errors
    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("Invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    // Connect errors
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Connect timed out after {0}ms")]
    ConnectTimeout(u64),

    // Framing errors
    #[error("Frame too large: {size} bytes exceeds limit of {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("Invalid framing: {0}")]
    InvalidFraming(String),

    // Decode errors
    #[error("Payload is not UTF-8 (valid up to byte {valid_up_to} of {len})")]
    InvalidUtf8 { valid_up_to: usize, len: usize },

    #[error("Malformed payload at line {line} column {column}: {reason}")]
    MalformedPayload {
        line: usize,
        column: usize,
        reason: String,
    },

    #[error("Unexpected payload shape: {0}")]
    UnexpectedShape(String),

    // Transport errors
    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Connection reset by peer")]
    ConnectionReset,

    // Shutdown errors
    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Receiver thread panicked")]
    ReceiverPanicked,
}

impl PoseError {
    /// Coarse classification used as a structured diagnostic field
    pub fn kind(&self) -> ErrorKind {
        match self {
            PoseError::InvalidConfig { .. } | PoseError::InvalidEndpoint { .. } => {
                ErrorKind::Config
            }
            PoseError::ConnectFailed(_) | PoseError::ConnectTimeout(_) => ErrorKind::Connect,
            PoseError::FrameTooLarge { .. } | PoseError::InvalidFraming(_) => ErrorKind::Framing,
            PoseError::InvalidUtf8 { .. }
            | PoseError::MalformedPayload { .. }
            | PoseError::UnexpectedShape(_) => ErrorKind::Decode,
            PoseError::TransportError(_) | PoseError::ConnectionReset => ErrorKind::Transport,
            PoseError::ShutdownError(_) | PoseError::ReceiverPanicked => ErrorKind::Shutdown,
        }
    }

    /// Fatal errors end the connection they occurred on.
    ///
    /// Decode errors are local to one frame and shutdown errors are only
    /// ever logged, so neither is fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Connect | ErrorKind::Framing | ErrorKind::Transport
        )
    }
}

/// Error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Connect,
    Framing,
    Decode,
    Transport,
    Shutdown,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Connect => "connect",
            ErrorKind::Framing => "framing",
            ErrorKind::Decode => "decode",
            ErrorKind::Transport => "transport",
            ErrorKind::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type for posesync operations
pub type PoseResult<T> = Result<T, PoseError>;
