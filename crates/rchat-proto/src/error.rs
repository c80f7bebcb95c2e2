//! Error types for the wire protocol.

use thiserror::Error;

/// Convenience alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Protocol-level errors.
///
/// [`ProtocolError::Malformed`] and [`ProtocolError::UnknownCommand`] are
/// recoverable per frame: the codec has already consumed the offending
/// frame, so a reader may report the error and keep going. The remaining
/// variants are connection-fatal.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The frame was not a valid JSON envelope.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    /// An unterminated frame grew past the codec limit.
    #[error("frame exceeds {limit} bytes (got {actual})")]
    FrameTooLong {
        /// Bytes buffered so far.
        actual: usize,
        /// Configured frame limit.
        limit: usize,
    },

    /// The envelope's version field differs from [`crate::PROTOCOL_VERSION`].
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(i64),

    /// The command word is not part of this channel's vocabulary.
    #[error("unknown command: {0}")]
    UnknownCommand(String),
}
