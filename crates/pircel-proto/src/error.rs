//! Error types for the line codec.
//!
//! Everything that can go wrong between a raw frame arriving from the server
//! and a `(prefix, command, args)` triple being handed to the engine.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Top-level codec errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The frame was neither valid UTF-8 nor decodable with the detected charset.
    #[error("undecodable line ({len} bytes, tried {encoding})")]
    Decode {
        /// The raw frame, kept for logging.
        raw: Vec<u8>,
        /// Length of the frame in bytes.
        len: usize,
        /// Name of the fallback encoding that was attempted.
        encoding: &'static str,
    },

    /// A three-digit command with no entry in the numeric table.
    #[error("no symbolic name for numeric command {0}")]
    UnknownNumericCommand(String),

    /// A line exceeded the maximum accepted length and was skipped.
    #[error("message too long: {actual} bytes (limit: {limit})")]
    MessageTooLong {
        /// Actual frame length.
        actual: usize,
        /// Maximum allowed length.
        limit: usize,
    },

    /// Failed to parse a decoded line.
    #[error("invalid message {string:?}: {cause}")]
    InvalidMessage {
        /// The offending line.
        string: String,
        /// Why it was rejected.
        #[source]
        cause: MessageParseError,
    },
}

/// Errors encountered when splitting a decoded line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum MessageParseError {
    /// Line was empty (or only whitespace).
    #[error("empty message")]
    EmptyMessage,

    /// A prefix was present but nothing followed it.
    #[error("missing command")]
    MissingCommand,
}

impl ProtocolError {
    /// Whether the connection can keep reading after this error.
    ///
    /// Per-line problems are recoverable; socket failures are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. }
                | Self::UnknownNumericCommand(_)
                | Self::InvalidMessage { .. }
                | Self::MessageTooLong { .. }
        )
    }
}
