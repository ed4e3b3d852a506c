//! Unified error handling for the engine.
//!
//! Built-in handlers report malformed input through [`HandlerError`]; the
//! lifecycle controller surfaces anything that ends a connection as a
//! [`ClientError`].

use pircel_proto::ProtocolError;
use thiserror::Error;

use crate::db::DbError;

// ============================================================================
// Handler Errors (built-in command processing)
// ============================================================================

/// Errors a built-in handler can report for a single line.
///
/// None of these describe redundant events: a duplicate JOIN or a PART for
/// a channel we never saw are no-ops, not errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("{command}: not enough parameters (need {needed}, got {got})")]
    NeedMoreParams {
        command: &'static str,
        needed: usize,
        got: usize,
    },

    #[error("{command} without a source prefix")]
    MissingPrefix { command: &'static str },
}

impl HandlerError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NeedMoreParams { .. } => "need_more_params",
            Self::MissingPrefix { .. } => "missing_prefix",
        }
    }
}

/// Result type for built-in handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Fail with [`HandlerError::NeedMoreParams`] unless `args` has `needed` entries.
pub(crate) fn require_args(
    command: &'static str,
    args: &[String],
    needed: usize,
) -> HandlerResult {
    if args.len() < needed {
        return Err(HandlerError::NeedMoreParams {
            command,
            needed,
            got: args.len(),
        });
    }
    Ok(())
}

// ============================================================================
// Client Errors (connection lifecycle)
// ============================================================================

/// Reasons a connection ended abnormally.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connecting, reading or writing the socket failed.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The byte stream could not be framed or a line was rejected under
    /// the terminate policy.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A built-in handler rejected a line under the terminate policy.
    #[error("handler error: {0}")]
    Handler(#[from] HandlerError),

    /// Persistence could not be initialized.
    #[error("database error: {0}")]
    Database(#[from] DbError),

    /// The server closed the connection before we asked it to.
    #[error("connection closed by server")]
    ClosedByPeer,

    /// `run` was called on a client that already ran.
    #[error("client already started")]
    AlreadyStarted,
}

impl ClientError {
    /// Classify a failure of the framed socket: I/O errors are transport
    /// errors, anything else stays a protocol error.
    pub(crate) fn from_transport(error: ProtocolError) -> Self {
        match error {
            ProtocolError::Io(e) => Self::Transport(e),
            other => Self::Protocol(other),
        }
    }

    /// Get a static error code string for log labeling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Protocol(_) => "protocol",
            Self::Handler(e) => e.error_code(),
            Self::Database(_) => "database",
            Self::ClosedByPeer => "closed_by_peer",
            Self::AlreadyStarted => "already_started",
        }
    }
}
