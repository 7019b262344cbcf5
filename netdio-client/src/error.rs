//! Client error types.

use netdio_protocol::{Command, ProtocolError, Status};
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("request timeout")]
    Timeout,

    #[error("admission denied by device (status {0})")]
    AdmissionDenied(u8),

    #[error("device rejected {command}: {status}")]
    Device { command: Command, status: Status },

    #[error("received a request frame where a reply was expected")]
    UnexpectedFrame,

    #[error("reply frame id {0} matches no outstanding request")]
    UnknownFrameId(u8),

    #[error("reply command {actual} does not match request {expected} (frame id {frame_id})")]
    CommandMismatch {
        frame_id: u8,
        expected: Command,
        actual: Command,
    },

    #[error("reply value does not match the issued command")]
    UnexpectedReply,
}

impl ClientError {
    /// Returns whether this error is worth retrying on a fresh
    /// connection.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_) | ClientError::Timeout | ClientError::ConnectionClosed
        )
    }
}
