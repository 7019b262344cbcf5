//! Server error types.

use std::path::PathBuf;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] netdio_protocol::ProtocolError),

    #[error("failed to read config {0}: {1}")]
    ConfigIo(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config {0}: {1}")]
    ConfigParse(PathBuf, String),

    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    #[error("server shutting down")]
    ShuttingDown,
}
