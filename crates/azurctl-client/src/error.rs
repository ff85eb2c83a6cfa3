//! Error types for the session layer.

use azurctl_protocol::{ProtocolError, RejectReason};
use thiserror::Error;

/// Errors surfaced to callers of the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Socket-level failure while establishing the connection.
    #[error("connection failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The session ended while the operation was outstanding.
    #[error("connection lost")]
    ConnectionLost,

    /// No acknowledgment arrived within the configured timeout.
    #[error("timed out waiting for acknowledgment")]
    Timeout,

    /// An operation that needs a live connection was attempted without one.
    #[error("not connected")]
    NotConnected,

    /// The receiver rejected the command.
    #[error("command rejected by receiver: {0}")]
    Rejected(RejectReason),

    /// The client was shut down before the operation could resolve.
    #[error("client closed")]
    Closed,

    /// A protocol-level error.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
