//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when working with the Azur control protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A line exceeded the maximum length before a terminator arrived.
    #[error("frame too long: maximum {max} bytes, got {actual}")]
    FrameTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Accumulated length when the guard tripped.
        actual: usize,
    },

    /// A value was outside the domain its property allows.
    #[error("invalid value for {property}: {value}")]
    InvalidValue {
        /// Property name.
        property: &'static str,
        /// The offending value text.
        value: String,
    },

    /// An input name that does not match any known input.
    #[error("unknown input: {0}")]
    UnknownInput(String),
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
