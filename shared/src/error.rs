//! Error types for the wire protocol

use thiserror::Error;

/// Errors raised while encoding, decoding or validating protocol data
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// A frame could not be serialized
    #[error("Encode error: {0}")]
    Encode(String),

    /// A frame could not be parsed
    #[error("Decode error: {0}")]
    Decode(String),

    /// A message payload violates the text/audio invariant
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// An enumerated field carried an unknown value
    #[error("Unknown {field}: {value}")]
    UnknownVariant {
        /// Name of the field being parsed
        field: &'static str,
        /// The rejected value
        value: String,
    },
}

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
