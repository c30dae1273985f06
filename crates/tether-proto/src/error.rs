//! Error types for the tether-proto crate.

use thiserror::Error;

/// Errors that can occur while encoding or decoding protocol data.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Failed to encode a value.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Failed to decode a value.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// A frame was expected to carry a payload but had none.
    #[error("missing payload for opcode {0}")]
    MissingPayload(u8),

    /// Missing required field.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Validation error.
    #[error("validation error: {0}")]
    Validation(String),
}
