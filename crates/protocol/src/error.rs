//! Payload error types

use thiserror::Error;

/// Errors that can occur when encoding or decoding payload bodies
#[derive(Debug, Error)]
pub enum PayloadError {
    /// Body could not be decoded into the requested type
    #[error("decode payload failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// Value could not be encoded into a payload body
    #[error("encode payload failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Body is empty
    #[error("empty payload")]
    Empty,
}
