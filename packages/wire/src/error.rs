//! Error types for the wire layer.

use thiserror::Error;

/// Errors encoding or decoding wire data.
#[derive(Debug, Error)]
pub enum WireError {
    /// The bytes were not a valid encoding.
    #[error("wire codec error: {0}")]
    Codec(#[from] serde_json::Error),
}
