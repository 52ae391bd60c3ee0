//! Error types for SkillGraph core.

use thiserror::Error;

/// Core errors raised by signing, key handling and document construction.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),

    #[error("malformed document: {0}")]
    MalformedDocument(String),

    #[error("workflow {0} already reached a terminal status")]
    WorkflowFinalized(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
