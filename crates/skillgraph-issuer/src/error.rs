//! Error types for the issuer.

use thiserror::Error;

use skillgraph_core::CoreError;
use skillgraph_protocol::ProtocolError;

/// Errors that can occur on the issuer side.
#[derive(Debug, Error)]
pub enum IssuerError {
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Malformed request payload.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Seed file could not be parsed.
    #[error("invalid seed data: {0}")]
    Seed(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for issuer operations.
pub type Result<T> = std::result::Result<T, IssuerError>;
