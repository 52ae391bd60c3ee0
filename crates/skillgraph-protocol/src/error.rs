//! Error types for the protocol engine.

use thiserror::Error;

use skillgraph_core::CoreError;
use skillgraph_store::StoreError;

/// Errors that can occur during protocol operations.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Storage error while logging.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Signing or encoding error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Network call could not be completed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Request failed local validation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The dispatch worker has shut down.
    #[error("dispatcher closed")]
    DispatcherClosed,

    /// Every dispatch slot is taken.
    #[error("dispatch queue full")]
    QueueFull,
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
