//! Error types for the service.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use skillgraph_core::{CoreError, WorkflowId};
use skillgraph_issuer::IssuerError;
use skillgraph_protocol::ProtocolError;
use skillgraph_store::StoreError;

/// Errors surfaced by service operations and HTTP handlers.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("issuer error: {0}")]
    Issuer(#[from] IssuerError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No trusted issuer to send verification orders to.
    #[error("issuer unavailable: {0}")]
    IssuerUnavailable(String),

    /// A verification workflow failed; its log records the details.
    #[error("workflow {workflow_id} failed: {message}")]
    Workflow {
        workflow_id: WorkflowId,
        message: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for ServiceError {
    fn from(e: toml::de::Error) -> Self {
        ServiceError::Config(e.to_string())
    }
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Protocol(ProtocolError::InvalidRequest(_)) => StatusCode::BAD_REQUEST,
            ServiceError::IssuerUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let mut body = json!({ "error": self.to_string() });
        if let ServiceError::Workflow { workflow_id, .. } = &self {
            body["workflowId"] = json!(workflow_id);
        }
        (status, Json(body)).into_response()
    }
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;
