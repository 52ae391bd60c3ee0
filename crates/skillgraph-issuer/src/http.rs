//! Axum router for the provider, plus an in-process mount for tests.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use skillgraph_protocol::transport::memory::{Endpoint, MemoryTransport};
use skillgraph_protocol::{AckResponse, TransportResponse};

use crate::error::IssuerError;
use crate::provider::Provider;

/// Provider operations reachable over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Search,
    Select,
    Confirm,
    Status,
    CertificateVerify,
}

impl Route {
    pub const ALL: [Route; 5] = [
        Route::Search,
        Route::Select,
        Route::Confirm,
        Route::Status,
        Route::CertificateVerify,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Route::Search => "/search",
            Route::Select => "/select",
            Route::Confirm => "/confirm",
            Route::Status => "/status",
            Route::CertificateVerify => "/certificate/verify",
        }
    }
}

/// Answer one request. Shared by the axum router and the in-memory mount.
pub async fn dispatch(provider: &Arc<Provider>, route: Route, body: Value) -> (StatusCode, Value) {
    let acked = |answer: crate::error::Result<(AckResponse, _)>| match answer {
        Ok((ack, _)) => (StatusCode::OK, json!(ack)),
        Err(e) => (StatusCode::BAD_REQUEST, json!(AckResponse::nack(e.to_string()))),
    };
    match route {
        Route::Search => acked(provider.search(body)),
        Route::Select => acked(provider.select(body)),
        Route::Status => acked(provider.status(body)),
        Route::Confirm => match provider.confirm(&body).await {
            Ok(response) => (StatusCode::OK, response),
            Err(IssuerError::InvalidRequest(msg)) => {
                tracing::warn!(error = %msg, "rejecting confirm");
                (StatusCode::BAD_REQUEST, json!({ "error": msg }))
            }
            Err(e) => {
                tracing::error!(error = %e, "confirm failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Verification failed", "reason": e.to_string() }),
                )
            }
        },
        Route::CertificateVerify => {
            let id = body.get("certificate_id").and_then(Value::as_str);
            match provider.verify_certificate(id).await {
                Ok(response) => (StatusCode::OK, response),
                Err(e) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "verified": false, "error": e.to_string() }),
                ),
            }
        }
    }
}

/// Build the provider router.
pub fn build_router(provider: Arc<Provider>) -> Router {
    Router::new()
        .route(Route::Search.path(), post(handle_search))
        .route(Route::Select.path(), post(handle_select))
        .route(Route::Confirm.path(), post(handle_confirm))
        .route(Route::Status.path(), post(handle_status))
        .route(Route::CertificateVerify.path(), post(handle_certificate_verify))
        .route("/health", get(handle_health))
        .with_state(provider)
}

/// POST /search
async fn handle_search(
    State(provider): State<Arc<Provider>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let (status, body) = dispatch(&provider, Route::Search, body).await;
    (status, Json(body))
}

/// POST /select
async fn handle_select(
    State(provider): State<Arc<Provider>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let (status, body) = dispatch(&provider, Route::Select, body).await;
    (status, Json(body))
}

/// POST /status
async fn handle_status(
    State(provider): State<Arc<Provider>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let (status, body) = dispatch(&provider, Route::Status, body).await;
    (status, Json(body))
}

/// POST /confirm
async fn handle_confirm(
    State(provider): State<Arc<Provider>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let (status, body) = dispatch(&provider, Route::Confirm, body).await;
    (status, Json(body))
}

/// POST /certificate/verify
async fn handle_certificate_verify(
    State(provider): State<Arc<Provider>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let (status, body) = dispatch(&provider, Route::CertificateVerify, body).await;
    (status, Json(body))
}

/// GET /health
async fn handle_health(State(provider): State<Arc<Provider>>) -> Json<Value> {
    Json(json!({
        "status": "active",
        "service": "BPP",
        "provider_id": provider.config().provider_id,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now(),
    }))
}

struct ProviderEndpoint {
    provider: Arc<Provider>,
    route: Route,
}

#[async_trait]
impl Endpoint for ProviderEndpoint {
    async fn handle(&self, body: Value) -> TransportResponse {
        let (status, body) = dispatch(&self.provider, self.route, body).await;
        TransportResponse {
            status: status.as_u16(),
            body,
        }
    }
}

/// Route every provider operation under its `bpp_uri` on a memory transport.
pub async fn mount(transport: &MemoryTransport, provider: Arc<Provider>) {
    let base = provider.config().bpp_uri.trim_end_matches('/').to_string();
    for route in Route::ALL {
        let endpoint = ProviderEndpoint {
            provider: Arc::clone(&provider),
            route,
        };
        transport
            .route(format!("{}{}", base, route.path()), Arc::new(endpoint))
            .await;
    }
}
