//! Axum router for the service: protocol endpoints, verification, skill
//! graphs, credentials and the employer flow.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use skillgraph_core::{
    Action, CandidateId, CandidateSubject, Credential, CredentialId, QrPayload,
    VerificationStatus,
};
use skillgraph_protocol::{verify_inbound, AckResponse, BapEngine, SearchIntent, TrustRegistry};
use skillgraph_store::InsertResult;

use crate::aggregation::SkillGraphService;
use crate::credentials::CredentialService;
use crate::employer::{EmployerVerificationRequest, EmployerVerifier};
use crate::error::{Result, ServiceError};
use crate::jobs::JobQueue;
use crate::verification::VerificationService;

/// Largest callback body the signature check will buffer.
const MAX_CALLBACK_BYTES: usize = 2 * 1024 * 1024;

const OUTBOUND: [Action; 5] = [
    Action::Search,
    Action::Select,
    Action::Confirm,
    Action::Status,
    Action::Support,
];

/// Everything the handlers share.
pub struct AppState {
    pub graphs: SkillGraphService,
    pub credentials: CredentialService,
    pub verification: VerificationService,
    pub employer: EmployerVerifier,
    pub engine: BapEngine,
    pub registry: Arc<dyn TrustRegistry>,
    pub jobs: Arc<JobQueue>,
    /// Base URL embedded in QR verification links.
    pub public_url: String,
}

/// Build the service router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut outbound = Router::new();
    let mut callbacks = Router::new();
    for action in OUTBOUND {
        outbound = outbound.route(
            &format!("/api/beckn/{}", action),
            post(move |state: State<Arc<AppState>>, body: Json<OutboundRequest>| {
                handle_outbound(state, action, body)
            }),
        );
        let callback = action.callback();
        callbacks = callbacks.route(
            &format!("/api/beckn/{}", callback),
            post(move |state: State<Arc<AppState>>, body: Json<Value>| {
                handle_callback(state, callback, body)
            }),
        );
    }
    let callbacks = callbacks.route_layer(middleware::from_fn_with_state(
        state.clone(),
        require_signed_callback,
    ));

    Router::new()
        .merge(outbound)
        .merge(callbacks)
        .route(
            "/api/beckn/results/{transaction_id}/{action}",
            get(handle_get_result),
        )
        .route("/api/verify/presentation", post(handle_verify_presentation))
        .route("/api/verify/qr", post(handle_verify_qr))
        .route(
            "/api/verify/revocation/{credential_id}",
            get(handle_check_revocation),
        )
        .route(
            "/api/verify/candidate/{candidate_id}",
            post(handle_verify_candidate),
        )
        .route("/api/candidates/{id}/skill-graph", get(handle_get_skill_graph))
        .route(
            "/api/candidates/{id}/skill-graph/refresh",
            post(handle_refresh_skill_graph),
        )
        .route(
            "/api/candidates/{id}/presentation",
            post(handle_generate_presentation),
        )
        .route("/api/candidates/{id}/qr", get(handle_generate_qr))
        .route(
            "/api/candidates/{id}/credentials",
            post(handle_add_credential),
        )
        .route(
            "/api/credentials/{id}",
            get(handle_get_credential).delete(handle_delete_credential),
        )
        .route(
            "/api/credentials/{id}/status",
            post(handle_set_credential_status),
        )
        .route("/api/employer/verify", post(handle_employer_verify))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ───────────────────────────────────────────────────────────────────────────
// Protocol
// ───────────────────────────────────────────────────────────────────────────

/// Body of an outbound protocol call. Which fields matter depends on the action.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundRequest {
    #[serde(default)]
    pub intent: Option<SearchIntent>,
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default)]
    pub order: Option<Value>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub ref_id: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

/// POST /api/beckn/{search|select|confirm|status|support}
async fn handle_outbound(
    State(state): State<Arc<AppState>>,
    action: Action,
    Json(req): Json<OutboundRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let engine = &state.engine;
    let txn = req.transaction_id;
    let ack = match action {
        Action::Search => engine.search(req.intent).await?,
        Action::Select => {
            let provider = req.provider_id.unwrap_or_default();
            engine.select(&provider, req.items, txn).await?
        }
        Action::Confirm => engine.confirm(req.order, txn).await?,
        Action::Status => engine.status(req.order_id.as_deref(), txn).await?,
        Action::Support => engine.support(req.ref_id.as_deref(), txn).await?,
        other => {
            return Err(ServiceError::InvalidRequest(format!(
                "{} is not an outbound action",
                other
            )))
        }
    };

    let status = if ack.is_ack() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    // The dispatcher records the delivery outcome; nobody waits on the ticket.
    Ok((status, Json(json!(ack.response))))
}

/// Refuse callbacks that are not signed by a trusted issuer.
async fn require_signed_callback(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_CALLBACK_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => return callback_error(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let payload: Value = match serde_json::from_slice(&bytes) {
        Ok(payload) => payload,
        Err(e) => return callback_error(StatusCode::BAD_REQUEST, e.to_string()),
    };

    match verify_inbound(state.registry.as_ref(), &payload).await {
        Ok(issuer) => {
            tracing::debug!(issuer = %issuer.id, path = %parts.uri.path(), "callback signature ok");
            next.run(Request::from_parts(parts, Body::from(bytes))).await
        }
        Err(rejection) => {
            let status = StatusCode::from_u16(rejection.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            callback_error(status, rejection.to_string())
        }
    }
}

fn callback_error(status: StatusCode, message: String) -> Response {
    (status, Json(json!(AckResponse::nack(message)))).into_response()
}

/// POST /api/beckn/on_*
async fn handle_callback(
    State(state): State<Arc<AppState>>,
    action: Action,
    Json(payload): Json<Value>,
) -> Result<Json<AckResponse>> {
    Ok(Json(state.engine.handle_callback(action, &payload).await?))
}

/// GET /api/beckn/results/{transaction_id}/{action}
async fn handle_get_result(
    State(state): State<Arc<AppState>>,
    Path((transaction_id, action)): Path<(String, Action)>,
) -> Result<Json<Value>> {
    let result = state.engine.get_result(&transaction_id, action).await?;
    Ok(Json(json!(result)))
}

// ───────────────────────────────────────────────────────────────────────────
// Verification
// ───────────────────────────────────────────────────────────────────────────

/// POST /api/verify/presentation
async fn handle_verify_presentation(
    State(state): State<Arc<AppState>>,
    Json(document): Json<Value>,
) -> Json<Value> {
    Json(json!(state.verification.verify_presentation(&document)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrRequest {
    pub qr_data: String,
}

/// POST /api/verify/qr
async fn handle_verify_qr(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QrRequest>,
) -> Json<Value> {
    Json(json!(state.verification.verify_qr(&req.qr_data).await))
}

/// GET /api/verify/revocation/{credential_id}
async fn handle_check_revocation(
    State(state): State<Arc<AppState>>,
    Path(credential_id): Path<String>,
) -> Result<Json<Value>> {
    let status = state
        .verification
        .check_revocation(&CredentialId::new(credential_id))
        .await?;
    Ok(Json(json!(status)))
}

#[derive(Debug, Default, Deserialize)]
pub struct SubjectRequest {
    #[serde(default)]
    pub name: Option<String>,
}

impl SubjectRequest {
    fn subject(self, id: String) -> CandidateSubject {
        CandidateSubject {
            name: self.name.unwrap_or_else(|| id.clone()),
            id: CandidateId::new(id),
        }
    }
}

/// POST /api/verify/candidate/{candidate_id}
async fn handle_verify_candidate(
    State(state): State<Arc<AppState>>,
    Path(candidate_id): Path<String>,
    Json(req): Json<SubjectRequest>,
) -> Result<Json<Value>> {
    let result = state
        .verification
        .verify_candidate(&req.subject(candidate_id))
        .await?;
    Ok(Json(json!(result)))
}

// ───────────────────────────────────────────────────────────────────────────
// Candidates and credentials
// ───────────────────────────────────────────────────────────────────────────

/// GET /api/candidates/{id}/skill-graph
async fn handle_get_skill_graph(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let graph = state
        .graphs
        .get(&CandidateId::new(id.clone()))
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("skill graph for {}", id)))?;
    Ok(Json(json!(graph)))
}

/// POST /api/candidates/{id}/skill-graph/refresh
async fn handle_refresh_skill_graph(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let graph = state
        .graphs
        .on_credential_changed(&CandidateId::new(id))
        .await?;
    Ok(Json(json!(graph)))
}

/// POST /api/candidates/{id}/presentation
async fn handle_generate_presentation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SubjectRequest>,
) -> Result<Json<Value>> {
    let presentation = state
        .verification
        .presentation_for(&req.subject(id))
        .await?;
    Ok(Json(presentation))
}

/// GET /api/candidates/{id}/qr
async fn handle_generate_qr(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let payload = QrPayload::new(CandidateId::new(id), &state.public_url, Utc::now());
    let qr_data = payload.encode()?;
    Ok(Json(json!({ "qrData": qr_data, "payload": payload })))
}

/// POST /api/candidates/{id}/credentials
async fn handle_add_credential(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(mut body): Json<Value>,
) -> Result<(StatusCode, Json<Value>)> {
    // The path names the owner; a body value is ignored.
    if let Some(obj) = body.as_object_mut() {
        obj.insert("candidateId".into(), json!(id));
    }
    let credential: Credential = serde_json::from_value(body)
        .map_err(|e| ServiceError::InvalidRequest(format!("invalid credential: {}", e)))?;
    let (inserted, graph) = state.credentials.add(&credential).await?;
    let status = match inserted {
        InsertResult::Inserted => StatusCode::CREATED,
        InsertResult::AlreadyExists => StatusCode::OK,
    };
    Ok((
        status,
        Json(json!({ "credentialId": credential.id, "skillGraph": graph })),
    ))
}

/// GET /api/credentials/{id}
async fn handle_get_credential(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Credential>> {
    Ok(Json(state.credentials.get(&CredentialId::new(id)).await?))
}

/// DELETE /api/credentials/{id}
async fn handle_delete_credential(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let graph = state.credentials.remove(&CredentialId::new(id)).await?;
    Ok(Json(json!({ "skillGraph": graph })))
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: VerificationStatus,
}

/// POST /api/credentials/{id}/status
async fn handle_set_credential_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<Value>> {
    let graph = state
        .credentials
        .set_status(&CredentialId::new(id), req.status)
        .await?;
    Ok(Json(json!({ "skillGraph": graph })))
}

// ───────────────────────────────────────────────────────────────────────────
// Employer
// ───────────────────────────────────────────────────────────────────────────

/// POST /api/employer/verify
async fn handle_employer_verify(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmployerVerificationRequest>,
) -> Result<Json<Value>> {
    let result = state.employer.verify(&req).await?;
    Ok(Json(json!(result)))
}

/// GET /health
async fn handle_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let queued_jobs = state.jobs.len().await;
    Json(json!({
        "status": "active",
        "service": "BAP",
        "bap_id": state.engine.config().identity.bap_id,
        "queued_jobs": queued_jobs,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now(),
    }))
}
