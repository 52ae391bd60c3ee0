//! Signed inbound messages.
//!
//! Providers sign `{context, message}` with their Ed25519 key and attach the
//! base64 signature as a top-level `signature` field. Before any callback
//! handler runs, the payload is checked against the trust registry.

use serde_json::{json, Value};
use thiserror::Error;

use skillgraph_core::{canonical, Ed25519Signature, Issuer, IssuerId, Keypair};

use crate::registry::TrustRegistry;

/// The part of a payload covered by the signature.
fn signed_portion(context: &Value, message: &Value) -> Value {
    json!({ "context": context, "message": message })
}

/// Sign `{context, message}`.
pub fn sign_envelope(context: &Value, message: &Value, keypair: &Keypair) -> Ed25519Signature {
    canonical::sign(&signed_portion(context, message), keypair)
}

/// Build a signed `{context, message, signature}` payload.
pub fn signed_payload(context: &Value, message: &Value, keypair: &Keypair) -> Value {
    let signature = sign_envelope(context, message, keypair);
    json!({
        "context": context,
        "message": message,
        "signature": signature.to_base64(),
    })
}

/// Why an inbound payload was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InboundRejection {
    #[error("Missing provider id")]
    MissingProviderId,

    #[error("Missing signature")]
    MissingSignature,

    #[error("Missing message")]
    MissingMessage,

    #[error("Untrusted or unknown issuer")]
    UntrustedIssuer,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Issuer verification failed: {0}")]
    Registry(String),
}

impl InboundRejection {
    /// HTTP status used when refusing the request.
    pub fn status_code(&self) -> u16 {
        match self {
            InboundRejection::MissingProviderId
            | InboundRejection::MissingSignature
            | InboundRejection::MissingMessage => 400,
            InboundRejection::UntrustedIssuer => 403,
            InboundRejection::InvalidSignature => 401,
            InboundRejection::Registry(_) => 500,
        }
    }
}

/// Declared provider id: `context.provider.id`, else `context.bpp_id`.
fn provider_id(context: &Value) -> Option<&str> {
    context
        .get("provider")
        .and_then(|p| p.get("id"))
        .or_else(|| context.get("bpp_id"))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Check an inbound payload's signature against the trust registry.
///
/// Returns the trusted issuer on success.
pub async fn verify_inbound(
    registry: &dyn TrustRegistry,
    payload: &Value,
) -> Result<Issuer, InboundRejection> {
    let context = payload.get("context").unwrap_or(&Value::Null);
    let provider = provider_id(context).ok_or(InboundRejection::MissingProviderId)?;
    let message = payload
        .get("message")
        .filter(|m| !m.is_null())
        .ok_or(InboundRejection::MissingMessage)?;
    let signature = payload
        .get("signature")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(InboundRejection::MissingSignature)?;

    let issuer = registry
        .resolve(&IssuerId::new(provider))
        .await
        .map_err(|e| InboundRejection::Registry(e.to_string()))?
        .filter(Issuer::is_trusted)
        .ok_or_else(|| {
            tracing::warn!(provider, "rejecting callback from untrusted issuer");
            InboundRejection::UntrustedIssuer
        })?;

    let key = issuer.verifying_key().map_err(|_| {
        tracing::warn!(provider, "issuer has an undecodable public key");
        InboundRejection::InvalidSignature
    })?;

    if !canonical::verify(&signed_portion(context, message), signature, &key) {
        tracing::warn!(provider, "rejecting callback with invalid signature");
        return Err(InboundRejection::InvalidSignature);
    }

    Ok(issuer)
}
