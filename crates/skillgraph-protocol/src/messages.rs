//! Protocol message types.
//!
//! Requests travel as `{context, message}`; synchronous acknowledgements are
//! `{message: {ack: {status}}}`. These shapes are fixed for interop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use skillgraph_core::Action;

pub const DOMAIN: &str = "skill-verification:1.0.0";
pub const CORE_VERSION: &str = "1.1.0";
pub const DEFAULT_TTL: &str = "PT30M";

/// Who we are on the network when acting as the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BapIdentity {
    pub bap_id: String,
    pub bap_uri: String,
}

/// Provider reference carried in callback contexts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRef {
    pub id: String,
}

/// Message context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub domain: String,
    pub action: Action,
    pub version: String,
    pub bap_id: String,
    pub bap_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpp_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpp_uri: Option<String>,
    pub transaction_id: String,
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
    pub ttl: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderRef>,
}

impl Context {
    /// New context; a fresh transaction id is generated when none is given.
    pub fn new(
        identity: &BapIdentity,
        action: Action,
        transaction_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            domain: DOMAIN.to_string(),
            action,
            version: CORE_VERSION.to_string(),
            bap_id: identity.bap_id.clone(),
            bap_uri: identity.bap_uri.clone(),
            bpp_id: None,
            bpp_uri: None,
            transaction_id: transaction_id.unwrap_or_else(new_id),
            message_id: new_id(),
            timestamp: now,
            ttl: DEFAULT_TTL.to_string(),
            provider: None,
        }
    }

    /// Context for the provider's answer to this request.
    pub fn reply(&self, provider_id: &str, bpp_uri: &str, now: DateTime<Utc>) -> Self {
        Self {
            action: self.action.callback(),
            bpp_id: Some(provider_id.to_string()),
            bpp_uri: Some(bpp_uri.to_string()),
            message_id: new_id(),
            timestamp: now,
            provider: Some(ProviderRef {
                id: provider_id.to_string(),
            }),
            ..self.clone()
        }
    }
}

/// Fresh UUID v4 string.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Build a `{context, message}` request body.
pub fn envelope(context: &Context, message: Value) -> Value {
    json!({ "context": context, "message": message })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckStatus {
    #[serde(rename = "ACK")]
    Ack,
    #[serde(rename = "NACK")]
    Nack,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub status: AckStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckMessage {
    pub ack: Ack,
}

/// Error detail attached to a NACK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

/// Synchronous acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckResponse {
    pub message: AckMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl AckResponse {
    pub fn ack() -> Self {
        Self {
            message: AckMessage {
                ack: Ack {
                    status: AckStatus::Ack,
                },
            },
            context: None,
            error: None,
        }
    }

    pub fn nack(error: impl Into<String>) -> Self {
        Self {
            message: AckMessage {
                ack: Ack {
                    status: AckStatus::Nack,
                },
            },
            context: None,
            error: Some(ErrorBody {
                message: error.into(),
            }),
        }
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub fn is_ack(&self) -> bool {
        self.message.ack.status == AckStatus::Ack
    }
}

/// What the requester is looking for in a search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIntent {
    #[serde(default)]
    pub skill_name: Option<String>,
    #[serde(default)]
    pub issuer_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl SearchIntent {
    /// The `intent` object sent on the wire.
    pub fn to_message(&self) -> Value {
        json!({
            "intent": {
                "item": { "descriptor": { "name": self.skill_name.clone().unwrap_or_default() } },
                "provider": { "descriptor": { "name": self.issuer_name.clone().unwrap_or_default() } },
                "category": {
                    "descriptor": {
                        "code": self.category.clone().unwrap_or_else(|| "skill-verification".into())
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> BapIdentity {
        BapIdentity {
            bap_id: "skill-verification-bap".into(),
            bap_uri: "http://localhost:5001/api/beckn".into(),
        }
    }

    #[test]
    fn test_context_defaults() {
        let ctx = Context::new(&identity(), Action::Search, None, Utc::now());
        let v = serde_json::to_value(&ctx).unwrap();
        assert_eq!(v["domain"], DOMAIN);
        assert_eq!(v["version"], CORE_VERSION);
        assert_eq!(v["ttl"], "PT30M");
        assert_eq!(v["action"], "search");
        assert!(v.get("provider").is_none());
        assert_ne!(ctx.transaction_id, ctx.message_id);
    }

    #[test]
    fn test_context_keeps_transaction() {
        let ctx = Context::new(&identity(), Action::Confirm, Some("txn-1".into()), Utc::now());
        assert_eq!(ctx.transaction_id, "txn-1");

        let reply = ctx.reply("UNI001", "http://bpp", Utc::now());
        assert_eq!(reply.action, Action::OnConfirm);
        assert_eq!(reply.transaction_id, "txn-1");
        assert_ne!(reply.message_id, ctx.message_id);
        assert_eq!(reply.provider.unwrap().id, "UNI001");
    }

    #[test]
    fn test_ack_wire_shape() {
        assert_eq!(
            serde_json::to_value(AckResponse::ack()).unwrap(),
            json!({"message": {"ack": {"status": "ACK"}}})
        );
        let nack = serde_json::to_value(AckResponse::nack("bad")).unwrap();
        assert_eq!(nack["message"]["ack"]["status"], "NACK");
        assert_eq!(nack["error"]["message"], "bad");
    }

    #[test]
    fn test_search_intent_message() {
        let intent = SearchIntent {
            skill_name: Some("React".into()),
            ..Default::default()
        };
        let msg = intent.to_message();
        assert_eq!(msg["intent"]["item"]["descriptor"]["name"], "React");
        assert_eq!(msg["intent"]["category"]["descriptor"]["code"], "skill-verification");
    }
}
