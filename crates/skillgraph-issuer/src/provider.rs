//! Protocol-facing provider (BPP) handlers.
//!
//! `confirm` answers synchronously with the verification verdict. `search`,
//! `select` and `status` acknowledge at once and later send a signed
//! `on_search` catalog, `on_select` quote or `on_status` order state to the
//! requester's callback URI.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use skillgraph_core::{Action, Issuer, IssuerId, IssuerStatus, Keypair};
use skillgraph_protocol::{new_id, signed_payload, AckResponse, Transport, TransportResponse};

use crate::error::{IssuerError, Result};
use crate::records::AcademicRecords;
use crate::verifier::verify_skill;

/// Identity of this provider on the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Doubles as the university id and the registry id.
    pub provider_id: String,
    pub name: String,
    /// Public base URI of this provider.
    pub bpp_uri: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_id: "UNI001".into(),
            name: "Skill Verification BPP".into(),
            bpp_uri: "http://localhost:6000/beckn".into(),
        }
    }
}

pub struct Provider {
    config: ProviderConfig,
    keypair: Keypair,
    records: Arc<dyn AcademicRecords>,
    transport: Arc<dyn Transport>,
}

impl Provider {
    pub fn new(
        config: ProviderConfig,
        keypair: Keypair,
        records: Arc<dyn AcademicRecords>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            keypair,
            records,
            transport,
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn records(&self) -> &Arc<dyn AcademicRecords> {
        &self.records
    }

    /// The trust-registry entry requesters need to accept our callbacks.
    pub fn registry_entry(&self) -> Issuer {
        Issuer {
            id: IssuerId::new(self.config.provider_id.clone()),
            name: self.config.name.clone(),
            callback_uri: self.config.bpp_uri.clone(),
            public_key: self.keypair.public_key().to_base64(),
            status: IssuerStatus::Trusted,
        }
    }

    /// Verify the first order item and answer with the verdict in its tags.
    pub async fn confirm(&self, request: &Value) -> Result<Value> {
        let item = request
            .pointer("/message/order/items/0")
            .ok_or_else(|| IssuerError::InvalidRequest("Missing order item".into()))?;

        let skill = item.get("id").and_then(Value::as_str);
        let student_id = item.pointer("/tags/student_id").and_then(Value::as_str);
        let (Some(skill), Some(student_id)) = (skill, student_id) else {
            return Err(IssuerError::InvalidRequest("Invalid confirm payload".into()));
        };

        tracing::info!(skill, student_id, "verifying skill");
        let verdict = verify_skill(self.records.as_ref(), student_id, skill, Utc::now()).await?;

        let mut tags = json!({
            "verified": verdict.verified,
            "nsqf_level": verdict.nsqf_level(),
            "confidence": verdict.confidence,
            "certificate_id": verdict.certificate_id(),
        });
        if let Some(reason) = verdict.reason {
            tags["reason"] = json!(reason.as_str());
        }

        Ok(json!({
            "message": {
                "order": {
                    "items": [{ "id": skill, "tags": tags }]
                }
            }
        }))
    }

    /// Acknowledge a search and send the catalog back in the background.
    ///
    /// The returned handle resolves once the callback attempt has finished.
    pub fn search(self: &Arc<Self>, request: Value) -> Result<(AckResponse, JoinHandle<()>)> {
        self.answer_later(request, Action::OnSearch)
    }

    /// Acknowledge a selection and send the quoted order as `on_select`.
    pub fn select(self: &Arc<Self>, request: Value) -> Result<(AckResponse, JoinHandle<()>)> {
        if request
            .pointer("/message/order/items")
            .and_then(Value::as_array)
            .map_or(true, Vec::is_empty)
        {
            return Err(IssuerError::InvalidRequest("select requires order items".into()));
        }
        self.answer_later(request, Action::OnSelect)
    }

    /// Acknowledge a status query and send the order state as `on_status`.
    pub fn status(self: &Arc<Self>, request: Value) -> Result<(AckResponse, JoinHandle<()>)> {
        if order_id(&request).is_none() {
            return Err(IssuerError::InvalidRequest("status requires an order id".into()));
        }
        self.answer_later(request, Action::OnStatus)
    }

    fn answer_later(
        self: &Arc<Self>,
        request: Value,
        callback: Action,
    ) -> Result<(AckResponse, JoinHandle<()>)> {
        if request.pointer("/context/bap_uri").and_then(Value::as_str).is_none() {
            return Err(IssuerError::InvalidRequest(format!(
                "{} context missing bap_uri",
                callback
            )));
        }

        let provider = Arc::clone(self);
        let handle = tokio::spawn(async move {
            match provider.send_callback(&request, callback).await {
                Ok(response) if response.is_success() => {
                    tracing::debug!(%callback, status = response.status, "delivered callback");
                }
                Ok(response) => {
                    tracing::warn!(%callback, status = response.status, "requester refused callback");
                }
                Err(e) => tracing::warn!(%callback, error = %e, "callback failed"),
            }
        });

        Ok((AckResponse::ack(), handle))
    }

    /// Catalog of skills this university can vouch for, filtered by intent.
    pub async fn catalog(&self, intent: &Value) -> Result<Value> {
        let wanted = intent
            .pointer("/item/descriptor/name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let items: Vec<Value> = self
            .offered_skills()
            .await?
            .into_iter()
            .filter(|item| match wanted {
                Some(w) => item["id"]
                    .as_str()
                    .is_some_and(|id| id.trim().to_lowercase() == w.to_lowercase()),
                None => true,
            })
            .collect();

        Ok(json!({
            "descriptor": { "name": format!("{} Catalog", self.config.name) },
            "providers": [{
                "id": self.config.provider_id,
                "descriptor": { "name": self.config.name },
                "items": items,
            }]
        }))
    }

    async fn offered_skills(&self) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        for subject in self.records.subjects().await? {
            for skill in &subject.mapped_skills {
                items.push(json!({
                    "id": skill,
                    "descriptor": { "name": skill },
                    "tags": {
                        "subject_code": subject.subject_code,
                        "credits": subject.credits,
                    }
                }));
            }
        }
        Ok(items)
    }

    /// Requested items, each marked with whether this university can verify it.
    pub async fn quote(&self, order: &Value) -> Result<Value> {
        let offered = self.offered_skills().await?;
        let requested = order
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let items: Vec<Value> = requested
            .iter()
            .map(|item| {
                let id = item.get("id").and_then(Value::as_str).unwrap_or_default();
                let known = offered.iter().find(|o| {
                    o["id"]
                        .as_str()
                        .is_some_and(|s| s.trim().eq_ignore_ascii_case(id.trim()))
                });
                match known {
                    Some(offer) => json!({
                        "id": id,
                        "descriptor": offer["descriptor"],
                        "tags": { "available": true, "subject_code": offer["tags"]["subject_code"] },
                    }),
                    None => json!({ "id": id, "tags": { "available": false } }),
                }
            })
            .collect();

        Ok(json!({
            "provider": { "id": self.config.provider_id },
            "items": items,
            "quote": { "price": { "currency": "INR", "value": "0" } },
        }))
    }

    /// State of an order; orders are identified by the certificate they produced.
    pub async fn order_state(&self, order_id: &str) -> Result<Value> {
        Ok(match self.records.certificate(order_id).await? {
            Some(cert) => json!({
                "id": order_id,
                "state": "COMPLETED",
                "fulfillment": {
                    "certificate_id": cert.certificate_id,
                    "degree": cert.degree,
                }
            }),
            None => json!({ "id": order_id, "state": "NOT_FOUND" }),
        })
    }

    /// Build and sign the `on_search` payload answering `request`.
    pub async fn on_search_payload(&self, request: &Value, now: DateTime<Utc>) -> Result<Value> {
        self.callback_payload(request, Action::OnSearch, now).await
    }

    /// Build and sign the callback answering `request`.
    pub async fn callback_payload(
        &self,
        request: &Value,
        callback: Action,
        now: DateTime<Utc>,
    ) -> Result<Value> {
        let message = match callback {
            Action::OnSearch => {
                let intent = request.pointer("/message/intent").unwrap_or(&Value::Null);
                json!({ "catalog": self.catalog(intent).await? })
            }
            Action::OnSelect => {
                let order = request.pointer("/message/order").unwrap_or(&Value::Null);
                json!({ "order": self.quote(order).await? })
            }
            Action::OnStatus => {
                let id = order_id(request).unwrap_or_default();
                json!({ "order": self.order_state(id).await? })
            }
            other => {
                return Err(IssuerError::InvalidRequest(format!(
                    "no provider callback for {}",
                    other
                )))
            }
        };

        let mut context = request.get("context").cloned().unwrap_or_else(|| json!({}));
        if let Some(ctx) = context.as_object_mut() {
            ctx.insert("action".into(), json!(callback));
            ctx.insert("message_id".into(), json!(new_id()));
            ctx.insert("timestamp".into(), json!(now));
            ctx.insert("bpp_id".into(), json!(self.config.provider_id));
            ctx.insert("bpp_uri".into(), json!(self.config.bpp_uri));
            ctx.insert("provider".into(), json!({ "id": self.config.provider_id }));
        }

        Ok(signed_payload(&context, &message, &self.keypair))
    }

    async fn send_callback(&self, request: &Value, callback: Action) -> Result<TransportResponse> {
        let bap_uri = request
            .pointer("/context/bap_uri")
            .and_then(Value::as_str)
            .ok_or_else(|| IssuerError::InvalidRequest("context missing bap_uri".into()))?;
        let payload = self.callback_payload(request, callback, Utc::now()).await?;
        let url = format!("{}/{}", bap_uri.trim_end_matches('/'), callback);
        Ok(self.transport.post(&url, &payload).await?)
    }

    /// Look up an issued certificate.
    pub async fn verify_certificate(&self, certificate_id: Option<&str>) -> Result<Value> {
        let Some(id) = certificate_id.filter(|id| !id.is_empty()) else {
            return Ok(json!({ "verified": false }));
        };
        Ok(match self.records.certificate(id).await? {
            Some(cert) => json!({
                "verified": true,
                "certificate_id": cert.certificate_id,
                "degree": cert.degree,
            }),
            None => json!({ "verified": false }),
        })
    }
}

fn order_id(request: &Value) -> Option<&str> {
    ["/message/order_id", "/message/order/id"]
        .iter()
        .find_map(|p| request.pointer(p).and_then(Value::as_str))
        .filter(|id| !id.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{AcademicSeed, MemoryRecords};
    use skillgraph_protocol::transport::memory::MemoryTransport;
    use skillgraph_protocol::{verify_inbound, TrustRegistry};

    struct OneIssuer(Issuer);

    #[async_trait::async_trait]
    impl TrustRegistry for OneIssuer {
        async fn resolve(&self, id: &IssuerId) -> skillgraph_protocol::Result<Option<Issuer>> {
            Ok((id == &self.0.id).then(|| self.0.clone()))
        }
    }

    fn provider(transport: Arc<MemoryTransport>) -> Arc<Provider> {
        Arc::new(Provider::new(
            ProviderConfig::default(),
            Keypair::from_seed(&[9u8; 32]),
            Arc::new(MemoryRecords::from_seed(AcademicSeed::demo())),
            transport,
        ))
    }

    fn confirm_request(skill: &str, student: &str) -> Value {
        json!({"message": {"order": {"items": [{"id": skill, "tags": {"student_id": student}}]}}})
    }

    #[tokio::test]
    async fn test_confirm_reports_verdict_in_tags() {
        let provider = provider(MemoryTransport::new());
        let response = provider.confirm(&confirm_request("React", "STU001")).await.unwrap();
        let tags = &response["message"]["order"]["items"][0]["tags"];
        assert_eq!(tags["verified"], true);
        assert_eq!(tags["nsqf_level"], 7);
        assert_eq!(tags["confidence"], 78);
        assert!(tags.get("reason").is_none());

        let response = provider.confirm(&confirm_request("COBOL", "STU001")).await.unwrap();
        let tags = &response["message"]["order"]["items"][0]["tags"];
        assert_eq!(tags["verified"], false);
        assert_eq!(tags["reason"], "SKILL_NOT_RECOGNIZED_BY_UNIVERSITY");
        assert!(tags["certificate_id"].is_null());
    }

    #[tokio::test]
    async fn test_confirm_rejects_malformed_orders() {
        let provider = provider(MemoryTransport::new());
        assert!(matches!(
            provider.confirm(&json!({"message": {"order": {"items": []}}})).await,
            Err(IssuerError::InvalidRequest(_))
        ));
        assert!(matches!(
            provider
                .confirm(&json!({"message": {"order": {"items": [{"id": "React"}]}}}))
                .await,
            Err(IssuerError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_search_sends_signed_catalog() {
        let transport = MemoryTransport::new();
        transport
            .route_fn("http://bap/api/beckn/on_search", |_| {
                TransportResponse::ok(json!({"message": {"ack": {"status": "ACK"}}}))
            })
            .await;
        let provider = provider(transport.clone());

        let request = json!({
            "context": {"action": "search", "transaction_id": "t1", "message_id": "m1",
                        "bap_uri": "http://bap/api/beckn"},
            "message": {"intent": {"item": {"descriptor": {"name": "react"}}}}
        });
        let (ack, handle) = provider.search(request).unwrap();
        assert!(ack.is_ack());
        handle.await.unwrap();

        let sent = transport.sent().await;
        assert_eq!(sent.len(), 1);
        let payload = &sent[0].1;
        assert_eq!(payload["context"]["action"], "on_search");
        assert_eq!(payload["context"]["transaction_id"], "t1");
        assert_eq!(payload["message"]["catalog"]["providers"][0]["items"][0]["id"], "React");

        let registry = OneIssuer(provider.registry_entry());
        assert!(verify_inbound(&registry, payload).await.is_ok());
    }

    #[tokio::test]
    async fn test_select_quotes_known_and_unknown_items() {
        let transport = MemoryTransport::new();
        transport
            .route_fn("http://bap/api/beckn/on_select", |_| TransportResponse::ok(json!({})))
            .await;
        let provider = provider(transport.clone());

        let request = json!({
            "context": {"action": "select", "transaction_id": "t2", "message_id": "m2",
                        "bap_uri": "http://bap/api/beckn"},
            "message": {"order": {"provider": {"id": "UNI001"},
                                   "items": [{"id": "react"}, {"id": "COBOL"}]}}
        });
        let (ack, handle) = provider.select(request).unwrap();
        assert!(ack.is_ack());
        handle.await.unwrap();

        let sent = transport.sent().await;
        let payload = &sent[0].1;
        assert_eq!(sent[0].0, "http://bap/api/beckn/on_select");
        assert_eq!(payload["context"]["action"], "on_select");
        let items = &payload["message"]["order"]["items"];
        assert_eq!(items[0]["tags"]["available"], true);
        assert_eq!(items[0]["tags"]["subject_code"], "CS301");
        assert_eq!(items[1]["tags"]["available"], false);

        let registry = OneIssuer(provider.registry_entry());
        assert!(verify_inbound(&registry, payload).await.is_ok());

        assert!(provider
            .select(json!({"context": {"bap_uri": "http://bap"}, "message": {"order": {"items": []}}}))
            .is_err());
    }

    #[tokio::test]
    async fn test_status_reports_certificate_orders() {
        let transport = MemoryTransport::new();
        transport
            .route_fn("http://bap/api/beckn/on_status", |_| TransportResponse::ok(json!({})))
            .await;
        let provider = provider(transport.clone());
        let response = provider.confirm(&confirm_request("React", "STU001")).await.unwrap();
        let certificate_id = response["message"]["order"]["items"][0]["tags"]["certificate_id"]
            .as_str()
            .unwrap()
            .to_string();

        for id in [certificate_id.as_str(), "unknown-order"] {
            let request = json!({
                "context": {"action": "status", "transaction_id": "t3", "message_id": "m3",
                            "bap_uri": "http://bap/api/beckn"},
                "message": {"order_id": id}
            });
            let (_, handle) = provider.status(request).unwrap();
            handle.await.unwrap();
        }

        let sent = transport.sent().await;
        assert_eq!(sent[0].1["message"]["order"]["state"], "COMPLETED");
        assert_eq!(
            sent[0].1["message"]["order"]["fulfillment"]["certificate_id"],
            certificate_id.as_str()
        );
        assert_eq!(sent[1].1["message"]["order"]["state"], "NOT_FOUND");

        assert!(provider
            .status(json!({"context": {"bap_uri": "http://bap"}, "message": {}}))
            .is_err());
    }

    #[tokio::test]
    async fn test_search_requires_callback_uri() {
        let provider = provider(MemoryTransport::new());
        assert!(provider.search(json!({"context": {}})).is_err());
    }

    #[tokio::test]
    async fn test_certificate_lookup() {
        let provider = provider(MemoryTransport::new());
        let response = provider.confirm(&confirm_request("React", "STU001")).await.unwrap();
        let id = response["message"]["order"]["items"][0]["tags"]["certificate_id"]
            .as_str()
            .unwrap()
            .to_string();

        let found = provider.verify_certificate(Some(&id)).await.unwrap();
        assert_eq!(found["verified"], true);
        assert_eq!(found["degree"], "B.Tech Computer Science");

        assert_eq!(
            provider.verify_certificate(Some("nope")).await.unwrap(),
            json!({"verified": false})
        );
        assert_eq!(
            provider.verify_certificate(None).await.unwrap(),
            json!({"verified": false})
        );
    }
}
