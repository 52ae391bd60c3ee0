//! Employer verification: confirm every required skill with the issuer.
//!
//! Each skill is an independent `confirm` call straight to the issuer's BPP
//! endpoint. Failures are per-skill results; nothing short-circuits.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use skillgraph_core::{Action, IssuerId};
use skillgraph_protocol::{envelope, BapIdentity, Context, Transport, TrustRegistry};

use crate::error::{Result, ServiceError};

pub const BPP_REJECTED_REQUEST: &str = "BPP_REJECTED_REQUEST";
pub const VERIFICATION_FAILED: &str = "VERIFICATION_FAILED";
pub const ISSUER_UNREACHABLE: &str = "ISSUER_UNREACHABLE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployerVerificationRequest {
    pub student_id: String,
    pub required_skills: Vec<String>,
    /// Issuer to ask; the configured default when absent.
    #[serde(default)]
    pub issuer_id: Option<String>,
}

/// Outcome for one required skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillCheck {
    pub skill: String,
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nsqf_level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<String>,
}

impl SkillCheck {
    fn rejected(skill: &str, reason: impl Into<String>) -> Self {
        Self {
            skill: skill.to_string(),
            verified: false,
            reason: Some(reason.into()),
            nsqf_level: None,
            confidence: None,
            certificate_id: None,
        }
    }

    /// Read the verdict from the issuer's confirm response tags.
    fn from_tags(skill: &str, tags: &Value) -> Self {
        let verified = tags.get("verified").and_then(Value::as_bool).unwrap_or(false);
        if !verified {
            let reason = tags
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or(VERIFICATION_FAILED);
            return Self::rejected(skill, reason);
        }
        Self {
            skill: skill.to_string(),
            verified: true,
            reason: None,
            nsqf_level: tags
                .get("nsqf_level")
                .and_then(Value::as_u64)
                .and_then(|n| u8::try_from(n).ok()),
            confidence: tags
                .get("confidence")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok()),
            certificate_id: tags
                .get("certificate_id")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Verified,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployerVerification {
    pub student_id: String,
    pub status: ApplicationStatus,
    pub verification_results: Vec<SkillCheck>,
}

pub struct EmployerVerifier {
    registry: Arc<dyn TrustRegistry>,
    transport: Arc<dyn Transport>,
    identity: BapIdentity,
    default_issuer: IssuerId,
}

impl EmployerVerifier {
    pub fn new(
        registry: Arc<dyn TrustRegistry>,
        transport: Arc<dyn Transport>,
        identity: BapIdentity,
        default_issuer: IssuerId,
    ) -> Self {
        Self {
            registry,
            transport,
            identity,
            default_issuer,
        }
    }

    pub async fn verify(
        &self,
        request: &EmployerVerificationRequest,
    ) -> Result<EmployerVerification> {
        if request.student_id.trim().is_empty() {
            return Err(ServiceError::InvalidRequest("studentId is required".into()));
        }
        if request.required_skills.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "requiredSkills must not be empty".into(),
            ));
        }

        let issuer_id = request
            .issuer_id
            .as_deref()
            .map(IssuerId::new)
            .unwrap_or_else(|| self.default_issuer.clone());
        let issuer = self
            .registry
            .resolve(&issuer_id)
            .await?
            .filter(|i| i.is_trusted())
            .ok_or_else(|| {
                ServiceError::IssuerUnavailable(format!("no trusted issuer {}", issuer_id))
            })?;

        let url = format!("{}/confirm", issuer.callback_uri.trim_end_matches('/'));
        let mut results = Vec::with_capacity(request.required_skills.len());
        for skill in &request.required_skills {
            results.push(self.check_skill(&url, &request.student_id, skill).await);
        }

        let status = if results.iter().all(|r| r.verified) {
            ApplicationStatus::Verified
        } else {
            ApplicationStatus::Failed
        };
        tracing::info!(
            student_id = %request.student_id,
            issuer = %issuer.id,
            ?status,
            "employer verification finished"
        );

        Ok(EmployerVerification {
            student_id: request.student_id.clone(),
            status,
            verification_results: results,
        })
    }

    async fn check_skill(&self, url: &str, student_id: &str, skill: &str) -> SkillCheck {
        let context = Context::new(&self.identity, Action::Confirm, None, Utc::now());
        let body = envelope(
            &context,
            json!({
                "order": {
                    "items": [{ "id": skill, "tags": { "student_id": student_id } }]
                }
            }),
        );

        match self.transport.post(url, &body).await {
            Ok(response) if response.status == 200 => {
                let tags = response
                    .body
                    .pointer("/message/order/items/0/tags")
                    .cloned()
                    .unwrap_or(Value::Null);
                SkillCheck::from_tags(skill, &tags)
            }
            Ok(response) => {
                tracing::warn!(skill, status = response.status, "issuer rejected confirm");
                SkillCheck::rejected(skill, BPP_REJECTED_REQUEST)
            }
            Err(e) => {
                tracing::warn!(skill, error = %e, "issuer unreachable");
                SkillCheck::rejected(skill, ISSUER_UNREACHABLE)
            }
        }
    }
}
