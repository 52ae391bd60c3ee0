//! Verification workflows on the requester side.
//!
//! Presentation checks, QR verification, registry and revocation lookups,
//! and the candidate verification workflow with its audit log.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use skillgraph_core::{
    decode_qr, CandidateId, CandidateSubject, CredentialId, PresentationEngine, QrPayload,
    SkillNode, StepStatus, VerificationLog, VerificationReport, VerificationStatus, WorkflowId,
};
use skillgraph_store::Store;

use crate::aggregation::{SkillGraphService, CONTRIBUTING};
use crate::error::{Result, ServiceError};

/// Workflow type recorded on candidate verification logs.
pub const CANDIDATE_WORKFLOW: &str = "verification_request";

/// Registry check outcomes that are not a registry-provided status.
pub mod registry_status {
    pub const SKIPPED: &str = "skipped_registry_check";
    pub const ACTIVE: &str = "active";
    pub const FALLBACK_SIGNATURE: &str = "registry_unavailable_fallback_signature";
    pub const UNAVAILABLE: &str = "registry_unavailable";
}

/// What to conclude when the registry cannot be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Trust the local signature check.
    #[default]
    FailOpen,
    /// Treat the credential as unverifiable.
    FailClosed,
}

/// Outcome of a registry lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCheck {
    pub valid: bool,
    pub status: String,
}

impl RegistryCheck {
    fn new(valid: bool, status: impl Into<String>) -> Self {
        Self {
            valid,
            status: status.into(),
        }
    }
}

/// A registry's raw answer.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryAnswer {
    pub status: u16,
    pub body: Value,
}

/// Client for the external credential registry.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Fetch the registry record for a credential.
    ///
    /// Errors only when the registry could not be reached.
    async fn lookup(&self, credential_id: &str) -> std::result::Result<RegistryAnswer, String>;
}

/// How long a registry lookup may take before it counts as unreachable.
pub const DEFAULT_REGISTRY_TIMEOUT: Duration = Duration::from_secs(10);

/// Registry client over HTTP: `GET {base}/credentials/{id}`.
#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpRegistryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn lookup(&self, credential_id: &str) -> std::result::Result<RegistryAnswer, String> {
        let url = format!(
            "{}/credentials/{}",
            self.base_url.trim_end_matches('/'),
            credential_id
        );
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.json().await.unwrap_or(Value::Null);
        Ok(RegistryAnswer { status, body })
    }
}

/// Result of checking a scanned QR code.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrVerification {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Which decoder recognized the input.
    pub format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_id: Option<CandidateId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl QrVerification {
    fn invalid(format: &'static str, reason: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            format,
            candidate_id: None,
            credential: None,
            verification_method: None,
            network_status: None,
            details: None,
            timestamp: now,
        }
    }

    fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationStatus {
    pub credential_id: CredentialId,
    pub is_revoked: bool,
    /// `active` or `revoked`.
    pub status: &'static str,
    pub registry_status: String,
    pub last_checked: DateTime<Utc>,
}

/// Result of a successful candidate verification workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateVerification {
    pub workflow_id: WorkflowId,
    pub candidate_id: CandidateId,
    pub candidate_name: String,
    pub verification_status: VerificationStatus,
    pub timestamp: DateTime<Utc>,
    pub skill_count: usize,
    pub overall_score: f64,
    pub skills: Vec<SkillNode>,
    pub verifiable_presentation: Value,
}

type StepError = (&'static str, ServiceError);

pub struct VerificationService {
    store: Arc<dyn Store>,
    graphs: SkillGraphService,
    presentations: PresentationEngine,
    registry: Option<Arc<dyn RegistryClient>>,
    fallback: FallbackPolicy,
    registry_timeout: Duration,
}

impl VerificationService {
    pub fn new(
        store: Arc<dyn Store>,
        graphs: SkillGraphService,
        presentations: PresentationEngine,
    ) -> Self {
        Self {
            store,
            graphs,
            presentations,
            registry: None,
            fallback: FallbackPolicy::default(),
            registry_timeout: DEFAULT_REGISTRY_TIMEOUT,
        }
    }

    pub fn with_registry(mut self, client: Arc<dyn RegistryClient>, fallback: FallbackPolicy) -> Self {
        self.registry = Some(client);
        self.fallback = fallback;
        self
    }

    /// Bound every registry lookup, whatever the client does.
    pub fn with_registry_timeout(mut self, timeout: Duration) -> Self {
        self.registry_timeout = timeout;
        self
    }

    pub fn presentations(&self) -> &PresentationEngine {
        &self.presentations
    }

    /// Diagnose an externally supplied presentation or credential.
    pub fn verify_presentation(&self, document: &Value) -> VerificationReport {
        self.presentations.verify_arbitrary(document, Utc::now())
    }

    /// Signed presentation of the candidate's current graph.
    pub async fn presentation_for(&self, subject: &CandidateSubject) -> Result<Value> {
        let graph = self
            .graphs
            .get(&subject.id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("skill graph for {}", subject.id)))?;
        Ok(self.presentations.generate(subject, &graph.skills, Utc::now())?)
    }

    /// Ask the registry about a credential, applying the fallback policy.
    pub async fn registry_check(&self, credential_id: &str) -> RegistryCheck {
        let Some(registry) = &self.registry else {
            return RegistryCheck::new(true, registry_status::SKIPPED);
        };

        let answer = tokio::time::timeout(self.registry_timeout, registry.lookup(credential_id))
            .await
            .unwrap_or_else(|_| Err("registry lookup timed out".to_string()));
        match answer {
            Ok(answer) if answer.status == 200 => {
                let status = answer
                    .body
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or(registry_status::ACTIVE);
                RegistryCheck::new(status == registry_status::ACTIVE, status)
            }
            Ok(answer) => RegistryCheck::new(false, format!("http_error_{}", answer.status)),
            Err(e) => {
                tracing::warn!(credential_id, error = %e, policy = ?self.fallback, "registry unreachable");
                match self.fallback {
                    FallbackPolicy::FailOpen => {
                        RegistryCheck::new(true, registry_status::FALLBACK_SIGNATURE)
                    }
                    FallbackPolicy::FailClosed => {
                        RegistryCheck::new(false, registry_status::UNAVAILABLE)
                    }
                }
            }
        }
    }

    /// Verify the text decoded from a QR code.
    pub async fn verify_qr(&self, raw: &str) -> QrVerification {
        let now = Utc::now();
        let decoded = decode_qr(raw);
        let format = decoded.kind();

        let Some(document) = decoded.json() else {
            return QrVerification::invalid(format, "Invalid QR format: Not a valid JSON", now);
        };

        if let Some(raw_expiry) = document.get("expirationDate").and_then(Value::as_str) {
            match parse_date(raw_expiry) {
                Some(expiry) if expiry < now => {
                    return QrVerification::invalid(format, "Credential expired", now)
                        .with_details(json!({ "expirationDate": raw_expiry }));
                }
                Some(_) => {}
                None => {
                    return QrVerification::invalid(format, "Invalid expiration date", now)
                        .with_details(json!({ "expirationDate": raw_expiry }));
                }
            }
        }

        if document.pointer("/proof/proofValue").is_some() && !self.presentations.verify(document) {
            return QrVerification::invalid(format, "Invalid signature", now);
        }

        let candidate_id = serde_json::from_value::<QrPayload>(document.clone())
            .ok()
            .map(|p| p.candidate_id);

        let network_status = if issued_on_network(document) {
            let Some(id) = ["id", "credentialId"]
                .iter()
                .find_map(|k| document.get(*k).and_then(Value::as_str))
                .filter(|id| !id.trim().is_empty())
            else {
                return QrVerification::invalid(format, "Missing credential id", now);
            };
            let check = self.registry_check(id).await;
            if !check.valid {
                return QrVerification::invalid(format, "Registry verification failed", now)
                    .with_details(json!(check));
            }
            check.status
        } else {
            "skipped".to_string()
        };

        let verification_method = if network_status == registry_status::ACTIVE {
            "onest_registry"
        } else {
            "digital_signature"
        };

        QrVerification {
            valid: true,
            reason: None,
            format,
            candidate_id,
            credential: Some(document.clone()),
            verification_method: Some(verification_method.to_string()),
            network_status: Some(network_status),
            details: None,
            timestamp: now,
        }
    }

    /// Revocation status from the local record and the registry.
    pub async fn check_revocation(&self, credential_id: &CredentialId) -> Result<RevocationStatus> {
        let locally_revoked = self
            .store
            .get_credential(credential_id)
            .await?
            .is_some_and(|c| c.verification_status == VerificationStatus::Revoked);
        let check = self.registry_check(credential_id.as_str()).await;
        let is_revoked = locally_revoked || !check.valid;

        Ok(RevocationStatus {
            credential_id: credential_id.clone(),
            is_revoked,
            status: if is_revoked { "revoked" } else { "active" },
            registry_status: check.status,
            last_checked: Utc::now(),
        })
    }

    /// Verify a candidate's pending credentials and re-issue their graph.
    ///
    /// Every run is recorded as a [`VerificationLog`]. On failure the log is
    /// closed as failed and the error is returned with the workflow id.
    pub async fn verify_candidate(
        &self,
        subject: &CandidateSubject,
    ) -> Result<CandidateVerification> {
        let started = Utc::now();
        let mut log = VerificationLog::new(subject.id.clone(), CANDIDATE_WORKFLOW, started);
        log.start()?;
        log.record_step(
            "initiate",
            StepStatus::Completed,
            json!({ "candidateId": subject.id }),
            None,
            started,
        )?;
        self.store.save_verification_log(&log).await?;

        match self.run_candidate_workflow(subject, &mut log).await {
            Ok(result) => {
                log.complete(Utc::now())?;
                self.store.save_verification_log(&log).await?;
                tracing::info!(
                    workflow_id = %log.workflow_id,
                    candidate_id = %subject.id,
                    skills = result.skill_count,
                    "candidate verified"
                );
                Ok(result)
            }
            Err((step, e)) => {
                let now = Utc::now();
                let message = e.to_string();
                log.record_step(step, StepStatus::Failed, Value::Null, Some(message.clone()), now)?;
                log.fail(message.clone(), now)?;
                self.store.save_verification_log(&log).await?;
                tracing::warn!(
                    workflow_id = %log.workflow_id,
                    candidate_id = %subject.id,
                    step,
                    error = %message,
                    "candidate verification failed"
                );
                Err(ServiceError::Workflow {
                    workflow_id: log.workflow_id.clone(),
                    message,
                })
            }
        }
    }

    async fn run_candidate_workflow(
        &self,
        subject: &CandidateSubject,
        log: &mut VerificationLog,
    ) -> std::result::Result<CandidateVerification, StepError> {
        let candidate_id = &subject.id;

        const LOAD: &str = "load_credentials";
        let credentials = self
            .store
            .credentials_for_candidate(candidate_id, &CONTRIBUTING)
            .await
            .map_err(|e| (LOAD, ServiceError::from(e)))?;
        if credentials.is_empty() {
            return Err((
                LOAD,
                ServiceError::NotFound(format!("no credentials for candidate {}", candidate_id)),
            ));
        }
        step(log, LOAD, json!({ "credentialCount": credentials.len() }))?;

        const MARK: &str = "mark_verified";
        let now = Utc::now();
        let updated = self
            .store
            .mark_pending_verified(candidate_id, now)
            .await
            .map_err(|e| (MARK, ServiceError::from(e)))?;
        step(log, MARK, json!({ "updated": updated }))?;

        const RECOMPUTE: &str = "recompute_skill_graph";
        let graph = self
            .graphs
            .on_credential_changed(candidate_id)
            .await
            .map_err(|e| (RECOMPUTE, e))?;
        step(
            log,
            RECOMPUTE,
            json!({ "skillCount": graph.skill_count, "overallScore": graph.overall_score }),
        )?;

        const PRESENT: &str = "generate_presentation";
        let now = Utc::now();
        let presentation = self
            .presentations
            .generate(subject, &graph.skills, now)
            .map_err(|e| (PRESENT, ServiceError::from(e)))?;
        step(log, PRESENT, json!({ "type": presentation["type"] }))?;

        Ok(CandidateVerification {
            workflow_id: log.workflow_id.clone(),
            candidate_id: candidate_id.clone(),
            candidate_name: subject.name.clone(),
            verification_status: VerificationStatus::Verified,
            timestamp: now,
            skill_count: graph.skill_count,
            overall_score: graph.overall_score,
            skills: graph.skills,
            verifiable_presentation: presentation,
        })
    }
}

fn step(log: &mut VerificationLog, name: &'static str, details: Value) -> std::result::Result<(), StepError> {
    log.record_step(name, StepStatus::Completed, details, None, Utc::now())
        .map_err(|e| (name, e.into()))
}

/// RFC 3339 timestamp or a bare `YYYY-MM-DD` date.
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Whether the document names a network issuer (ONEST or Beckn).
fn issued_on_network(document: &Value) -> bool {
    let issuer = match document.get("issuer") {
        Some(Value::String(s)) => s.clone(),
        Some(obj @ Value::Object(_)) => ["id", "name"]
            .iter()
            .filter_map(|k| obj.get(*k).and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(" "),
        _ => return false,
    };
    let issuer = issuer.to_lowercase();
    issuer.contains("onest") || issuer.contains("beckn")
}
