//! Domain types: credentials, skills, skill graphs, issuers and logs.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crypto::Ed25519PublicKey;
use crate::error::{CoreError, Result};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identifier of a candidate (credential holder).
    CandidateId
);
string_id!(
    /// Globally unique credential identifier.
    CredentialId
);
string_id!(
    /// Identifier of a trusted issuer in the registry.
    IssuerId
);
string_id!(
    /// Identifier of a canonical taxonomy skill.
    SkillId
);
string_id!(
    /// Identifier of one verification workflow run.
    WorkflowId
);

impl CredentialId {
    /// Fresh random credential id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl WorkflowId {
    /// Fresh random workflow id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Credentials
// ───────────────────────────────────────────────────────────────────────────

/// Kind of evidence a credential represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialType {
    Education,
    Certification,
    Assessment,
    Experience,
}

impl CredentialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialType::Education => "education",
            CredentialType::Certification => "certification",
            CredentialType::Assessment => "assessment",
            CredentialType::Experience => "experience",
        }
    }
}

/// Lifecycle of a credential's verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Failed,
    Revoked,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Failed => "failed",
            VerificationStatus::Revoked => "revoked",
        }
    }

    /// Whether credentials in this status feed the skill graph.
    pub fn contributes_to_graph(&self) -> bool {
        matches!(self, VerificationStatus::Pending | VerificationStatus::Verified)
    }
}

impl FromStr for VerificationStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(VerificationStatus::Pending),
            "verified" => Ok(VerificationStatus::Verified),
            "failed" => Ok(VerificationStatus::Failed),
            "revoked" => Ok(VerificationStatus::Revoked),
            other => Err(CoreError::DecodingError(format!(
                "unknown verification status: {}",
                other
            ))),
        }
    }
}

/// A single skill asserted by a credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillClaim {
    pub skill_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proficiency: Option<u32>,
}

impl SkillClaim {
    pub fn new(skill_name: impl Into<String>) -> Self {
        Self {
            skill_name: skill_name.into(),
            level: None,
            proficiency: None,
        }
    }
}

/// Reference to the authority that issued a credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuerRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<IssuerId>,
    pub name: String,
}

/// A claim held by a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub id: CredentialId,
    pub candidate_id: CandidateId,
    #[serde(rename = "type")]
    pub credential_type: CredentialType,
    pub issuer: IssuerRef,
    #[serde(default)]
    pub skills: Vec<SkillClaim>,
    pub issued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub verification_status: VerificationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub raw_data: Value,
}

impl Credential {
    /// Years of experience asserted in the raw payload, 0 if absent.
    pub fn experience_years(&self) -> f64 {
        self.raw_data
            .get("experienceYears")
            .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .unwrap_or(0.0)
    }

    /// Date used as the "verified" date of sources derived from this credential.
    pub fn source_date(&self) -> DateTime<Utc> {
        self.verified_at.unwrap_or(self.issued_at)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp < now)
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Taxonomy and skill graph
// ───────────────────────────────────────────────────────────────────────────

/// Broad grouping of a taxonomy skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillCategory {
    Technical,
    Soft,
    Domain,
    Language,
    Certification,
}

impl SkillCategory {
    pub const ALL: [SkillCategory; 5] = [
        SkillCategory::Technical,
        SkillCategory::Soft,
        SkillCategory::Domain,
        SkillCategory::Language,
        SkillCategory::Certification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SkillCategory::Technical => "technical",
            SkillCategory::Soft => "soft",
            SkillCategory::Domain => "domain",
            SkillCategory::Language => "language",
            SkillCategory::Certification => "certification",
        }
    }
}

/// A canonical taxonomy skill, keyed by its normalized name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub id: SkillId,
    pub name: String,
    pub normalized_key: String,
    pub category: SkillCategory,
    pub nsqf_level: u8,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

/// One credential's contribution to a skill node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillSource {
    pub credential_id: CredentialId,
    pub issuer_name: String,
    pub verified_date: DateTime<Utc>,
    pub weight: f64,
}

/// A scored skill within a candidate's graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillNode {
    pub skill_id: SkillId,
    pub skill_name: String,
    pub normalized_name: String,
    pub category: SkillCategory,
    pub nsqf_level: u8,
    pub proficiency: u32,
    pub recency_score: u32,
    pub sources: Vec<SkillSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_verified: Option<DateTime<Utc>>,
}

/// The per-candidate aggregate of all derived skills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSkillGraph {
    pub candidate_id: CandidateId,
    pub skills: Vec<SkillNode>,
    pub overall_score: f64,
    pub strength_areas: Vec<SkillCategory>,
    pub skill_count: usize,
    pub last_updated: DateTime<Utc>,
}

impl CandidateSkillGraph {
    /// Build a graph from scored nodes, deriving every aggregate field.
    pub fn from_nodes(
        candidate_id: CandidateId,
        skills: Vec<SkillNode>,
        now: DateTime<Utc>,
    ) -> Self {
        let overall_score = if skills.is_empty() {
            0.0
        } else {
            skills.iter().map(|n| n.proficiency as f64).sum::<f64>() / skills.len() as f64
        };
        let strength_areas = strength_areas(&skills);

        Self {
            candidate_id,
            skill_count: skills.len(),
            skills,
            overall_score,
            strength_areas,
            last_updated: now,
        }
    }

    /// Empty graph for a candidate with no contributing credentials.
    pub fn empty(candidate_id: CandidateId, now: DateTime<Utc>) -> Self {
        Self::from_nodes(candidate_id, Vec::new(), now)
    }

    pub fn node(&self, normalized_name: &str) -> Option<&SkillNode> {
        self.skills
            .iter()
            .find(|n| n.normalized_name == normalized_name)
    }
}

/// Top three categories ranked by the mean proficiency of their skills.
///
/// Ties keep the order of [`SkillCategory::ALL`].
pub fn strength_areas(skills: &[SkillNode]) -> Vec<SkillCategory> {
    let mut ranked: Vec<(SkillCategory, f64)> = SkillCategory::ALL
        .iter()
        .filter_map(|category| {
            let scores: Vec<f64> = skills
                .iter()
                .filter(|n| n.category == *category)
                .map(|n| n.proficiency as f64)
                .collect();
            if scores.is_empty() {
                None
            } else {
                Some((*category, scores.iter().sum::<f64>() / scores.len() as f64))
            }
        })
        .collect();

    // Stable sort keeps category order on ties.
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.into_iter().take(3).map(|(c, _)| c).collect()
}

// ───────────────────────────────────────────────────────────────────────────
// Trust registry
// ───────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssuerStatus {
    Trusted,
    Revoked,
}

/// A trust anchor: an issuer whose signed callbacks are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issuer {
    pub id: IssuerId,
    pub name: String,
    pub callback_uri: String,
    /// Base64 Ed25519 public key.
    pub public_key: String,
    pub status: IssuerStatus,
}

impl IssuerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssuerStatus::Trusted => "trusted",
            IssuerStatus::Revoked => "revoked",
        }
    }
}

impl Issuer {
    pub fn is_trusted(&self) -> bool {
        self.status == IssuerStatus::Trusted
    }

    /// Decode the registered public key.
    pub fn verifying_key(&self) -> Result<Ed25519PublicKey> {
        Ed25519PublicKey::from_base64(&self.public_key)
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Protocol transaction log
// ───────────────────────────────────────────────────────────────────────────

/// Protocol action carried in a message context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Search,
    OnSearch,
    Select,
    OnSelect,
    Confirm,
    OnConfirm,
    Status,
    OnStatus,
    Support,
    OnSupport,
}

impl Action {
    pub const OUTBOUND: [Action; 5] = [
        Action::Search,
        Action::Select,
        Action::Confirm,
        Action::Status,
        Action::Support,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Search => "search",
            Action::OnSearch => "on_search",
            Action::Select => "select",
            Action::OnSelect => "on_select",
            Action::Confirm => "confirm",
            Action::OnConfirm => "on_confirm",
            Action::Status => "status",
            Action::OnStatus => "on_status",
            Action::Support => "support",
            Action::OnSupport => "on_support",
        }
    }

    /// Whether this is a provider callback (`on_*`).
    pub fn is_callback(&self) -> bool {
        self.as_str().starts_with("on_")
    }

    /// The callback action answering this request action.
    pub fn callback(&self) -> Action {
        match self {
            Action::Search | Action::OnSearch => Action::OnSearch,
            Action::Select | Action::OnSelect => Action::OnSelect,
            Action::Confirm | Action::OnConfirm => Action::OnConfirm,
            Action::Status | Action::OnStatus => Action::OnStatus,
            Action::Support | Action::OnSupport => Action::OnSupport,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "search" => Action::Search,
            "on_search" => Action::OnSearch,
            "select" => Action::Select,
            "on_select" => Action::OnSelect,
            "confirm" => Action::Confirm,
            "on_confirm" => Action::OnConfirm,
            "status" => Action::Status,
            "on_status" => Action::OnStatus,
            "support" => Action::Support,
            "on_support" => Action::OnSupport,
            other => {
                return Err(CoreError::DecodingError(format!("unknown action: {}", other)))
            }
        })
    }
}

/// Which side of the exchange produced a logged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "BAP")]
    Bap,
    #[serde(rename = "BPP")]
    Bpp,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Bap => "BAP",
            Role::Bpp => "BPP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Initiated,
    Ack,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Initiated => "initiated",
            TransactionStatus::Ack => "ack",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }
}

/// Append-only record of one protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionLog {
    pub transaction_id: String,
    pub message_id: String,
    pub action: Action,
    pub role: Role,
    pub request: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    pub status: TransactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

// ───────────────────────────────────────────────────────────────────────────
// Verification workflow log
// ───────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::InProgress => "in_progress",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationStep {
    pub step_name: String,
    pub status: StepStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub details: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Record of one verification workflow run.
///
/// Steps can only be appended and the terminal status can only be set once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationLog {
    pub workflow_id: WorkflowId,
    pub candidate_id: CandidateId,
    pub workflow_type: String,
    status: WorkflowStatus,
    steps: Vec<VerificationStep>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerificationLog {
    pub fn new(
        candidate_id: CandidateId,
        workflow_type: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            workflow_id: WorkflowId::generate(),
            candidate_id,
            workflow_type: workflow_type.into(),
            status: WorkflowStatus::Pending,
            steps: Vec::new(),
            started_at: now,
            completed_at: None,
            duration_ms: None,
            error: None,
        }
    }

    pub fn status(&self) -> WorkflowStatus {
        self.status
    }

    pub fn steps(&self) -> &[VerificationStep] {
        &self.steps
    }

    fn ensure_open(&self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(CoreError::WorkflowFinalized(self.workflow_id.0.clone()));
        }
        Ok(())
    }

    /// Move from pending to in-progress.
    pub fn start(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.status = WorkflowStatus::InProgress;
        Ok(())
    }

    /// Append a step.
    pub fn record_step(
        &mut self,
        step_name: impl Into<String>,
        status: StepStatus,
        details: Value,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_open()?;
        self.steps.push(VerificationStep {
            step_name: step_name.into(),
            status,
            timestamp: now,
            details,
            error,
        });
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.finish(WorkflowStatus::Completed, None, now)
    }

    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        self.finish(WorkflowStatus::Failed, Some(error.into()), now)
    }

    fn finish(
        &mut self,
        status: WorkflowStatus,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_open()?;
        self.status = status;
        self.error = error;
        self.completed_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds());
        Ok(())
    }
}
