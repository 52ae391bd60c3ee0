//! Store trait: the abstract interface for SkillGraph persistence.
//!
//! Everything above this crate treats storage as a document store with a
//! handful of query shapes. Implementations include SQLite (primary) and
//! in-memory (for tests).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use skillgraph_core::{
    Action, CandidateId, CandidateSkillGraph, Credential, CredentialId, Issuer, IssuerId, Role,
    Skill, TransactionLog, VerificationLog, VerificationStatus, WorkflowId,
};

use crate::error::Result;

/// Result of inserting a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// Credential was inserted.
    Inserted,
    /// A credential with the same id already exists (not an error).
    AlreadyExists,
}

/// The Store trait: async interface for all persisted documents.
///
/// # Design Notes
///
/// - **Graph writes are last-writer-wins**: `upsert_skill_graph` replaces the
///   whole document and takes no lock across a recompute.
/// - **Atomic skill creation**: `find_or_create_skill` never creates two rows
///   for one normalized key.
/// - **Append-only logs**: transaction logs are never updated; "latest" means
///   most recently appended.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Credentials
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a credential. Idempotent on credential id.
    async fn insert_credential(&self, credential: &Credential) -> Result<InsertResult>;

    /// Get a credential by id.
    async fn get_credential(&self, id: &CredentialId) -> Result<Option<Credential>>;

    /// Delete a credential. Returns whether it existed.
    async fn delete_credential(&self, id: &CredentialId) -> Result<bool>;

    /// A candidate's credentials whose status is in `statuses`.
    ///
    /// Ordered newest issued first, ties broken by credential id.
    async fn credentials_for_candidate(
        &self,
        candidate_id: &CandidateId,
        statuses: &[VerificationStatus],
    ) -> Result<Vec<Credential>>;

    /// Set a credential's status. Returns whether the credential exists.
    async fn set_credential_status(
        &self,
        id: &CredentialId,
        status: VerificationStatus,
        verified_at: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    /// Mark every pending credential of a candidate as verified at `at`.
    ///
    /// Returns the number of credentials updated.
    async fn mark_pending_verified(
        &self,
        candidate_id: &CandidateId,
        at: DateTime<Utc>,
    ) -> Result<usize>;

    /// Verified credentials whose expiry lies before `now`.
    async fn expired_credentials(&self, now: DateTime<Utc>) -> Result<Vec<Credential>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Skill taxonomy
    // ─────────────────────────────────────────────────────────────────────────

    /// Return the skill stored under `skill.normalized_key`, inserting
    /// `skill` first if none exists.
    async fn find_or_create_skill(&self, skill: &Skill) -> Result<Skill>;

    /// Get a skill by normalized key.
    async fn get_skill_by_key(&self, normalized_key: &str) -> Result<Option<Skill>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Skill graphs
    // ─────────────────────────────────────────────────────────────────────────

    /// Replace the candidate's graph document.
    async fn upsert_skill_graph(&self, graph: &CandidateSkillGraph) -> Result<()>;

    /// Get the candidate's graph.
    async fn get_skill_graph(&self, candidate_id: &CandidateId)
        -> Result<Option<CandidateSkillGraph>>;

    /// All graphs, ordered by candidate id.
    async fn list_skill_graphs(&self) -> Result<Vec<CandidateSkillGraph>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Issuers (trust registry)
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or replace an issuer.
    async fn upsert_issuer(&self, issuer: &Issuer) -> Result<()>;

    /// Get an issuer by id.
    async fn get_issuer(&self, id: &IssuerId) -> Result<Option<Issuer>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Protocol transaction logs
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a log row.
    async fn append_transaction_log(&self, log: &TransactionLog) -> Result<()>;

    /// Most recently appended row for `(transaction_id, action, role)`.
    async fn latest_transaction_log(
        &self,
        transaction_id: &str,
        action: Action,
        role: Role,
    ) -> Result<Option<TransactionLog>>;

    /// All rows of a transaction in append order.
    async fn transaction_logs(&self, transaction_id: &str) -> Result<Vec<TransactionLog>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Verification workflow logs
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or replace a workflow log.
    async fn save_verification_log(&self, log: &VerificationLog) -> Result<()>;

    /// Get a workflow log by id.
    async fn get_verification_log(&self, id: &WorkflowId) -> Result<Option<VerificationLog>>;
}

/// Sort key shared by every backend for candidate credential queries.
pub(crate) fn credential_order(a: &Credential, b: &Credential) -> std::cmp::Ordering {
    b.issued_at
        .cmp(&a.issued_at)
        .then_with(|| a.id.cmp(&b.id))
}
