//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use skillgraph_core::{
    Action, CandidateId, CandidateSkillGraph, Credential, CredentialId, Issuer, IssuerId, Role,
    Skill, TransactionLog, VerificationLog, VerificationStatus, WorkflowId,
};

use crate::error::Result;
use crate::traits::{credential_order, InsertResult, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    credentials: HashMap<CredentialId, Credential>,

    /// Skills indexed by normalized key.
    skills: HashMap<String, Skill>,

    /// Graphs ordered by candidate id.
    graphs: BTreeMap<CandidateId, CandidateSkillGraph>,

    issuers: HashMap<IssuerId, Issuer>,

    /// Transaction logs in append order.
    transactions: Vec<TransactionLog>,

    verification_logs: HashMap<WorkflowId, VerificationLog>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_credential(&self, credential: &Credential) -> Result<InsertResult> {
        let mut inner = self.inner.write().await;
        if inner.credentials.contains_key(&credential.id) {
            return Ok(InsertResult::AlreadyExists);
        }
        inner
            .credentials
            .insert(credential.id.clone(), credential.clone());
        Ok(InsertResult::Inserted)
    }

    async fn get_credential(&self, id: &CredentialId) -> Result<Option<Credential>> {
        Ok(self.inner.read().await.credentials.get(id).cloned())
    }

    async fn delete_credential(&self, id: &CredentialId) -> Result<bool> {
        Ok(self.inner.write().await.credentials.remove(id).is_some())
    }

    async fn credentials_for_candidate(
        &self,
        candidate_id: &CandidateId,
        statuses: &[VerificationStatus],
    ) -> Result<Vec<Credential>> {
        let inner = self.inner.read().await;
        let mut found: Vec<Credential> = inner
            .credentials
            .values()
            .filter(|c| &c.candidate_id == candidate_id)
            .filter(|c| statuses.contains(&c.verification_status))
            .cloned()
            .collect();
        found.sort_by(credential_order);
        Ok(found)
    }

    async fn set_credential_status(
        &self,
        id: &CredentialId,
        status: VerificationStatus,
        verified_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.credentials.get_mut(id) {
            Some(credential) => {
                credential.verification_status = status;
                if verified_at.is_some() {
                    credential.verified_at = verified_at;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_pending_verified(
        &self,
        candidate_id: &CandidateId,
        at: DateTime<Utc>,
    ) -> Result<usize> {
        let mut inner = self.inner.write().await;
        let mut updated = 0;
        for credential in inner.credentials.values_mut() {
            if &credential.candidate_id == candidate_id
                && credential.verification_status == VerificationStatus::Pending
            {
                credential.verification_status = VerificationStatus::Verified;
                credential.verified_at = Some(at);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn expired_credentials(&self, now: DateTime<Utc>) -> Result<Vec<Credential>> {
        let inner = self.inner.read().await;
        let mut expired: Vec<Credential> = inner
            .credentials
            .values()
            .filter(|c| c.verification_status == VerificationStatus::Verified && c.is_expired(now))
            .cloned()
            .collect();
        expired.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(expired)
    }

    async fn find_or_create_skill(&self, skill: &Skill) -> Result<Skill> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .skills
            .entry(skill.normalized_key.clone())
            .or_insert_with(|| skill.clone());
        Ok(stored.clone())
    }

    async fn get_skill_by_key(&self, normalized_key: &str) -> Result<Option<Skill>> {
        Ok(self.inner.read().await.skills.get(normalized_key).cloned())
    }

    async fn upsert_skill_graph(&self, graph: &CandidateSkillGraph) -> Result<()> {
        self.inner
            .write()
            .await
            .graphs
            .insert(graph.candidate_id.clone(), graph.clone());
        Ok(())
    }

    async fn get_skill_graph(
        &self,
        candidate_id: &CandidateId,
    ) -> Result<Option<CandidateSkillGraph>> {
        Ok(self.inner.read().await.graphs.get(candidate_id).cloned())
    }

    async fn list_skill_graphs(&self) -> Result<Vec<CandidateSkillGraph>> {
        Ok(self.inner.read().await.graphs.values().cloned().collect())
    }

    async fn upsert_issuer(&self, issuer: &Issuer) -> Result<()> {
        self.inner
            .write()
            .await
            .issuers
            .insert(issuer.id.clone(), issuer.clone());
        Ok(())
    }

    async fn get_issuer(&self, id: &IssuerId) -> Result<Option<Issuer>> {
        Ok(self.inner.read().await.issuers.get(id).cloned())
    }

    async fn append_transaction_log(&self, log: &TransactionLog) -> Result<()> {
        self.inner.write().await.transactions.push(log.clone());
        Ok(())
    }

    async fn latest_transaction_log(
        &self,
        transaction_id: &str,
        action: Action,
        role: Role,
    ) -> Result<Option<TransactionLog>> {
        let inner = self.inner.read().await;
        Ok(inner
            .transactions
            .iter()
            .rev()
            .find(|l| l.transaction_id == transaction_id && l.action == action && l.role == role)
            .cloned())
    }

    async fn transaction_logs(&self, transaction_id: &str) -> Result<Vec<TransactionLog>> {
        let inner = self.inner.read().await;
        Ok(inner
            .transactions
            .iter()
            .filter(|l| l.transaction_id == transaction_id)
            .cloned()
            .collect())
    }

    async fn save_verification_log(&self, log: &VerificationLog) -> Result<()> {
        self.inner
            .write()
            .await
            .verification_logs
            .insert(log.workflow_id.clone(), log.clone());
        Ok(())
    }

    async fn get_verification_log(&self, id: &WorkflowId) -> Result<Option<VerificationLog>> {
        Ok(self.inner.read().await.verification_logs.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{credential, skill};
    use chrono::Duration;

    #[tokio::test]
    async fn test_credentials_newest_first_with_status_filter() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let c = CandidateId::new("cand");

        let old = credential("a", &c, now - Duration::days(10), VerificationStatus::Verified);
        let new = credential("b", &c, now, VerificationStatus::Pending);
        let revoked = credential("c", &c, now, VerificationStatus::Revoked);
        for cred in [&old, &new, &revoked] {
            assert_eq!(store.insert_credential(cred).await.unwrap(), InsertResult::Inserted);
        }
        assert_eq!(
            store.insert_credential(&old).await.unwrap(),
            InsertResult::AlreadyExists
        );

        let found = store
            .credentials_for_candidate(
                &c,
                &[VerificationStatus::Verified, VerificationStatus::Pending],
            )
            .await
            .unwrap();
        let ids: Vec<&str> = found.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_find_or_create_skill_is_idempotent() {
        let store = MemoryStore::new();
        let first = store.find_or_create_skill(&skill("s1", "react")).await.unwrap();
        let second = store.find_or_create_skill(&skill("s2", "react")).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.id.as_str(), "s1");
    }

    #[tokio::test]
    async fn test_latest_transaction_log_is_last_appended() {
        let store = MemoryStore::new();
        let mut log = crate::testutil::transaction_log("t1", Action::OnSearch, Role::Bpp);
        store.append_transaction_log(&log).await.unwrap();
        log.message_id = "second".into();
        store.append_transaction_log(&log).await.unwrap();

        let latest = store
            .latest_transaction_log("t1", Action::OnSearch, Role::Bpp)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.message_id, "second");
        assert!(store
            .latest_transaction_log("t1", Action::OnSearch, Role::Bap)
            .await
            .unwrap()
            .is_none());
    }
}
