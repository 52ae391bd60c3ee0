//! Credential lifecycle. Every change re-aggregates the owner's graph.

use std::sync::Arc;

use chrono::Utc;

use skillgraph_core::{CandidateSkillGraph, Credential, CredentialId, VerificationStatus};
use skillgraph_store::{InsertResult, Store};

use crate::aggregation::SkillGraphService;
use crate::error::{Result, ServiceError};

#[derive(Clone)]
pub struct CredentialService {
    store: Arc<dyn Store>,
    graphs: SkillGraphService,
}

impl CredentialService {
    pub fn new(store: Arc<dyn Store>, graphs: SkillGraphService) -> Self {
        Self { store, graphs }
    }

    /// Store a submitted credential and refresh the owner's graph.
    pub async fn add(&self, credential: &Credential) -> Result<(InsertResult, CandidateSkillGraph)> {
        let inserted = self.store.insert_credential(credential).await?;
        let graph = self
            .graphs
            .on_credential_changed(&credential.candidate_id)
            .await?;
        Ok((inserted, graph))
    }

    /// Delete a credential and refresh the owner's graph.
    pub async fn remove(&self, id: &CredentialId) -> Result<CandidateSkillGraph> {
        let credential = self.get(id).await?;
        self.store.delete_credential(id).await?;
        tracing::info!(credential_id = %id, candidate_id = %credential.candidate_id, "deleted credential");
        self.graphs
            .on_credential_changed(&credential.candidate_id)
            .await
    }

    /// Change a credential's status and refresh the owner's graph.
    pub async fn set_status(
        &self,
        id: &CredentialId,
        status: VerificationStatus,
    ) -> Result<CandidateSkillGraph> {
        let credential = self.get(id).await?;
        let verified_at = (status == VerificationStatus::Verified).then(Utc::now);
        self.store.set_credential_status(id, status, verified_at).await?;
        tracing::info!(credential_id = %id, status = status.as_str(), "credential status changed");
        self.graphs
            .on_credential_changed(&credential.candidate_id)
            .await
    }

    pub async fn get(&self, id: &CredentialId) -> Result<Credential> {
        self.store
            .get_credential(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("credential {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillgraph_core::CandidateId;
    use skillgraph_store::MemoryStore;
    use skillgraph_testkit::fixtures;

    #[tokio::test]
    async fn test_revoking_sole_source_removes_skill() {
        let store = Arc::new(MemoryStore::new());
        let service = CredentialService::new(store.clone(), SkillGraphService::new(store));
        let cand = CandidateId::new("cand-1");
        let now = Utc::now();

        service
            .add(&fixtures::credential("c1", &cand, &["React", "SQL"], now))
            .await
            .unwrap();
        let (_, graph) = service
            .add(&fixtures::credential("c2", &cand, &["SQL"], now))
            .await
            .unwrap();
        assert_eq!(graph.skill_count, 2);

        let graph = service
            .set_status(&CredentialId::new("c1"), VerificationStatus::Revoked)
            .await
            .unwrap();
        assert_eq!(graph.skill_count, 1);
        assert!(graph.node("react").is_none());

        let graph = service.remove(&CredentialId::new("c2")).await.unwrap();
        assert_eq!(graph.skill_count, 0);
        assert_eq!(graph.overall_score, 0.0);
    }

    #[tokio::test]
    async fn test_unknown_credential_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let service = CredentialService::new(store.clone(), SkillGraphService::new(store));
        assert!(matches!(
            service.remove(&CredentialId::new("missing")).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
