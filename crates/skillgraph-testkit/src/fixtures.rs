//! Test fixtures and helpers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use skillgraph_core::{
    CandidateId, CandidateSubject, Credential, CredentialId, CredentialType, Issuer, IssuerId,
    IssuerRef, IssuerStatus, Keypair, SkillClaim, VerificationStatus,
};
use skillgraph_protocol::BapIdentity;
use skillgraph_store::MemoryStore;

/// Seed of the key every fixture issuer signs with.
pub const ISSUER_SEED: [u8; 32] = [0x17; 32];

pub const TEST_UNIVERSITY: &str = "Test University";

/// A verified education credential asserting `skills`.
///
/// `verified_at` is left unset so the source date is `issued_at`.
pub fn credential(
    id: &str,
    candidate_id: &CandidateId,
    skills: &[&str],
    issued_at: DateTime<Utc>,
) -> Credential {
    Credential {
        id: CredentialId::new(id),
        candidate_id: candidate_id.clone(),
        credential_type: CredentialType::Education,
        issuer: IssuerRef {
            id: Some(IssuerId::new("UNI001")),
            name: TEST_UNIVERSITY.to_string(),
        },
        skills: skills.iter().map(|s| SkillClaim::new(*s)).collect(),
        issued_at,
        expires_at: None,
        verification_status: VerificationStatus::Verified,
        verified_at: None,
        raw_data: Value::Null,
    }
}

/// Keypair behind [`trusted_issuer`].
pub fn issuer_keypair() -> Keypair {
    Keypair::from_seed(&ISSUER_SEED)
}

/// A trusted registry entry signing with [`issuer_keypair`].
pub fn trusted_issuer(id: &str, callback_uri: &str) -> Issuer {
    issuer_with_key(id, callback_uri, &issuer_keypair())
}

pub fn issuer_with_key(id: &str, callback_uri: &str, keypair: &Keypair) -> Issuer {
    Issuer {
        id: IssuerId::new(id),
        name: TEST_UNIVERSITY.to_string(),
        callback_uri: callback_uri.to_string(),
        public_key: keypair.public_key().to_base64(),
        status: IssuerStatus::Trusted,
    }
}

pub fn bap_identity() -> BapIdentity {
    BapIdentity {
        bap_id: "skill-verification-bap".into(),
        bap_uri: "http://bap.test/api/beckn".into(),
    }
}

pub fn candidate(id: &str, name: &str) -> CandidateSubject {
    CandidateSubject {
        id: CandidateId::new(id),
        name: name.to_string(),
    }
}

/// A node keypair and an empty store.
pub struct TestFixture {
    pub keypair: Keypair,
    pub store: Arc<MemoryStore>,
}

impl TestFixture {
    pub fn new() -> Self {
        Self::with_seed([0x42; 32])
    }

    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self {
            keypair: Keypair::from_seed(&seed),
            store: Arc::new(MemoryStore::new()),
        }
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillgraph_store::Store;

    #[tokio::test]
    async fn test_fixture_issuer_is_trusted() {
        let fixture = TestFixture::new();
        let issuer = trusted_issuer("UNI001", "http://uni.test");
        fixture.store.upsert_issuer(&issuer).await.unwrap();

        let stored = fixture
            .store
            .get_issuer(&IssuerId::new("UNI001"))
            .await
            .unwrap()
            .unwrap();
        assert!(stored.is_trusted());
        assert_eq!(stored.public_key, issuer_keypair().public_key().to_base64());
    }

    #[test]
    fn test_credential_fixture() {
        let now = Utc::now();
        let c = credential("c1", &CandidateId::new("cand-1"), &["React", "SQL"], now);
        assert_eq!(c.skills.len(), 2);
        assert_eq!(c.source_date(), now);
        assert_eq!(c.verification_status, VerificationStatus::Verified);
    }
}
