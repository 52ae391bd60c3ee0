//! Document builders shared by the backend tests.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use skillgraph_core::{
    Action, CandidateId, Credential, CredentialId, CredentialType, Issuer, IssuerId, IssuerRef,
    IssuerStatus, Keypair, Role, Skill, SkillCategory, SkillClaim, SkillId, TransactionLog,
    TransactionStatus, VerificationStatus,
};

pub fn credential(
    id: &str,
    candidate: &CandidateId,
    issued_at: DateTime<Utc>,
    status: VerificationStatus,
) -> Credential {
    Credential {
        id: CredentialId::new(id),
        candidate_id: candidate.clone(),
        credential_type: CredentialType::Certification,
        issuer: IssuerRef {
            id: None,
            name: "Test Academy".into(),
        },
        skills: vec![SkillClaim::new("React")],
        issued_at,
        expires_at: None,
        verification_status: status,
        verified_at: None,
        raw_data: Value::Null,
    }
}

pub fn skill(id: &str, key: &str) -> Skill {
    Skill {
        id: SkillId::new(id),
        name: key.to_string(),
        normalized_key: key.to_string(),
        category: SkillCategory::Technical,
        nsqf_level: 4,
        synonyms: Vec::new(),
    }
}

pub fn transaction_log(txn: &str, action: Action, role: Role) -> TransactionLog {
    TransactionLog {
        transaction_id: txn.to_string(),
        message_id: "m1".to_string(),
        action,
        role,
        request: json!({"context": {"transaction_id": txn}}),
        response: Some(json!({"message": {"ack": {"status": "ACK"}}})),
        status: TransactionStatus::Ack,
        error: None,
        timestamp: Utc::now(),
    }
}

pub fn issuer(id: &str) -> Issuer {
    Issuer {
        id: IssuerId::new(id),
        name: "Test University".into(),
        callback_uri: "http://localhost:4000".into(),
        public_key: Keypair::from_seed(&[3u8; 32]).public_key().to_base64(),
        status: IssuerStatus::Trusted,
    }
}
