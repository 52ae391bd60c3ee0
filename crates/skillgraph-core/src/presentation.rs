//! Verifiable presentations over skill graphs.
//!
//! A presentation bundles one verifiable credential per skill. The whole
//! unsigned document is signed over its canonical encoding and the `proof`
//! is attached afterwards, so verification strips `proof` before checking.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::canonical;
use crate::crypto::{Ed25519PublicKey, Keypair};
use crate::error::{CoreError, Result};
use crate::scoring::nsqf_level_name;
use crate::types::{CandidateId, SkillNode};

pub const CREDENTIALS_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";
pub const NETWORK_ISSUER: &str = "urn:beckn:skill-verification-network";
pub const PROOF_TYPE: &str = "Ed25519Signature2020";
pub const PROOF_PURPOSE: &str = "authentication";
pub const VERIFICATION_METHOD: &str = "urn:beckn:verification-key";

/// DID used for a candidate in presentations.
pub fn candidate_did(id: &CandidateId) -> String {
    format!("did:candidate:{}", id)
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Holder identity embedded in a presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSubject {
    pub id: CandidateId,
    pub name: String,
}

/// Signs and verifies presentations with the node's key.
#[derive(Debug, Clone)]
pub struct PresentationEngine {
    keypair: Keypair,
}

impl PresentationEngine {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    /// Build and sign a presentation for the given skills.
    pub fn generate(
        &self,
        candidate: &CandidateSubject,
        skills: &[SkillNode],
        now: DateTime<Utc>,
    ) -> Result<Value> {
        let did = candidate_did(&candidate.id);
        let issued = timestamp(now);

        let credentials: Vec<Value> = skills
            .iter()
            .map(|node| {
                json!({
                    "@context": [CREDENTIALS_CONTEXT],
                    "type": ["VerifiableCredential", "SkillCredential"],
                    "issuer": NETWORK_ISSUER,
                    "issuanceDate": issued,
                    "credentialSubject": {
                        "id": did,
                        "name": candidate.name,
                        "skill": {
                            "name": node.skill_name,
                            "category": node.category,
                            "nsqfLevel": node.nsqf_level,
                            "nsqfLevelName": nsqf_level_name(node.nsqf_level),
                            "proficiency": node.proficiency,
                            "recencyScore": node.recency_score,
                            "sources": node.sources.len(),
                        }
                    }
                })
            })
            .collect();

        let mut document = json!({
            "@context": [CREDENTIALS_CONTEXT],
            "type": ["VerifiablePresentation"],
            "holder": did,
            "verifiableCredential": credentials,
        });

        let signature = canonical::sign(&document, &self.keypair);
        let proof = json!({
            "type": PROOF_TYPE,
            "created": issued,
            "proofPurpose": PROOF_PURPOSE,
            "verificationMethod": VERIFICATION_METHOD,
            "proofValue": signature.to_base64(),
        });

        document
            .as_object_mut()
            .ok_or_else(|| CoreError::MalformedDocument("presentation is not an object".into()))?
            .insert("proof".to_string(), proof);

        Ok(document)
    }

    /// Verify a presentation produced by this engine. Never fails.
    pub fn verify(&self, document: &Value) -> bool {
        match split_proof(document) {
            Some((unsigned, proof_value)) => {
                canonical::verify(&unsigned, &proof_value, &self.public_key())
            }
            None => false,
        }
    }

    /// Diagnose an externally supplied credential or presentation.
    pub fn verify_arbitrary(&self, document: &Value, now: DateTime<Utc>) -> VerificationReport {
        let mut checks = Vec::new();

        let Some(obj) = document.as_object() else {
            checks.push(Check::failed("structure", "document is not a JSON object"));
            return VerificationReport::from_checks(checks);
        };

        let missing: Vec<&str> = ["@context", "type"]
            .into_iter()
            .filter(|k| !obj.contains_key(*k))
            .collect();
        if missing.is_empty() {
            checks.push(Check::passed("structure"));
        } else {
            checks.push(Check::failed(
                "structure",
                format!("missing required fields: {}", missing.join(", ")),
            ));
        }

        let is_presentation = type_includes(obj, "VerifiablePresentation");
        let party = if is_presentation { "holder" } else { "issuer" };
        match obj.get(party) {
            Some(v) if !v.is_null() => checks.push(Check::passed(party)),
            _ => checks.push(Check::failed(party, format!("missing {}", party))),
        }

        checks.push(check_issuance_date(obj, now));

        match obj
            .get("proof")
            .and_then(|p| p.get("proofValue"))
            .and_then(Value::as_str)
        {
            Some(_) if self.verify(document) => checks.push(Check::passed("signature")),
            Some(_) => checks.push(Check::failed("signature", "signature does not match document")),
            None => checks.push(Check::skipped("signature", "no proof.proofValue present")),
        }

        VerificationReport::from_checks(checks)
    }
}

/// Remove `proof` and return the remainder with the proof value.
fn split_proof(document: &Value) -> Option<(Value, String)> {
    let obj = document.as_object()?;
    let proof_value = obj.get("proof")?.get("proofValue")?.as_str()?.to_string();
    let unsigned: Map<String, Value> = obj
        .iter()
        .filter(|(k, _)| k.as_str() != "proof")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Some((Value::Object(unsigned), proof_value))
}

fn type_includes(obj: &Map<String, Value>, name: &str) -> bool {
    match obj.get("type") {
        Some(Value::String(s)) => s == name,
        Some(Value::Array(items)) => items.iter().any(|t| t.as_str() == Some(name)),
        _ => false,
    }
}

fn check_issuance_date(obj: &Map<String, Value>, now: DateTime<Utc>) -> Check {
    let raw = obj
        .get("issuanceDate")
        .or_else(|| obj.get("validFrom"))
        .or_else(|| obj.get("proof").and_then(|p| p.get("created")))
        .and_then(Value::as_str);

    let Some(raw) = raw else {
        return Check::failed("issuance_date", "no issuance date present");
    };
    match DateTime::parse_from_rfc3339(raw) {
        Ok(date) if date.with_timezone(&Utc) > now => {
            Check::failed("issuance_date", "issuance date is in the future")
        }
        Ok(_) => Check::passed("issuance_date"),
        Err(e) => Check::failed("issuance_date", format!("unparseable date: {}", e)),
    }
}

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    pub name: String,
    pub status: CheckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Check {
    fn passed(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Passed,
            reason: None,
        }
    }

    fn failed(name: &str, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Failed,
            reason: Some(reason.into()),
        }
    }

    fn skipped(name: &str, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Skipped,
            reason: Some(reason.into()),
        }
    }
}

/// Structured result of [`PresentationEngine::verify_arbitrary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub verified: bool,
    pub checks: Vec<Check>,
}

impl VerificationReport {
    fn from_checks(checks: Vec<Check>) -> Self {
        let verified = !checks.iter().any(|c| c.status == CheckStatus::Failed);
        Self { verified, checks }
    }

    pub fn check(&self, name: &str) -> Option<CheckStatus> {
        self.checks.iter().find(|c| c.name == name).map(|c| c.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SkillCategory, SkillId};
    use chrono::Duration;

    fn engine() -> PresentationEngine {
        PresentationEngine::new(Keypair::from_seed(&[9u8; 32]))
    }

    fn subject() -> CandidateSubject {
        CandidateSubject {
            id: CandidateId::new("cand-1"),
            name: "Asha Rao".into(),
        }
    }

    fn react() -> SkillNode {
        SkillNode {
            skill_id: SkillId::new("skill-react"),
            skill_name: "React".into(),
            normalized_name: "react".into(),
            category: SkillCategory::Technical,
            nsqf_level: 5,
            proficiency: 95,
            recency_score: 100,
            sources: Vec::new(),
            last_verified: None,
        }
    }

    #[test]
    fn test_generate_shape() {
        let vp = engine().generate(&subject(), &[react()], Utc::now()).unwrap();
        assert_eq!(vp["holder"], "did:candidate:cand-1");
        assert_eq!(vp["type"][0], "VerifiablePresentation");
        assert_eq!(vp["proof"]["type"], PROOF_TYPE);
        assert_eq!(vp["proof"]["verificationMethod"], VERIFICATION_METHOD);
        let vc = &vp["verifiableCredential"][0];
        assert_eq!(vc["issuer"], NETWORK_ISSUER);
        assert_eq!(vc["credentialSubject"]["skill"]["name"], "React");
    }

    #[test]
    fn test_verify_roundtrip_and_tamper() {
        let engine = engine();
        let vp = engine.generate(&subject(), &[react()], Utc::now()).unwrap();

        let text = serde_json::to_string_pretty(&vp).unwrap();
        let reparsed: Value = serde_json::from_str(&text).unwrap();
        assert!(engine.verify(&reparsed));

        let mut tampered = reparsed.clone();
        tampered["verifiableCredential"][0]["credentialSubject"]["skill"]["nsqfLevel"] = json!(8);
        assert!(!engine.verify(&tampered));

        let mut no_proof = reparsed;
        no_proof.as_object_mut().unwrap().remove("proof");
        assert!(!engine.verify(&no_proof));
    }

    #[test]
    fn test_verify_rejects_foreign_key() {
        let vp = engine().generate(&subject(), &[react()], Utc::now()).unwrap();
        let other = PresentationEngine::new(Keypair::from_seed(&[1u8; 32]));
        assert!(!other.verify(&vp));
    }

    #[test]
    fn test_arbitrary_valid_presentation() {
        let engine = engine();
        let now = Utc::now();
        let vp = engine.generate(&subject(), &[react()], now).unwrap();
        let report = engine.verify_arbitrary(&vp, now + Duration::seconds(1));
        assert!(report.verified, "{:?}", report);
        assert_eq!(report.check("signature"), Some(CheckStatus::Passed));
        assert_eq!(report.check("holder"), Some(CheckStatus::Passed));
    }

    #[test]
    fn test_arbitrary_unsigned_credential() {
        let doc = json!({
            "@context": [CREDENTIALS_CONTEXT],
            "type": ["VerifiableCredential"],
            "issuer": "did:example:uni",
            "issuanceDate": "2024-01-01T00:00:00Z",
        });
        let report = engine().verify_arbitrary(&doc, Utc::now());
        assert!(report.verified);
        assert!(report.check("signature") == Some(CheckStatus::Skipped));
    }

    #[test]
    fn test_arbitrary_reports_each_failure() {
        let doc = json!({
            "type": ["VerifiableCredential"],
            "issuanceDate": "2999-01-01T00:00:00Z",
            "proof": {"proofValue": "bm90IGEgc2lnbmF0dXJl"},
        });
        let report = engine().verify_arbitrary(&doc, Utc::now());
        assert!(!report.verified);
        assert!(report.check("structure") == Some(CheckStatus::Failed));
        assert!(report.check("issuer") == Some(CheckStatus::Failed));
        assert!(report.check("issuance_date") == Some(CheckStatus::Failed));
        assert!(report.check("signature") == Some(CheckStatus::Failed));
    }

    #[test]
    fn test_arbitrary_non_object() {
        let report = engine().verify_arbitrary(&json!("hello"), Utc::now());
        assert!(!report.verified);
        assert_eq!(report.checks.len(), 1);
    }

    #[test]
    fn test_report_serialization() {
        let report = engine().verify_arbitrary(&json!([]), Utc::now());
        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(v["checks"][0]["name"], "structure");
        assert_eq!(v["checks"][0]["status"], "failed");
    }
}
