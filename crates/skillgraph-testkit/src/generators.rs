//! Proptest generators for property-based testing.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{Map, Value};

use skillgraph_core::{
    CandidateId, Credential, CredentialType, Keypair, SkillClaim, VerificationStatus,
};

use crate::fixtures;

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Object keys, including non-ASCII ones to exercise byte ordering.
pub fn json_key() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z_][a-zA-Z0-9_]{0,11}",
        "[a-zé中]{1,4}",
    ]
}

fn json_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        any::<f64>().prop_filter("finite", |f| f.is_finite()).prop_map(Value::from),
        "[ -~]{0,16}".prop_map(Value::String),
    ]
}

/// Arbitrary nested JSON documents.
pub fn json_document() -> impl Strategy<Value = Value> {
    json_scalar().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map(json_key(), inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<String, Value>>())),
        ]
    })
}

/// Skill names as candidates write them: mixed case, stray spaces.
pub fn skill_name() -> impl Strategy<Value = String> {
    (
        prop::sample::select(vec![
            "React", "Python", "SQL", "Leadership", "Hindi", "Finance", "Docker", "Teamwork",
        ]),
        any::<bool>(),
        " {0,2}",
    )
        .prop_map(|(name, upper, pad)| {
            let name = if upper { name.to_uppercase() } else { name.to_string() };
            format!("{pad}{name}{pad}")
        })
}

pub fn credential_type() -> impl Strategy<Value = CredentialType> {
    prop_oneof![
        Just(CredentialType::Education),
        Just(CredentialType::Certification),
        Just(CredentialType::Assessment),
        Just(CredentialType::Experience),
    ]
}

/// Parameters for generating a credential.
#[derive(Debug, Clone)]
pub struct CredentialParams {
    pub credential_type: CredentialType,
    pub skills: Vec<String>,
    /// Days before the reference time the credential was issued.
    pub age_days: i64,
    pub pending: bool,
}

impl Arbitrary for CredentialParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            credential_type(),
            prop::collection::vec(skill_name(), 1..5),
            0i64..1000,
            any::<bool>(),
        )
            .prop_map(|(credential_type, skills, age_days, pending)| CredentialParams {
                credential_type,
                skills,
                age_days,
                pending,
            })
            .boxed()
    }
}

/// Fixed reference time for generated documents.
pub fn reference_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Build a credential from parameters, relative to [`reference_time`].
pub fn credential_from_params(
    id: &str,
    candidate_id: &CandidateId,
    params: &CredentialParams,
) -> Credential {
    let skills: Vec<&str> = params.skills.iter().map(String::as_str).collect();
    let mut credential = fixtures::credential(
        id,
        candidate_id,
        &skills,
        reference_time() - Duration::days(params.age_days),
    );
    credential.credential_type = params.credential_type;
    credential.skills = params.skills.iter().map(SkillClaim::new).collect();
    if params.pending {
        credential.verification_status = VerificationStatus::Pending;
    }
    credential
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillgraph_core::{canonical_bytes, canonical_string, normalize_skill_name};

    proptest! {
        #[test]
        fn test_canonical_ignores_key_order(doc in json_document()) {
            // Re-inserting keys in reverse must not change the encoding.
            fn reversed(v: &Value) -> Value {
                match v {
                    Value::Object(m) => Value::Object(
                        m.iter().rev().map(|(k, v)| (k.clone(), reversed(v))).collect(),
                    ),
                    Value::Array(items) => Value::Array(items.iter().map(reversed).collect()),
                    other => other.clone(),
                }
            }
            prop_assert_eq!(canonical_bytes(&doc), canonical_bytes(&reversed(&doc)));
        }

        #[test]
        fn test_canonical_is_valid_json(doc in json_document()) {
            let encoded = canonical_string(&doc);
            let reparsed: Value = serde_json::from_str(&encoded).unwrap();
            prop_assert_eq!(canonical_string(&reparsed), encoded);
        }

        #[test]
        fn test_skill_name_normalizes(name in skill_name()) {
            let key = normalize_skill_name(&name);
            prop_assert_eq!(key.trim(), key.as_str());
            prop_assert_eq!(key.to_lowercase(), key.clone());
        }
    }
}
