//! # SkillGraph Core
//!
//! Pure primitives for SkillGraph: canonical JSON, Ed25519 signatures,
//! skill scoring, verifiable presentations and QR payloads.
//!
//! This crate does no networking and no storage. The only I/O is the
//! file-backed [`FileKeyStore`].
//!
//! ## Key Types
//!
//! - [`Credential`] - A candidate's claim with its skill entries
//! - [`CandidateSkillGraph`] - The scored, deduplicated skill profile
//! - [`PresentationEngine`] - Signs and verifies presentations
//! - [`Keypair`] - Ed25519 signing key
//!
//! ## Canonicalization
//!
//! Everything that gets signed is encoded with sorted-key JSON. See
//! [`canonical`] module.

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod keystore;
pub mod presentation;
pub mod qr;
pub mod scoring;
pub mod types;

pub use canonical::{canonical_bytes, canonical_string, to_canonical_bytes};
pub use crypto::{Ed25519PublicKey, Ed25519Signature, Keypair, Sha256Hash};
pub use error::{CoreError, Result};
pub use keystore::{FileKeyStore, KeyStore, MemoryKeyStore};
pub use presentation::{
    candidate_did, CandidateSubject, Check, CheckStatus, PresentationEngine, VerificationReport,
};
pub use qr::{decode_qr, DecodedQr, QrDecodeFailure, QrPayload};
pub use scoring::{
    map_skill_to_nsqf, normalize_skill_name, proficiency, recency_score, source_weight,
    NsqfMapping,
};
pub use types::{
    Action, CandidateId, CandidateSkillGraph, Credential, CredentialId, CredentialType, Issuer,
    IssuerId, IssuerRef, IssuerStatus, Role, Skill, SkillCategory, SkillClaim, SkillId,
    SkillNode, SkillSource, StepStatus, TransactionLog, TransactionStatus, VerificationLog,
    VerificationStatus, VerificationStep, WorkflowId, WorkflowStatus,
};
