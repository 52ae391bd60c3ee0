//! # SkillGraph Issuer
//!
//! The university side of the network. Answers `confirm` orders by checking
//! a student's academic record for a skill, issues content-addressed
//! certificates for positive verdicts, and publishes a signed catalog on
//! `search`.
//!
//! ## Key Types
//!
//! - [`Provider`] - Protocol handlers (confirm, search, certificate lookup)
//! - [`AcademicRecords`] - Students, subjects, marks and certificates
//! - [`SkillVerdict`] - Outcome of [`verify_skill`]

pub mod error;
pub mod http;
pub mod provider;
pub mod records;
pub mod verifier;

pub use error::{IssuerError, Result};
pub use http::{build_router, mount};
pub use provider::{Provider, ProviderConfig};
pub use records::{
    AcademicRecords, AcademicSeed, Certificate, MemoryRecords, Student, StudentMark,
    StudentStatus, Subject,
};
pub use verifier::{
    certificate_id, nsqf_level, verify_skill, Evidence, RejectionReason, SkillVerdict, PASS_MARK,
};
