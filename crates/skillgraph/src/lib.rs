//! # SkillGraph
//!
//! Requester-side service of the skill verification network. Aggregates a
//! candidate's credentials into a scored skill graph, issues signed
//! verifiable presentations, verifies presentations and QR payloads, and
//! talks to issuers over the BAP/BPP protocol.
//!
//! ## Key Types
//!
//! - [`App`] - The assembled service and its router
//! - [`SkillGraphService`] - Credential to skill graph aggregation
//! - [`VerificationService`] - Presentation, QR, revocation and candidate checks
//! - [`EmployerVerifier`] - Per-skill confirmation against a trusted issuer
//! - [`JobQueue`] - Background refresh and sweep jobs
//!
//! ## Re-exports
//!
//! - `skillgraph::core` - Canonical JSON, keys, scoring and document types
//! - `skillgraph::store` - Storage abstraction and SQLite
//! - `skillgraph::protocol` - Protocol engine, dispatcher and transports
//! - `skillgraph::issuer` - The university-side provider

pub mod aggregation;
pub mod app;
pub mod config;
pub mod credentials;
pub mod employer;
pub mod error;
pub mod http;
pub mod jobs;
pub mod verification;

pub use skillgraph_core as core;
pub use skillgraph_issuer as issuer;
pub use skillgraph_protocol as protocol;
pub use skillgraph_store as store;

pub use aggregation::SkillGraphService;
pub use app::App;
pub use config::ServiceConfig;
pub use credentials::CredentialService;
pub use employer::{
    ApplicationStatus, EmployerVerification, EmployerVerificationRequest, EmployerVerifier,
    SkillCheck,
};
pub use error::{Result, ServiceError};
pub use http::{build_router, AppState};
pub use jobs::{Job, JobQueue};
pub use verification::{
    CandidateVerification, FallbackPolicy, HttpRegistryClient, QrVerification, RegistryAnswer,
    RegistryCheck, RegistryClient, RevocationStatus, VerificationService,
};
