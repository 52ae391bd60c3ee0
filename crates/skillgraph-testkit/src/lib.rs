//! # SkillGraph Testkit
//!
//! Testing utilities shared by the SkillGraph crates.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Canonical JSON encodings and their SHA-256 digests
//! - **Generators**: Proptest strategies for JSON documents and credentials
//! - **Fixtures**: Credentials, issuers and identities for test scenarios
//!
//! ## Golden Vectors
//!
//! ```rust
//! use skillgraph_testkit::vectors::all_vectors;
//! use skillgraph_core::canonical_string;
//!
//! for vector in all_vectors() {
//!     assert_eq!(canonical_string(&vector.input()), vector.canonical);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use skillgraph_testkit::generators::json_document;
//!
//! proptest! {
//!     #[test]
//!     fn canonical_is_stable(doc in json_document()) {
//!         prop_assert_eq!(canonical_bytes(&doc), canonical_bytes(&doc.clone()));
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::TestFixture;
