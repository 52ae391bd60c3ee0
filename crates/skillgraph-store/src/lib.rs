//! # SkillGraph Store
//!
//! Storage abstraction for SkillGraph. Provides a trait-based interface over
//! credentials, the skill taxonomy, skill graphs, the issuer registry and the
//! protocol and workflow logs, with SQLite and in-memory implementations.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`InsertResult`] - Result of inserting a credential
//!
//! ## Usage
//!
//! ```rust,no_run
//! use skillgraph_store::{SqliteStore, Store};
//! use skillgraph_core::CandidateId;
//!
//! async fn example() {
//!     let store = SqliteStore::open("skillgraph.db").unwrap();
//!     let graph = store.get_skill_graph(&CandidateId::new("cand-1")).await.unwrap();
//!     println!("{:?}", graph.map(|g| g.overall_score));
//! }
//! ```

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

#[cfg(test)]
mod testutil;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{InsertResult, Store};
