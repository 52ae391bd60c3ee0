//! Trust registry: the set of issuers whose signed callbacks we accept.

use std::sync::Arc;

use async_trait::async_trait;

use skillgraph_core::{Issuer, IssuerId};
use skillgraph_store::Store;

use crate::error::Result;

/// Resolves issuer ids to registry entries.
///
/// Queried per request; implementations must not cache revocations away.
#[async_trait]
pub trait TrustRegistry: Send + Sync {
    async fn resolve(&self, id: &IssuerId) -> Result<Option<Issuer>>;
}

/// Registry backed by the document store's issuer collection.
#[derive(Clone)]
pub struct StoreTrustRegistry {
    store: Arc<dyn Store>,
}

impl StoreTrustRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TrustRegistry for StoreTrustRegistry {
    async fn resolve(&self, id: &IssuerId) -> Result<Option<Issuer>> {
        Ok(self.store.get_issuer(id).await?)
    }
}
