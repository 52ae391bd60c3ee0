//! The assembled service.
//!
//! [`App`] wires storage, keys, transport and configuration into the shared
//! [`AppState`] and owns the background tasks.

use std::sync::Arc;

use axum::Router;
use tokio::task::JoinHandle;

use skillgraph_core::{Issuer, IssuerId, Keypair, PresentationEngine};
use skillgraph_protocol::{BapEngine, Dispatcher, StoreTrustRegistry, Transport, TrustRegistry};
use skillgraph_store::Store;

use crate::aggregation::SkillGraphService;
use crate::config::ServiceConfig;
use crate::credentials::CredentialService;
use crate::employer::EmployerVerifier;
use crate::error::Result;
use crate::http::{build_router, AppState};
use crate::jobs::{spawn_scheduler, JobQueue};
use crate::verification::{HttpRegistryClient, VerificationService};

pub struct App {
    config: ServiceConfig,
    state: Arc<AppState>,
    store: Arc<dyn Store>,
}

impl App {
    /// Assemble the service. Must be called inside a tokio runtime.
    pub fn new(
        config: ServiceConfig,
        keypair: Keypair,
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let graphs = SkillGraphService::new(store.clone());
        let registry: Arc<dyn TrustRegistry> = Arc::new(StoreTrustRegistry::new(store.clone()));

        let mut verification = VerificationService::new(
            store.clone(),
            graphs.clone(),
            PresentationEngine::new(keypair),
        );
        if let Some(url) = &config.registry.url {
            let client = HttpRegistryClient::new(url, config.registry.timeout());
            verification = verification
                .with_registry(Arc::new(client), config.registry.fallback)
                .with_registry_timeout(config.registry.timeout());
        }

        // The worker runs until the engine's dispatcher handle is dropped.
        let (dispatcher, _worker) = Dispatcher::spawn(
            transport.clone(),
            store.clone(),
            config.protocol.queue_capacity,
        );
        let bap = config.protocol.bap_config();
        let employer = EmployerVerifier::new(
            registry.clone(),
            transport,
            bap.identity.clone(),
            IssuerId::new(config.registry.trusted_issuer.clone()),
        );

        let state = Arc::new(AppState {
            credentials: CredentialService::new(store.clone(), graphs.clone()),
            jobs: Arc::new(JobQueue::new(store.clone(), graphs.clone())),
            engine: BapEngine::new(bap, store.clone(), dispatcher),
            graphs,
            verification,
            employer,
            registry,
            public_url: config.server.public_url.clone(),
        });

        Self {
            config,
            state,
            store,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Register the issuers listed in configuration as trusted.
    pub async fn register_configured_issuers(&self) -> Result<usize> {
        for entry in &self.config.registry.issuers {
            self.register_issuer(&entry.to_issuer()).await?;
        }
        Ok(self.config.registry.issuers.len())
    }

    pub async fn register_issuer(&self, issuer: &Issuer) -> Result<()> {
        self.store.upsert_issuer(issuer).await?;
        tracing::info!(issuer_id = %issuer.id, status = issuer.status.as_str(), "registered issuer");
        Ok(())
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Start the job scheduler.
    pub fn spawn_jobs(&self) -> JoinHandle<()> {
        spawn_scheduler(self.state.jobs.clone(), &self.config.jobs)
    }
}
