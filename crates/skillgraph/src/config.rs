//! Service configuration.
//!
//! Loaded from a TOML file; every section and field has a default so a
//! missing file or a partial one both work. A handful of deployment values
//! can be overridden from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use skillgraph_core::{Issuer, IssuerId, IssuerStatus};
use skillgraph_issuer::ProviderConfig;
use skillgraph_protocol::{BapConfig, BapIdentity, DEFAULT_CAPACITY, DEFAULT_TIMEOUT};

use crate::error::{Result, ServiceError};
use crate::verification::FallbackPolicy;

/// HTTP listener for the requester-side service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL embedded in QR verification links.
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5001
}

fn default_public_url() -> String {
    "http://localhost:5001".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            public_url: default_public_url(),
        }
    }
}

/// Where documents are stored. No path means in-memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub sqlite_path: Option<PathBuf>,
}

/// Signing key location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysConfig {
    #[serde(default = "default_key_path")]
    pub path: PathBuf,
}

fn default_key_path() -> PathBuf {
    PathBuf::from("keys/service.json")
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            path: default_key_path(),
        }
    }
}

/// Requester-side protocol settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default = "default_bap_id")]
    pub bap_id: String,

    #[serde(default = "default_bap_uri")]
    pub bap_uri: String,

    #[serde(default)]
    pub bpp_uri: Option<String>,

    #[serde(default)]
    pub gateway_uri: Option<String>,

    /// Outbound dispatch queue capacity.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Per-request timeout for outbound protocol calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_bap_id() -> String {
    "skill-verification-bap".to_string()
}

fn default_bap_uri() -> String {
    "http://localhost:5001/api/beckn".to_string()
}

fn default_queue_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            bap_id: default_bap_id(),
            bap_uri: default_bap_uri(),
            bpp_uri: None,
            gateway_uri: None,
            queue_capacity: default_queue_capacity(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ProtocolConfig {
    pub fn bap_config(&self) -> BapConfig {
        BapConfig {
            identity: BapIdentity {
                bap_id: self.bap_id.clone(),
                bap_uri: self.bap_uri.clone(),
            },
            bpp_uri: self.bpp_uri.clone(),
            gateway_uri: self.gateway_uri.clone(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// External credential registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry base URL; checks are skipped when unset.
    #[serde(default)]
    pub url: Option<String>,

    /// What to do when the registry cannot be reached.
    #[serde(default)]
    pub fallback: FallbackPolicy,

    /// A lookup slower than this counts as unreachable.
    #[serde(default = "default_registry_timeout_secs")]
    pub timeout_secs: u64,

    /// Issuer that employer verification orders go to.
    #[serde(default = "default_trusted_issuer")]
    pub trusted_issuer: String,

    /// Issuers registered as trusted at startup.
    #[serde(default)]
    pub issuers: Vec<TrustedIssuerConfig>,
}

/// A trust anchor declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedIssuerConfig {
    pub id: String,
    pub name: String,
    /// Base URI of the issuer's protocol routes.
    pub callback_uri: String,
    /// Base64 Ed25519 public key, as printed by `skillgraph keygen`.
    pub public_key: String,
}

impl TrustedIssuerConfig {
    pub fn to_issuer(&self) -> Issuer {
        Issuer {
            id: IssuerId::new(self.id.clone()),
            name: self.name.clone(),
            callback_uri: self.callback_uri.clone(),
            public_key: self.public_key.clone(),
            status: IssuerStatus::Trusted,
        }
    }
}

fn default_registry_timeout_secs() -> u64 {
    10
}

impl RegistryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_trusted_issuer() -> String {
    "UNI001".to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: None,
            fallback: FallbackPolicy::default(),
            timeout_secs: default_registry_timeout_secs(),
            trusted_issuer: default_trusted_issuer(),
            issuers: Vec::new(),
        }
    }
}

/// Background job cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobsConfig {
    /// How often the queue is drained.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    #[serde(default = "default_expiry_sweep_secs")]
    pub expiry_sweep_secs: u64,

    #[serde(default = "default_recency_refresh_secs")]
    pub recency_refresh_secs: u64,
}

fn default_tick_ms() -> u64 {
    100
}

fn default_expiry_sweep_secs() -> u64 {
    6 * 60 * 60
}

fn default_recency_refresh_secs() -> u64 {
    24 * 60 * 60
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            expiry_sweep_secs: default_expiry_sweep_secs(),
            recency_refresh_secs: default_recency_refresh_secs(),
        }
    }
}

impl JobsConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn expiry_sweep(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_secs)
    }

    pub fn recency_refresh(&self) -> Duration {
        Duration::from_secs(self.recency_refresh_secs)
    }
}

/// The university-side provider, when run from this binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerConfig {
    #[serde(default = "default_trusted_issuer")]
    pub university_id: String,

    #[serde(default = "default_issuer_name")]
    pub name: String,

    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_issuer_port")]
    pub port: u16,

    /// Public base URI of the provider's protocol routes.
    #[serde(default = "default_issuer_uri")]
    pub public_uri: String,

    /// Academic seed data; built-in demo data when unset.
    #[serde(default)]
    pub seed_file: Option<PathBuf>,

    #[serde(default = "default_issuer_key_path")]
    pub key_path: PathBuf,
}

fn default_issuer_name() -> String {
    "Skill Verification BPP".to_string()
}

fn default_issuer_port() -> u16 {
    6000
}

fn default_issuer_uri() -> String {
    "http://localhost:6000".to_string()
}

fn default_issuer_key_path() -> PathBuf {
    PathBuf::from("keys/issuer.json")
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            university_id: default_trusted_issuer(),
            name: default_issuer_name(),
            bind: default_bind(),
            port: default_issuer_port(),
            public_uri: default_issuer_uri(),
            seed_file: None,
            key_path: default_issuer_key_path(),
        }
    }
}

impl IssuerConfig {
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            provider_id: self.university_id.clone(),
            name: self.name.clone(),
            bpp_uri: self.public_uri.clone(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub keys: KeysConfig,

    #[serde(default)]
    pub protocol: ProtocolConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub jobs: JobsConfig,

    #[serde(default)]
    pub issuer: IssuerConfig,
}

impl ServiceConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: ServiceConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `BAP_ID`, `BAP_URI`, `BPP_URI`, `GATEWAY_URI` and
    /// `ONEST_REGISTRY_URL` from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("BAP_ID") {
            self.protocol.bap_id = v;
        }
        if let Some(v) = get("BAP_URI") {
            self.protocol.bap_uri = v;
        }
        if let Some(v) = get("BPP_URI") {
            self.protocol.bpp_uri = Some(v);
        }
        if let Some(v) = get("GATEWAY_URI") {
            self.protocol.gateway_uri = Some(v);
        }
        if let Some(v) = get("ONEST_REGISTRY_URL") {
            self.registry.url = Some(v);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.protocol.queue_capacity == 0 {
            return Err(ServiceError::Config("queue_capacity must be > 0".into()));
        }
        if self.jobs.tick_ms == 0 {
            return Err(ServiceError::Config("jobs.tick_ms must be > 0".into()));
        }
        if self.jobs.expiry_sweep_secs == 0 || self.jobs.recency_refresh_secs == 0 {
            return Err(ServiceError::Config("job intervals must be > 0".into()));
        }
        if self.protocol.request_timeout_secs == 0 || self.registry.timeout_secs == 0 {
            return Err(ServiceError::Config("timeouts must be > 0".into()));
        }
        if self.protocol.bap_id.trim().is_empty() {
            return Err(ServiceError::Config("bap_id must not be empty".into()));
        }
        Ok(())
    }
}
