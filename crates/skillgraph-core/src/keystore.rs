//! Key material persistence.
//!
//! The node's signing key is loaded once at process start and passed to
//! whatever needs to sign. Losing the persisted key invalidates every
//! signature issued with it.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::Keypair;
use crate::error::{CoreError, Result};

/// Source of the node's signing keypair.
pub trait KeyStore: Send + Sync {
    /// Load the persisted keypair, if any.
    fn load(&self) -> Result<Option<Keypair>>;

    /// Persist a keypair, replacing any existing one.
    fn save(&self, keypair: &Keypair) -> Result<()>;

    /// Load the keypair, generating and persisting a fresh one if absent.
    fn load_or_generate(&self) -> Result<Keypair> {
        if let Some(keypair) = self.load()? {
            return Ok(keypair);
        }
        let keypair = Keypair::generate();
        self.save(&keypair)?;
        tracing::info!(public_key = %keypair.public_key().to_base64(), "generated new signing key");
        Ok(keypair)
    }
}

/// On-disk key file layout.
#[derive(Debug, Serialize, Deserialize)]
struct KeyFile {
    algorithm: String,
    public_key: String,
    secret_seed: String,
    created_at: DateTime<Utc>,
}

const ALGORITHM: &str = "Ed25519";

/// A JSON key file on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyStore for FileKeyStore {
    fn load(&self) -> Result<Option<Keypair>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let file: KeyFile = serde_json::from_str(&contents)
            .map_err(|e| CoreError::InvalidKeyMaterial(e.to_string()))?;
        if file.algorithm != ALGORITHM {
            return Err(CoreError::InvalidKeyMaterial(format!(
                "unsupported algorithm {}",
                file.algorithm
            )));
        }

        let keypair = Keypair::from_base64_seed(&file.secret_seed)?;
        if keypair.public_key().to_base64() != file.public_key {
            return Err(CoreError::InvalidKeyMaterial(
                "public key does not match secret seed".into(),
            ));
        }
        Ok(Some(keypair))
    }

    fn save(&self, keypair: &Keypair) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = KeyFile {
            algorithm: ALGORITHM.to_string(),
            public_key: keypair.public_key().to_base64(),
            secret_seed: keypair.seed_base64(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| CoreError::EncodingError(e.to_string()))?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

/// In-memory key store for tests and ephemeral nodes.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    slot: Mutex<Option<Keypair>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keypair(keypair: Keypair) -> Self {
        Self {
            slot: Mutex::new(Some(keypair)),
        }
    }
}

impl KeyStore for MemoryKeyStore {
    fn load(&self) -> Result<Option<Keypair>> {
        let slot = self
            .slot
            .lock()
            .map_err(|e| CoreError::InvalidKeyMaterial(format!("mutex poisoned: {}", e)))?;
        Ok(slot.clone())
    }

    fn save(&self, keypair: &Keypair) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|e| CoreError::InvalidKeyMaterial(format!("mutex poisoned: {}", e)))?;
        *slot = Some(keypair.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_keystore_generates_then_reloads() {
        let dir = TempDir::new().unwrap();
        let store = FileKeyStore::new(dir.path().join("keys").join("node.json"));

        assert!(store.load().unwrap().is_none());
        let first = store.load_or_generate().unwrap();
        let second = store.load_or_generate().unwrap();
        assert_eq!(first.public_key(), second.public_key());
    }

    #[test]
    fn test_file_keystore_rejects_mismatched_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("node.json");
        let store = FileKeyStore::new(&path);
        store.save(&Keypair::from_seed(&[1u8; 32])).unwrap();

        let mut doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        doc["public_key"] = serde_json::json!(Keypair::from_seed(&[2u8; 32])
            .public_key()
            .to_base64());
        std::fs::write(&path, doc.to_string()).unwrap();

        assert!(store.load().is_err());
    }

    #[test]
    fn test_memory_keystore() {
        let store = MemoryKeyStore::new();
        assert!(store.load().unwrap().is_none());
        let kp = store.load_or_generate().unwrap();
        assert_eq!(store.load().unwrap().unwrap().public_key(), kp.public_key());
    }
}
