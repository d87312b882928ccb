use std::sync::{Arc, RwLock};

use crate::credential::Credential;
use crate::errors::{AuthError, Result};

/// Persistence for the single cached credential
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the cached credential
    ///
    /// Unreadable or malformed records are reported as `None`.
    async fn load(&self) -> Option<Credential>;

    /// Replace the cached credential
    async fn save(&self, credential: &Credential) -> Result<()>;
}

/// In-memory credential store for testing and simple use cases
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    credential: Arc<RwLock<Option<Credential>>>,
    saves: Arc<RwLock<usize>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `credential`
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential: Arc::new(RwLock::new(Some(credential))),
            saves: Arc::default(),
        }
    }

    /// Current content, without going through the trait
    pub fn snapshot(&self) -> Option<Credential> {
        self.credential.read().ok()?.clone()
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.read().map(|n| *n).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Option<Credential> {
        self.snapshot()
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        *self
            .credential
            .write()
            .map_err(|_| AuthError::LockTimeout)? = Some(credential.clone());
        *self.saves.write().map_err(|_| AuthError::LockTimeout)? += 1;
        Ok(())
    }
}
