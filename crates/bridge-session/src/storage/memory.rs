//! In-memory credential store.

use async_trait::async_trait;
use bridge_core::{CredentialStore, Credentials, StoreError};
use parking_lot::RwLock;

/// In-memory credential store.
///
/// Useful for tests and throwaway sessions.
/// Credentials are lost on restart, so every start pairs again.
#[derive(Default)]
pub struct MemoryCredentialStore {
    credentials: RwLock<Option<Credentials>>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with credentials.
    #[must_use]
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            credentials: RwLock::new(Some(credentials)),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<Credentials>, StoreError> {
        Ok(self.credentials.read().clone())
    }

    async fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
        *self.credentials.write() = Some(credentials.clone());
        Ok(())
    }
}
