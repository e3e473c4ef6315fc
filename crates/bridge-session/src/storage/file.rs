//! File-backed credential store.

use std::{
    io::ErrorKind,
    path::PathBuf,
};

use async_trait::async_trait;
use bridge_core::{CredentialStore, Credentials, StoreError};

const CREDS_FILE: &str = "creds.json";
const CREDS_TMP_FILE: &str = "creds.json.tmp";

/// Stores credentials as `creds.json` inside a directory.
///
/// Writes go to a temp file first and are renamed into place, so a crash
/// mid-write leaves the previous credentials intact.
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self) -> PathBuf {
        self.dir.join(CREDS_FILE)
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<Credentials>, StoreError> {
        match tokio::fs::read(self.path()).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec_pretty(credentials)?;
        let tmp = self.dir.join(CREDS_TMP_FILE);
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, self.path()).await?;
        Ok(())
    }
}
