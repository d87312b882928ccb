use std::path::{Path, PathBuf};

use fs2::FileExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::LOGIN_DATA_FILE;
use crate::credential::Credential;
use crate::errors::{AuthError, Result};
use crate::store::CredentialStore;

/// File-based credential store
///
/// Keeps the credential as a pretty-printed JSON document that the launch
/// argument builder can read directly.
///
/// # Directory Structure
/// ```text
/// ~/.local/share/quickmc/
/// ├── login_data.json       # Cached credential
/// └── login_data.lock       # Advisory lock held while writing
/// ```
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    record_path: PathBuf,
    lock_file: PathBuf,
}

impl FileCredentialStore {
    /// Create a store rooted at `data_dir`, creating the directory if needed
    pub async fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();

        let created = !fs::try_exists(&data_dir).await?;
        fs::create_dir_all(&data_dir).await?;

        // Only a directory we created is ours to lock down (Unix only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if created {
                fs::set_permissions(&data_dir, std::fs::Permissions::from_mode(0o700)).await?;
            }
        }
        #[cfg(not(unix))]
        let _ = created;

        Ok(Self {
            record_path: data_dir.join(LOGIN_DATA_FILE),
            lock_file: data_dir.join("login_data.lock"),
        })
    }

    /// Path of the cached record
    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    /// Acquire an exclusive lock on the store
    fn acquire_lock(&self) -> Result<std::fs::File> {
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_file)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| AuthError::LockTimeout)?;

        Ok(lock_file)
    }

    /// Read and decode the record, distinguishing absence from corruption
    pub async fn load_checked(&self) -> Result<Option<Credential>> {
        let content = match fs::read(&self.record_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AuthError::CacheCorrupt(e.to_string())),
        };

        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|e| AuthError::CacheCorrupt(e.to_string()))
    }

    async fn save_to_disk(&self, credential: &Credential) -> Result<()> {
        let mut json = serde_json::to_string_pretty(credential)?;
        json.push('\n');

        // Atomic write: write to temp file, then rename
        let temp_path = self.record_path.with_extension("json.tmp");
        if let Err(e) = self.write_and_replace(&temp_path, json.as_bytes()).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(())
    }

    async fn write_and_replace(&self, temp_path: &Path, contents: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(temp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(temp_path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        fs::rename(temp_path, &self.record_path).await
    }
}

#[async_trait::async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Option<Credential> {
        match self.load_checked().await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(
                    "Ignoring cached login data at {}: {}",
                    self.record_path.display(),
                    e
                );
                None
            }
        }
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        let _lock = self.acquire_lock()?;
        self.save_to_disk(credential).await?;
        debug!("Saved login data to {}", self.record_path.display());
        Ok(())
    }
}
