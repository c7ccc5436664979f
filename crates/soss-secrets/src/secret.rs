//! Passphrase generation, persistence and loading

use std::io;
use std::path::{Path, PathBuf};

use rand::distributions::{Alphanumeric, DistString};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use crate::rotate::{atomic_replace, backup_path};

/// Length of a generated passphrase
pub const PASSPHRASE_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret already exists at {0}; pass force to replace it")]
    AlreadyExists(PathBuf),

    #[error("secret file not found: {0}")]
    NotFound(PathBuf),

    #[error("secret file is empty: {0}")]
    Empty(PathBuf),

    #[error("secret file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SecretError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// `~/.soss/.secret`
pub fn default_secret_path() -> PathBuf {
    soss_core::config::soss_dir().join(".secret")
}

/// A passphrase and the file it lives in.
pub struct Secret {
    key: SecretString,
    path: PathBuf,
}

impl Secret {
    /// Generate a fresh 64-character alphanumeric passphrase bound to `path`.
    /// Nothing is written until [`save`](Self::save).
    pub fn generate(path: impl Into<PathBuf>) -> Self {
        let key = Alphanumeric.sample_string(&mut rand::thread_rng(), PASSPHRASE_LEN);
        Self {
            key: SecretString::from(key),
            path: path.into(),
        }
    }

    pub fn new(key: SecretString, path: impl Into<PathBuf>) -> Self {
        Self {
            key,
            path: path.into(),
        }
    }

    pub fn key(&self) -> &SecretString {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_key(self) -> SecretString {
        self.key
    }

    /// Persist the passphrase.
    ///
    /// An existing file is only touched when `force` is set, in which case it
    /// is rotated like [`replace`](Self::replace). Returns the backup path if
    /// one was made.
    pub async fn save(&self, force: bool) -> Result<Option<PathBuf>, SecretError> {
        if self.exists().await? {
            if !force {
                return Err(SecretError::AlreadyExists(self.path.clone()));
            }
            return self.replace().await;
        }

        self.write().await?;
        tracing::info!(path = %self.path.display(), "secret saved");
        Ok(None)
    }

    /// Move any existing secret file aside to a timestamped backup, then write
    /// this passphrase in its place.
    pub async fn replace(&self) -> Result<Option<PathBuf>, SecretError> {
        let backup = if self.exists().await? {
            let backup = backup_path(&self.path, chrono::Local::now());
            tokio::fs::rename(&self.path, &backup)
                .await
                .map_err(|e| SecretError::io(&self.path, e))?;
            tracing::info!(backup = %backup.display(), "previous secret backed up");
            Some(backup)
        } else {
            None
        };

        self.write().await?;
        tracing::info!(path = %self.path.display(), "secret replaced");
        Ok(backup)
    }

    /// Read the passphrase stored at `path`. The content is used verbatim.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, SecretError> {
        let path = path.into();
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SecretError::NotFound(path));
            }
            Err(e) => return Err(SecretError::io(&path, e)),
        };

        if content.is_empty() {
            return Err(SecretError::Empty(path));
        }

        tracing::debug!(path = %path.display(), "secret loaded");
        Ok(Self {
            key: SecretString::from(content),
            path,
        })
    }

    async fn exists(&self) -> Result<bool, SecretError> {
        tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| SecretError::io(&self.path, e))
    }

    async fn write(&self) -> Result<(), SecretError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            create_private_dir(dir)
                .await
                .map_err(|e| SecretError::io(dir, e))?;
        }
        atomic_replace(&self.path, self.key.expose_secret().as_bytes())
            .await
            .map_err(|e| SecretError::io(&self.path, e))
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("key", &"[REDACTED]")
            .field("path", &self.path)
            .finish()
    }
}

async fn create_private_dir(dir: &Path) -> io::Result<()> {
    if tokio::fs::try_exists(dir).await? {
        return Ok(());
    }
    tokio::fs::create_dir_all(dir).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)).await?;
    }
    Ok(())
}
