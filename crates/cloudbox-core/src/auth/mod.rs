//! Bearer token storage.
//!
//! A login either persists the token to `credentials.json` in the data
//! directory ("remember me") or keeps it for the lifetime of the process
//! only. Both forms are wiped together by [`CredentialStore::clear`], which
//! is what the API client calls when the server answers `401`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::api::UserInfo;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredCredentials {
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_info: Option<UserInfo>,
}

#[derive(Debug, Default)]
struct Inner {
    current: Option<StoredCredentials>,
    durable: bool,
}

/// Shared handle to the current credentials.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: Option<PathBuf>,
    inner: Arc<RwLock<Inner>>,
}

impl CredentialStore {
    /// Load credentials from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if a credentials file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let path = Self::default_path().unwrap_or_else(|| PathBuf::from("credentials.json"));
        Self::load_from(path)
    }

    /// Load credentials persisted at `path`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let current = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                Error::ConfigError(format!(
                    "Failed to read credentials at {}: {e}",
                    path.display()
                ))
            })?;
            Some(serde_json::from_str::<StoredCredentials>(&content).map_err(|e| {
                Error::ConfigError(format!(
                    "Failed to parse credentials at {}: {e}",
                    path.display()
                ))
            })?)
        } else {
            None
        };

        let durable = current.is_some();
        Ok(Self {
            path: Some(path),
            inner: Arc::new(RwLock::new(Inner { current, durable })),
        })
    }

    /// A store that never touches the filesystem.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    /// Get the default credentials path.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        crate::config::Config::data_dir().map(|dir| dir.join("credentials.json"))
    }

    /// Current bearer token.
    pub async fn token(&self) -> Option<String> {
        self.inner
            .read()
            .await
            .current
            .as_ref()
            .map(|c| c.access_token.clone())
    }

    /// Cached profile of the logged-in user.
    pub async fn user(&self) -> Option<UserInfo> {
        self.inner
            .read()
            .await
            .current
            .as_ref()
            .and_then(|c| c.user_info.clone())
    }

    /// Whether a token is held.
    pub async fn is_authenticated(&self) -> bool {
        self.inner.read().await.current.is_some()
    }

    /// Whether the token survives a restart.
    pub async fn is_durable(&self) -> bool {
        self.inner.read().await.durable
    }

    /// Replace the credentials after a login.
    ///
    /// With `remember` the token is written to disk; otherwise any file left
    /// from an earlier durable login is removed and the token lives in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials file cannot be written or removed.
    pub async fn store(&self, token: String, user: Option<UserInfo>, remember: bool) -> Result<()> {
        let credentials = StoredCredentials {
            access_token: token,
            user_info: user,
        };

        let mut inner = self.inner.write().await;
        if remember {
            self.persist(&credentials)?;
        } else {
            self.remove_file()?;
        }
        inner.current = Some(credentials);
        inner.durable = remember && self.path.is_some();
        Ok(())
    }

    /// Refresh the cached profile without touching the token.
    ///
    /// # Errors
    ///
    /// Returns an error if durable credentials cannot be rewritten.
    pub async fn update_user(&self, user: UserInfo) -> Result<()> {
        let mut inner = self.inner.write().await;
        let durable = inner.durable;
        if let Some(current) = inner.current.as_mut() {
            current.user_info = Some(user);
            if durable {
                self.persist(current)?;
            }
        }
        Ok(())
    }

    /// Forget the credentials everywhere.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials file exists but cannot be removed.
    pub async fn clear(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.current = None;
        inner.durable = false;
        self.remove_file()
    }

    fn persist(&self, credentials: &StoredCredentials) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!(
                    "Failed to create credentials directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let content = serde_json::to_string_pretty(credentials)?;
        std::fs::write(path, content).map_err(|e| {
            Error::ConfigError(format!(
                "Failed to write credentials at {}: {e}",
                path.display()
            ))
        })?;
        restrict_permissions(path)
    }

    fn remove_file(&self) -> Result<()> {
        match self.path.as_deref() {
            Some(path) if path.exists() => std::fs::remove_file(path).map_err(|e| {
                Error::ConfigError(format!(
                    "Failed to remove credentials at {}: {e}",
                    path.display()
                ))
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
