//! Configuration management for Cloudbox.
//!
//! This module handles loading, saving, and managing Cloudbox configuration.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/cloudbox/config.toml` |
//! | macOS | `~/Library/Application Support/com.cloudbox.Cloudbox/config.toml` |
//! | Windows | `%APPDATA%\cloudbox\Cloudbox\config\config.toml` |
//!
//! ## Example
//!
//! ```rust,ignore
//! use cloudbox_core::config::Config;
//!
//! let config = Config::load()?;
//! println!("Server: {}", config.server.base_url);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration struct for Cloudbox.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings
    pub server: ServerConfig,
    /// Upload settings
    pub upload: UploadConfig,
    /// UI settings
    pub ui: UiConfig,
}

/// Server connection options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// API root, including the `/api` prefix
    pub base_url: String,
    /// Timeout for regular requests (uploads are not bounded by it)
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Shown when the session expires
    pub login_hint: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: crate::DEFAULT_API_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(crate::DEFAULT_REQUEST_TIMEOUT_SECS),
            login_hint: "Run `cloudbox login <username>` to sign in again.".to_string(),
        }
    }
}

/// Upload queue options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Largest accepted file in bytes
    pub max_file_size: u64,
    /// Number of simultaneous transfers
    pub max_concurrent_uploads: usize,
    /// How long finished uploads stay listed
    #[serde(with = "humantime_serde")]
    pub completion_display_delay: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: crate::MAX_FILE_SIZE,
            max_concurrent_uploads: crate::MAX_CONCURRENT_UPLOADS,
            completion_display_delay: Duration::from_millis(crate::DEFAULT_COMPLETION_DISPLAY_MS),
        }
    }
}

/// UI configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Ask before deleting files
    pub confirm_delete: bool,
    /// Show "5 minutes ago" instead of full timestamps
    pub relative_dates: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            confirm_delete: true,
            relative_dates: true,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read,
    /// parsed, or holds invalid values.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed, or
    /// holds invalid values.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    ///
    /// Creates the configuration directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(&path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Check values that would make the client unusable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.upload.max_concurrent_uploads == 0 {
            return Err(Error::InvalidConfig {
                key: "upload.max_concurrent_uploads".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.upload.max_file_size == 0 {
            return Err(Error::InvalidConfig {
                key: "upload.max_file_size".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if !self.server.base_url.starts_with("http://")
            && !self.server.base_url.starts_with("https://")
        {
            return Err(Error::InvalidConfig {
                key: "server.base_url".into(),
                reason: format!("'{}' is not an http(s) URL", self.server.base_url),
            });
        }
        Ok(())
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "cloudbox", "Cloudbox")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the directory holding preferences and credentials.
    #[must_use]
    pub fn data_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "cloudbox", "Cloudbox")
            .map(|dirs| dirs.data_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.strip_suffix("ms")
            .map(|millis| {
                millis
                    .parse()
                    .map(Duration::from_millis)
                    .map_err(serde::de::Error::custom)
            })
            .or_else(|| {
                s.strip_suffix('s').map(|secs| {
                    secs.parse()
                        .map(Duration::from_secs)
                        .map_err(serde::de::Error::custom)
                })
            })
            .or_else(|| {
                s.strip_suffix('m').map(|mins| {
                    mins.parse::<u64>()
                        .map(|m| Duration::from_secs(m * 60))
                        .map_err(serde::de::Error::custom)
                })
            })
            .unwrap_or_else(|| Err(serde::de::Error::custom("invalid duration format")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.server.base_url, crate::DEFAULT_API_BASE_URL);
        assert_eq!(config.upload.max_concurrent_uploads, 3);
        assert_eq!(config.upload.max_file_size, 10 * 1024 * 1024 * 1024);
        assert_eq!(
            config.upload.completion_display_delay,
            Duration::from_secs(2)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip_through_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut original = Config::default();
        original.server.base_url = "https://cloud.example.org/api".to_string();
        original.upload.max_concurrent_uploads = 5;
        original.ui.confirm_delete = false;

        std::fs::write(&path, toml::to_string_pretty(&original).unwrap()).unwrap();
        let loaded = Config::load_from(&path).expect("load");

        assert_eq!(loaded.server.base_url, "https://cloud.example.org/api");
        assert_eq!(loaded.upload.max_concurrent_uploads, 5);
        assert!(!loaded.ui.confirm_delete);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from(&temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.upload.max_concurrent_uploads, 3);
    }

    #[test]
    fn test_config_deserialization_partial() {
        let partial_toml = r#"
[server]
base_url = "http://nas.local/api"

[upload]
completion_display_delay = "500ms"
"#;

        let config: Config = toml::from_str(partial_toml).expect("parse partial config");

        assert_eq!(config.server.base_url, "http://nas.local/api");
        assert_eq!(
            config.upload.completion_display_delay,
            Duration::from_millis(500)
        );
        assert_eq!(config.server.request_timeout, Duration::from_secs(30));
        assert_eq!(config.upload.max_concurrent_uploads, 3);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[upload]\nmax_concurrent_uploads = 0\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { ref key, .. } if key == "upload.max_concurrent_uploads"));
    }

    #[test]
    fn test_validate_rejects_non_http_url() {
        let mut config = Config::default();
        config.server.base_url = "ftp://files".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_humantime_duration_serialization() {
        let toml_str = toml::to_string_pretty(&Config::default()).expect("serialize");
        assert!(toml_str.contains("request_timeout = \"30s\""));
        assert!(toml_str.contains("completion_display_delay = \"2s\""));
    }

    #[test]
    fn test_config_path() {
        assert!(Config::config_path().ends_with("config.toml"));
    }
}
