//! Persisted client preferences.
//!
//! The view mode and theme survive restarts. They are stored in
//! `preferences.json` in the data directory under the keys `fileView` and
//! `theme`, and every change is written immediately.

use std::fmt;
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::view::ViewMode;

/// Colour scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Light background
    #[default]
    Light,
    /// Dark background
    Dark,
}

impl Theme {
    /// The other theme.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Light => write!(f, "light"),
            Self::Dark => write!(f, "dark"),
        }
    }
}

impl FromStr for Theme {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            other => Err(Error::InvalidInput(format!("unknown theme '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
struct PrefsData {
    #[serde(rename = "fileView", deserialize_with = "lenient")]
    file_view: ViewMode,
    #[serde(deserialize_with = "lenient")]
    theme: Theme,
}

/// Unknown stored values fall back to the default.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Default,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    let parsed = raw.as_str().and_then(|s| s.parse().ok());
    if parsed.is_none() {
        tracing::warn!(value = %raw, "ignoring unknown stored preference");
    }
    Ok(parsed.unwrap_or_default())
}

/// View mode and theme, persisted on every change.
#[derive(Debug)]
pub struct Preferences {
    path: Option<PathBuf>,
    data: PrefsData,
}

impl Preferences {
    /// Load preferences from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let path = Self::default_path().unwrap_or_else(|| PathBuf::from("preferences.json"));
        Self::load_from(path)
    }

    /// Load from a specific path. A missing file gives the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self {
                path: Some(path),
                data: PrefsData::default(),
            });
        }

        let file = fs::File::open(&path).map_err(|e| {
            Error::ConfigError(format!(
                "Failed to open preferences at {}: {e}",
                path.display()
            ))
        })?;
        let data: PrefsData = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            Error::ConfigError(format!(
                "Failed to parse preferences at {}: {e}",
                path.display()
            ))
        })?;

        Ok(Self {
            path: Some(path),
            data,
        })
    }

    /// Preferences that are never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: PrefsData::default(),
        }
    }

    /// Get the default preferences path.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        crate::config::Config::data_dir().map(|dir| dir.join("preferences.json"))
    }

    /// Listing layout.
    pub const fn view_mode(&self) -> ViewMode {
        self.data.file_view
    }

    /// Colour scheme.
    pub const fn theme(&self) -> Theme {
        self.data.theme
    }

    /// Change and persist the listing layout.
    ///
    /// # Errors
    ///
    /// Returns an error if the preferences cannot be saved.
    pub fn set_view_mode(&mut self, mode: ViewMode) -> Result<()> {
        self.data.file_view = mode;
        self.save()
    }

    /// Change and persist the colour scheme.
    ///
    /// # Errors
    ///
    /// Returns an error if the preferences cannot be saved.
    pub fn set_theme(&mut self, theme: Theme) -> Result<()> {
        self.data.theme = theme;
        self.save()
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!(
                    "Failed to create preferences directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let file = fs::File::create(path).map_err(|e| {
            Error::ConfigError(format!(
                "Failed to create preferences at {}: {e}",
                path.display()
            ))
        })?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.data).map_err(|e| {
            Error::ConfigError(format!(
                "Failed to write preferences at {}: {e}",
                path.display()
            ))
        })
    }
}
