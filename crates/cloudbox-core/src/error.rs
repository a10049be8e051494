//! Error types for Cloudbox.
//!
//! This module provides a unified error type for all Cloudbox operations,
//! with specific error variants for different failure modes. Every variant
//! belongs to one [`ErrorKind`], which decides where the failure is handled:
//! validation errors never reach the network, transport and server errors
//! end up on the task or dialog that started the operation, and
//! [`Error::AuthExpired`] is handled once, globally.

use std::io;

use thiserror::Error;

/// A specialized `Result` type for Cloudbox operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected locally before any network call
    Validation,
    /// Network failure or aborted transfer
    Transport,
    /// The server answered with a failure
    Server,
    /// The stored credentials are no longer accepted
    AuthExpired,
    /// Local configuration, filesystem or internal failure
    Local,
}

/// The main error type for Cloudbox.
#[derive(Error, Debug)]
pub enum Error {
    /// File exceeds the upload size ceiling (E001)
    #[error("file '{name}' is {size} bytes, exceeding the {limit} byte limit")]
    SizeExceeded {
        /// File name
        name: String,
        /// File size in bytes
        size: u64,
        /// Configured ceiling in bytes
        limit: u64,
    },

    /// A file or folder name was empty (E002)
    #[error("name must not be empty")]
    EmptyName,

    /// Batch operation started with nothing selected
    #[error("no files selected")]
    NothingSelected,

    /// Other client-side input validation failure
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Network failure talking to the server (E003)
    #[error("network error: {0}")]
    Network(String),

    /// Transfer was aborted on request (E004)
    #[error("upload cancelled")]
    Aborted,

    /// Server rejected the request (E005)
    #[error("{message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Message extracted from the response body, or a generic fallback
        message: String,
    },

    /// Response body could not be understood (E006)
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Stored credentials were rejected by the server (E007)
    #[error("session expired, please log in again")]
    AuthExpired,

    /// No credentials stored
    #[error("not logged in")]
    NotAuthenticated,

    /// Upload task does not exist
    #[error("upload task {0} not found")]
    TaskNotFound(uuid::Uuid),

    /// Upload task asked to make a transition its lifecycle forbids
    #[error("illegal transition for upload {task}: {from} -> {to}")]
    InvalidTransition {
        /// Task identifier
        task: uuid::Uuid,
        /// Status before the attempted transition
        from: String,
        /// Requested status
        to: String,
    },

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Reason for invalidity
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Builds a server error from a status and message.
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// Returns which part of the taxonomy this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::SizeExceeded { .. }
            | Self::EmptyName
            | Self::NothingSelected
            | Self::InvalidInput(_) => ErrorKind::Validation,
            Self::Network(_) | Self::Aborted => ErrorKind::Transport,
            Self::Server { .. } | Self::MalformedResponse(_) => ErrorKind::Server,
            Self::AuthExpired | Self::NotAuthenticated => ErrorKind::AuthExpired,
            Self::TaskNotFound(_)
            | Self::InvalidTransition { .. }
            | Self::ConfigError(_)
            | Self::InvalidConfig { .. }
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Internal(_) => ErrorKind::Local,
        }
    }

    /// Returns the error code associated with this error, if any.
    ///
    /// Error codes follow the pattern EXXX where XXX is a 3-digit number.
    #[must_use]
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::SizeExceeded { .. } => Some("E001"),
            Self::EmptyName => Some("E002"),
            Self::Network(_) => Some("E003"),
            Self::Aborted => Some("E004"),
            Self::Server { .. } => Some("E005"),
            Self::MalformedResponse(_) => Some("E006"),
            Self::AuthExpired => Some("E007"),
            _ => None,
        }
    }

    /// Returns whether this is the abort of a cancelled transfer.
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Returns a helpful suggestion for resolving the error, if applicable.
    #[must_use]
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::AuthExpired | Self::NotAuthenticated => {
                Some("Log in again with:\n  cloudbox login <username>".into())
            }
            Self::Network(_) => Some(
                "Check that the server is reachable and that `server.base_url`\n\
                 in your config (or --server) points at its /api root."
                    .into(),
            ),
            Self::SizeExceeded { limit, .. } => Some(format!(
                "Files larger than {} cannot be uploaded. Split or compress it first,\n\
                 or raise `upload.max_file_size` in your config.",
                crate::view::format_size(*limit)
            )),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else if let Some(status) = err.status() {
            Self::server(status.as_u16(), format!("request failed ({})", status.as_u16()))
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
