//! # Cloudbox Core Library
//!
//! `cloudbox-core` provides the client-side machinery for Cloudbox, a
//! self-hosted private cloud storage service: the HTTP API facade, a bounded
//! concurrency upload queue, and the selection and view state that the file
//! browser reads and mutates.
//!
//! ## Features
//!
//! - **Bounded uploads**: At most three transfers at a time, strictly FIFO
//! - **Cancellation**: Pending uploads vanish, in-flight uploads abort cleanly
//! - **Selection state**: Toolbar and select-all state derived from live counts
//! - **Pure rendering**: Listing + view mode + selection in, descriptors out
//!
//! ## Modules
//!
//! - [`api`] - Authenticated HTTP client for the storage API
//! - [`auth`] - Bearer token persistence ("remember me")
//! - [`batch`] - Batch delete and download over the current selection
//! - [`config`] - Configuration management
//! - [`dialogs`] - Share, rename, folder, settings and preview controllers
//! - [`listing`] - Listing queries and folder navigation
//! - [`prefs`] - Persisted view mode and theme preferences
//! - [`selection`] - Selection store
//! - [`session`] - Owned bundle of the stores for one logged-in session
//! - [`upload`] - Upload queue state machine and its async driver
//! - [`view`] - View modes and the pure renderer
//!
//! ## Example
//!
//! ```rust,ignore
//! use cloudbox_core::session::Session;
//! use cloudbox_core::upload::UploadSource;
//!
//! let mut session = Session::start(Config::load()?)?;
//! session.refresh().await?;
//! let source = UploadSource::from_path("holiday.jpg").await?;
//! session.uploads().enqueue(source, None).await?;
//! session.uploads().wait_idle().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::unused_async)]
#![allow(clippy::len_without_is_empty)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod api;
pub mod auth;
pub mod batch;
pub mod config;
pub mod dialogs;
pub mod error;
pub mod listing;
pub mod prefs;
pub mod selection;
pub mod session;
pub mod upload;
pub mod view;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Largest file accepted for upload (10 GiB)
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024 * 1024;

/// Maximum number of simultaneous upload transfers
pub const MAX_CONCURRENT_UPLOADS: usize = 3;

/// How long a finished upload stays visible, in milliseconds
pub const DEFAULT_COMPLETION_DISPLAY_MS: u64 = 2000;

/// Default API root of a local server
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";

/// Default timeout for non-upload requests in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
