//! Upload queue for Cloudbox.
//!
//! Files are queued as [`UploadTask`]s and transferred at most
//! `max_concurrent_uploads` at a time, strictly in the order they were
//! queued. The state lives in [`UploadQueue`], a synchronous state machine
//! whose transitions return [`Effect`]s. [`UploadManager`] owns one queue
//! inside a single event-loop task and turns those effects into spawned
//! transfers, timers and refresh notifications.
//!
//! ## Lifecycle
//!
//! ```text
//! pending ──▶ uploading ──▶ success ──(display delay)──▶ removed
//!    │            ├───────▶ error   ──(dismiss)────────▶ removed
//!    └────────────┴───────▶ cancelled ─────────────────▶ removed
//! ```
//!
//! A cancelled transfer keeps its slot until the transport reports the
//! abort, so the number of live transfers never exceeds the limit.
//!
//! ## Example
//!
//! ```rust,ignore
//! use cloudbox_core::upload::{NoRefresh, QueueLimits, UploadManager, UploadSource};
//!
//! let manager = UploadManager::spawn(api, Arc::new(NoRefresh), QueueLimits::default());
//! let id = manager.enqueue(UploadSource::from_path("a.jpg").await?, None).await?;
//! manager.wait_idle().await;
//! ```

mod manager;
mod queue;
mod task;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub use manager::{EnqueueReport, UploadEvent, UploadManager};
pub use queue::{CancelOutcome, Effect, QueueLimits, QueueSnapshot, UploadQueue};
pub use task::{TaskId, TransferHandle, UploadStatus, UploadTask, UploadTaskView};

use crate::api::{FileId, UploadedFile};
use crate::error::{Error, Result};

/// Bytes behind an [`UploadSource`].
#[derive(Debug, Clone)]
pub enum SourceData {
    /// Streamed from a file on disk
    File(PathBuf),
    /// Held in memory
    Memory(Arc<[u8]>),
}

/// A file chosen for upload.
#[derive(Debug, Clone)]
pub struct UploadSource {
    name: String,
    size: u64,
    data: SourceData,
}

impl UploadSource {
    /// Build a source from its parts.
    pub fn new(name: impl Into<String>, size: u64, data: SourceData) -> Self {
        Self {
            name: name.into(),
            size,
            data,
        }
    }

    /// Describe a file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for directories and [`Error::Io`] when
    /// the path cannot be inspected.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if metadata.is_dir() {
            return Err(Error::InvalidInput("folders cannot be uploaded".into()));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or(Error::EmptyName)?;

        Ok(Self::new(name, metadata.len(), SourceData::File(path.to_path_buf())))
    }

    /// Wrap an in-memory buffer.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        Self::new(name, bytes.len() as u64, SourceData::Memory(bytes))
    }

    /// File name sent to the server.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size in bytes.
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Where the bytes come from.
    pub const fn data(&self) -> &SourceData {
        &self.data
    }

    /// MIME type guessed from the extension.
    pub fn mime_type(&self) -> String {
        mime_guess::from_path(&self.name)
            .first_or_octet_stream()
            .to_string()
    }
}

/// Everything a transport needs to perform one upload.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Task being served
    pub task_id: TaskId,
    /// File to send
    pub source: UploadSource,
    /// Destination folder
    pub parent_id: Option<FileId>,
}

/// What the server returned for a completed upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Stored file record, when the server includes one
    pub file: Option<UploadedFile>,
}

type ProgressFn = dyn Fn(u64, Option<u64>) + Send + Sync;

/// Sink for byte-level progress of one transfer.
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Arc<ProgressFn>,
}

impl ProgressReporter {
    /// Forward every report to `sink`.
    pub fn new(sink: impl Fn(u64, Option<u64>) + Send + Sync + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    /// A reporter that discards everything.
    pub fn noop() -> Self {
        Self::new(|_, _| {})
    }

    /// Report `sent` bytes out of `total`; `None` when the total is unknown.
    pub fn report(&self, sent: u64, total: Option<u64>) {
        (self.sink)(sent, total);
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter").finish_non_exhaustive()
    }
}

/// Performs the byte transfer of an upload.
///
/// Implementations must return [`Error::Aborted`] once `cancel` fires and
/// must not report progress after returning.
pub trait Transport: Send + Sync + 'static {
    /// Upload `request.source`, reporting progress as bytes leave.
    fn upload(
        &self,
        request: TransferRequest,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<UploadReceipt>> + Send;
}

/// Notified after each successful upload.
pub trait RefreshHook: Send + Sync + 'static {
    /// The current listing is stale.
    fn refresh_listing(&self);

    /// The storage quota is stale.
    fn refresh_quota(&self);
}

/// A [`RefreshHook`] that ignores notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRefresh;

impl RefreshHook for NoRefresh {
    fn refresh_listing(&self) {}

    fn refresh_quota(&self) {}
}
