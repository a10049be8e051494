//! Upload task lifecycle.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::UploadSource;
use crate::api::FileId;
use crate::error::{Error, Result};

/// Identifier of one upload attempt, unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where an upload is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Waiting for a free slot
    Pending,
    /// Transfer in flight
    Uploading,
    /// Stored by the server
    Success,
    /// Failed; see the task's error
    Error,
    /// Cancelled by the user
    Cancelled,
}

impl UploadStatus {
    /// Whether no further transitions are allowed.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Cancelled)
    }

    /// Whether `self -> next` is a legal lifecycle step.
    ///
    /// `pending -> uploading -> {success | error}`, and
    /// `{pending | uploading} -> cancelled`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Uploading | Self::Cancelled)
                | (Self::Uploading, Self::Success | Self::Error | Self::Cancelled)
        )
    }

    /// Short label for display.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "waiting",
            Self::Uploading => "uploading",
            Self::Success => "done",
            Self::Error => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Uploading => "uploading",
            Self::Success => "success",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Handle to an in-flight transfer, used only to abort it.
#[derive(Debug, Clone, Default)]
pub struct TransferHandle {
    cancel: CancellationToken,
}

impl TransferHandle {
    /// Create a handle with a fresh cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Token the transport watches.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request termination of the transfer.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    /// Whether termination was requested.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// One file's upload attempt.
#[derive(Debug)]
pub struct UploadTask {
    id: TaskId,
    name: String,
    size: u64,
    parent_id: Option<FileId>,
    progress: f64,
    status: UploadStatus,
    error: Option<String>,
    payload: Option<UploadSource>,
    transfer: Option<TransferHandle>,
}

impl UploadTask {
    pub(crate) fn new(source: UploadSource, parent_id: Option<FileId>) -> Self {
        Self {
            id: TaskId::new(),
            name: source.name().to_string(),
            size: source.size(),
            parent_id,
            progress: 0.0,
            status: UploadStatus::Pending,
            error: None,
            payload: Some(source),
            transfer: None,
        }
    }

    /// Identifier.
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// File name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File size in bytes.
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Destination folder.
    pub const fn parent_id(&self) -> Option<FileId> {
        self.parent_id
    }

    /// Percentage in `[0, 100]`.
    pub const fn progress(&self) -> f64 {
        self.progress
    }

    /// Lifecycle status.
    pub const fn status(&self) -> UploadStatus {
        self.status
    }

    /// Failure reason; present iff the status is `error`.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Transfer handle; present iff the status is `uploading`.
    pub const fn transfer(&self) -> Option<&TransferHandle> {
        self.transfer.as_ref()
    }

    pub(crate) fn transition(&mut self, next: UploadStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                task: self.id.as_uuid(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!(task = %self.id, file = %self.name, "{} -> {}", self.status, next);
        self.status = next;
        Ok(())
    }

    /// Moves to `uploading`, handing the payload to the transfer.
    pub(crate) fn start(&mut self) -> Result<(UploadSource, TransferHandle)> {
        self.transition(UploadStatus::Uploading)?;
        let payload = self
            .payload
            .take()
            .ok_or_else(|| Error::Internal(format!("upload {} has no payload", self.id)))?;
        let handle = TransferHandle::new();
        self.transfer = Some(handle.clone());
        Ok((payload, handle))
    }

    /// Applies a progress report; returns the new percentage if it advanced.
    pub(crate) fn advance(&mut self, sent: u64, total: Option<u64>) -> Option<f64> {
        if self.status != UploadStatus::Uploading {
            return None;
        }
        let total = total.filter(|t| *t > 0)?;
        let pct = (sent as f64 / total as f64 * 100.0).clamp(0.0, 100.0);
        if pct > self.progress {
            self.progress = pct;
            Some(pct)
        } else {
            None
        }
    }

    pub(crate) fn succeed(&mut self) -> Result<()> {
        self.transition(UploadStatus::Success)?;
        self.progress = 100.0;
        self.transfer = None;
        Ok(())
    }

    pub(crate) fn fail(&mut self, reason: String) -> Result<()> {
        self.transition(UploadStatus::Error)?;
        self.error = Some(reason);
        self.transfer = None;
        Ok(())
    }

    /// Moves to `cancelled`, aborting the transfer if one is running.
    pub(crate) fn cancel(&mut self) -> Result<Option<TransferHandle>> {
        self.transition(UploadStatus::Cancelled)?;
        self.payload = None;
        let handle = self.transfer.take();
        if let Some(handle) = &handle {
            handle.abort();
        }
        Ok(handle)
    }

    /// Read-only copy for rendering.
    pub fn view(&self) -> UploadTaskView {
        UploadTaskView {
            id: self.id,
            name: self.name.clone(),
            size: self.size,
            progress: self.progress,
            status: self.status,
            error: self.error.clone(),
        }
    }
}

/// Snapshot of a task as shown in the upload list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadTaskView {
    /// Identifier
    pub id: TaskId,
    /// File name
    pub name: String,
    /// File size in bytes
    pub size: u64,
    /// Percentage in `[0, 100]`
    pub progress: f64,
    /// Lifecycle status
    pub status: UploadStatus,
    /// Failure reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::SourceData;
    use std::sync::Arc;

    fn task(size: u64) -> UploadTask {
        let data = SourceData::Memory(Arc::from(vec![0u8; 4]));
        UploadTask::new(UploadSource::new("a.txt", size, data), None)
    }

    #[test]
    fn test_transition_table() {
        use UploadStatus::{Cancelled, Error, Pending, Success, Uploading};

        assert!(Pending.can_transition_to(Uploading));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Uploading.can_transition_to(Success));
        assert!(Uploading.can_transition_to(Error));
        assert!(Uploading.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(Success));
        assert!(!Uploading.can_transition_to(Pending));
        for terminal in [Success, Error, Cancelled] {
            for next in [Pending, Uploading, Success, Error, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_handle_present_only_while_uploading() {
        let mut t = task(4);
        assert!(t.transfer().is_none());

        t.start().unwrap();
        assert!(t.transfer().is_some());

        t.succeed().unwrap();
        assert!(t.transfer().is_none());
        assert!((t.progress() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut t = task(100);
        assert_eq!(t.advance(10, Some(100)), None, "pending tasks ignore progress");

        t.start().unwrap();
        assert_eq!(t.advance(50, Some(100)), Some(50.0));
        assert_eq!(t.advance(40, Some(100)), None);
        assert!((t.progress() - 50.0).abs() < f64::EPSILON);
        assert_eq!(t.advance(80, None), None, "unknown total stays indeterminate");
        assert_eq!(t.advance(500, Some(100)), Some(100.0));
    }

    #[test]
    fn test_error_iff_failed() {
        let mut t = task(4);
        t.start().unwrap();
        t.fail("disk full".into()).unwrap();
        assert_eq!(t.status(), UploadStatus::Error);
        assert_eq!(t.error(), Some("disk full"));

        assert!(t.cancel().is_err(), "terminal tasks cannot be cancelled");
    }

    #[test]
    fn test_cancel_aborts_transfer() {
        let mut t = task(4);
        let (_, handle) = t.start().unwrap();
        let aborted = t.cancel().unwrap().expect("uploading task has a handle");
        assert!(aborted.is_aborted());
        assert!(handle.is_aborted());
    }

    #[test]
    fn test_task_ids_are_unique() {
        let ids: std::collections::HashSet<_> = (0..1000).map(|_| TaskId::new()).collect();
        assert_eq!(ids.len(), 1000);
    }
}
