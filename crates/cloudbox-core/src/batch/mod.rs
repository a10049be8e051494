//! Batch operations over the current selection.
//!
//! Each item is attempted on its own: one failure does not stop the rest,
//! and the outcome is tallied in a [`BatchReport`]. The selection is cleared
//! afterwards whatever the outcome. The one exception to try/continue is an
//! expired session, which would fail every remaining item the same way.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::api::{ApiClient, FileId};
use crate::error::{Error, Result};
use crate::selection::SelectionStore;

/// Server operations batch actions need.
pub trait RemoteFiles: Send + Sync {
    /// Delete one entry.
    fn delete_file(&self, id: FileId) -> impl Future<Output = Result<()>> + Send;

    /// Download one file into `dest`.
    fn download_file(&self, id: FileId, dest: &Path) -> impl Future<Output = Result<PathBuf>> + Send;

    /// Download several files as a zip archive at `dest`.
    fn batch_download(
        &self,
        ids: &[FileId],
        dest: &Path,
    ) -> impl Future<Output = Result<PathBuf>> + Send;
}

impl RemoteFiles for ApiClient {
    async fn delete_file(&self, id: FileId) -> Result<()> {
        Self::delete_file(self, id).await
    }

    async fn download_file(&self, id: FileId, dest: &Path) -> Result<PathBuf> {
        Self::download_file(self, id, dest).await
    }

    async fn batch_download(&self, ids: &[FileId], dest: &Path) -> Result<PathBuf> {
        Self::batch_download(self, ids, dest).await
    }
}

/// Tally of a batch operation.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Items that went through
    pub succeeded: Vec<FileId>,
    /// Items that failed, with the reason
    pub failed: Vec<(FileId, Error)>,
}

impl BatchReport {
    /// Whether every item went through.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed",
            self.succeeded.len(),
            self.failed.len()
        )
    }
}

/// Delete every selected entry.
///
/// # Errors
///
/// [`Error::NothingSelected`] for an empty selection, or
/// [`Error::AuthExpired`] if the session ended part-way; the selection is
/// cleared in that case too.
pub async fn batch_delete<R>(remote: &R, selection: &mut SelectionStore) -> Result<BatchReport>
where
    R: RemoteFiles + ?Sized,
{
    let ids = selection.selected_ids();
    if ids.is_empty() {
        return Err(Error::NothingSelected);
    }

    let mut report = BatchReport::default();
    let mut fatal = None;
    for id in ids {
        match remote.delete_file(id).await {
            Ok(()) => report.succeeded.push(id),
            Err(e @ (Error::AuthExpired | Error::NotAuthenticated)) => {
                fatal = Some(e);
                break;
            }
            Err(e) => {
                warn!(file = %id, "delete failed: {e}");
                report.failed.push((id, e));
            }
        }
    }

    selection.clear_all();
    if let Some(e) = fatal {
        return Err(e);
    }

    info!("batch delete: {report}");
    Ok(report)
}

/// Download every selected file into `dir`.
///
/// A single file is saved under its own name; several are fetched as
/// `batch_download_<unix millis>.zip`. The selection is cleared on success.
///
/// # Errors
///
/// [`Error::NothingSelected`] for an empty selection, or the download error.
pub async fn batch_download<R>(
    remote: &R,
    selection: &mut SelectionStore,
    dir: &Path,
) -> Result<PathBuf>
where
    R: RemoteFiles + ?Sized,
{
    let ids = selection.selected_ids();
    let path = match ids.as_slice() {
        [] => return Err(Error::NothingSelected),
        [id] => remote.download_file(*id, dir).await?,
        many => {
            let archive = dir.join(archive_name(chrono::Utc::now().timestamp_millis()));
            remote.batch_download(many, &archive).await?
        }
    };

    selection.clear_all();
    Ok(path)
}

/// File name of a multi-file download.
pub fn archive_name(unix_millis: i64) -> String {
    format!("batch_download_{unix_millis}.zip")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::ListQuery;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeRemote {
        failing: Vec<FileId>,
        expired_at: Option<FileId>,
        deleted: Mutex<Vec<FileId>>,
        archives: Mutex<Vec<(Vec<FileId>, PathBuf)>>,
    }

    impl RemoteFiles for FakeRemote {
        async fn delete_file(&self, id: FileId) -> Result<()> {
            if self.expired_at == Some(id) {
                return Err(Error::AuthExpired);
            }
            if self.failing.contains(&id) {
                return Err(Error::server(404, "文件不存在"));
            }
            self.deleted.lock().unwrap().push(id);
            Ok(())
        }

        async fn download_file(&self, id: FileId, dest: &Path) -> Result<PathBuf> {
            Ok(dest.join(format!("file-{id}")))
        }

        async fn batch_download(&self, ids: &[FileId], dest: &Path) -> Result<PathBuf> {
            self.archives
                .lock()
                .unwrap()
                .push((ids.to_vec(), dest.to_path_buf()));
            Ok(dest.to_path_buf())
        }
    }

    fn selected(ids: &[i64]) -> SelectionStore {
        let mut store = SelectionStore::new();
        store.set_listing(&ListQuery::root(), (1..=5).map(FileId));
        store.select_all(ids.iter().copied().map(FileId));
        store
    }

    #[tokio::test]
    async fn test_partial_failure_is_tallied() {
        let remote = FakeRemote {
            failing: vec![FileId(2)],
            ..FakeRemote::default()
        };
        let mut selection = selected(&[1, 2, 3]);

        let report = batch_delete(&remote, &mut selection).await.unwrap();
        assert_eq!(report.to_string(), "2 succeeded, 1 failed");
        assert_eq!(report.failed[0].0, FileId(2));
        assert!(selection.is_empty());
        assert_eq!(*remote.deleted.lock().unwrap(), vec![FileId(1), FileId(3)]);
    }

    #[tokio::test]
    async fn test_expired_session_stops_the_batch() {
        let remote = FakeRemote {
            expired_at: Some(FileId(2)),
            ..FakeRemote::default()
        };
        let mut selection = selected(&[1, 2, 3]);

        let err = batch_delete(&remote, &mut selection).await.unwrap_err();
        assert!(matches!(err, Error::AuthExpired));
        assert!(selection.is_empty());
        assert_eq!(*remote.deleted.lock().unwrap(), vec![FileId(1)]);
    }

    #[tokio::test]
    async fn test_empty_selection() {
        let remote = FakeRemote::default();
        let mut selection = selected(&[]);
        assert!(matches!(
            batch_delete(&remote, &mut selection).await,
            Err(Error::NothingSelected)
        ));
        assert!(matches!(
            batch_download(&remote, &mut selection, Path::new("/tmp")).await,
            Err(Error::NothingSelected)
        ));
    }

    #[tokio::test]
    async fn test_single_download_skips_archive() {
        let remote = FakeRemote::default();
        let mut selection = selected(&[4]);

        let path = batch_download(&remote, &mut selection, Path::new("/tmp"))
            .await
            .unwrap();
        assert_eq!(path, Path::new("/tmp/file-4"));
        assert!(remote.archives.lock().unwrap().is_empty());
        assert!(selection.is_empty());
    }

    #[tokio::test]
    async fn test_multi_download_uses_archive() {
        let remote = FakeRemote::default();
        let mut selection = selected(&[3, 1]);

        let path = batch_download(&remote, &mut selection, Path::new("/tmp"))
            .await
            .unwrap();
        let archives = remote.archives.lock().unwrap();
        assert_eq!(archives[0].0, vec![FileId(1), FileId(3)]);
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("batch_download_") && name.ends_with(".zip"));
    }

    #[test]
    fn test_archive_name() {
        assert_eq!(archive_name(1_700_000_000_000), "batch_download_1700000000000.zip");
    }
}
