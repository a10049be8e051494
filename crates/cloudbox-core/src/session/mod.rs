//! One logged-in browsing session.
//!
//! A [`Session`] owns the stores the file browser reads: the current
//! [`Listing`], the [`SelectionStore`], the [`Navigator`] and the
//! [`Preferences`]. It also holds a handle to the [`UploadManager`]. Upload
//! completions raise refresh flags, and [`Session::sync`] applies and clears
//! them. The session is the only writer of its stores.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, Category, FileId, StorageInfo};
use crate::auth::CredentialStore;
use crate::batch::{self, BatchReport};
use crate::config::Config;
use crate::error::Result;
use crate::listing::{ListQuery, Listing, Navigator};
use crate::prefs::Preferences;
use crate::selection::SelectionStore;
use crate::upload::{QueueLimits, RefreshHook, UploadManager};
use crate::view::{render, RenderDescriptor, ViewMode};

/// Refreshes the upload queue has asked for and nobody has applied yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingRefresh {
    /// Reload the current listing
    pub listing: bool,
    /// Reload the storage quota
    pub quota: bool,
}

impl PendingRefresh {
    /// Whether nothing is pending.
    pub const fn is_empty(self) -> bool {
        !self.listing && !self.quota
    }
}

/// [`RefreshHook`] that raises flags in a `watch` channel.
///
/// Any number of requests collapse into at most one pending listing reload
/// and one pending quota reload.
#[derive(Debug, Clone)]
pub struct RefreshFlags {
    tx: Arc<watch::Sender<PendingRefresh>>,
}

impl RefreshFlags {
    /// Create the hook with nothing pending.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(PendingRefresh::default());
        Self { tx: Arc::new(tx) }
    }

    /// Current requests, without clearing them.
    pub fn pending(&self) -> PendingRefresh {
        *self.tx.borrow()
    }

    /// Clear and return the current requests.
    pub fn take(&self) -> PendingRefresh {
        let mut taken = PendingRefresh::default();
        self.tx.send_if_modified(|pending| {
            taken = std::mem::take(pending);
            false
        });
        taken
    }

    /// Wait until something is pending, then clear and return it.
    pub async fn next(&self) -> PendingRefresh {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|pending| !pending.is_empty()).await;
        self.take()
    }

    fn raise(&self, set: impl FnOnce(&mut PendingRefresh)) {
        self.tx.send_modify(set);
    }
}

impl Default for RefreshFlags {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshHook for RefreshFlags {
    fn refresh_listing(&self) {
        self.raise(|pending| pending.listing = true);
    }

    fn refresh_quota(&self) {
        self.raise(|pending| pending.quota = true);
    }
}

/// Stores and handles of one logged-in session.
#[derive(Debug)]
pub struct Session {
    api: Arc<ApiClient>,
    uploads: UploadManager,
    refreshes: RefreshFlags,
    navigator: Navigator,
    listing: Listing,
    selection: SelectionStore,
    prefs: Preferences,
    quota: Option<StorageInfo>,
}

impl Session {
    /// Start a session from configuration, loading stored credentials and
    /// preferences from their default locations.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a stored file
    /// cannot be read.
    pub fn start(config: &Config) -> Result<Self> {
        Self::with_parts(config, CredentialStore::load()?, Preferences::load()?)
    }

    /// Start a session with explicit stores.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_parts(
        config: &Config,
        credentials: CredentialStore,
        prefs: Preferences,
    ) -> Result<Self> {
        config.validate()?;
        let api = Arc::new(ApiClient::new(&config.server, credentials)?);
        let refreshes = RefreshFlags::new();
        let uploads = UploadManager::spawn(
            Arc::clone(&api),
            Arc::new(refreshes.clone()),
            QueueLimits::from(&config.upload),
        );

        debug!(base = %api.base_url(), "session started");
        Ok(Self {
            api,
            uploads,
            refreshes,
            navigator: Navigator::new(),
            listing: Listing::default(),
            selection: SelectionStore::new(),
            prefs,
            quota: None,
        })
    }

    /// API client.
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Upload queue handle.
    pub fn uploads(&self) -> &UploadManager {
        &self.uploads
    }

    /// Current listing.
    pub fn listing(&self) -> &Listing {
        &self.listing
    }

    /// Current selection.
    pub fn selection(&self) -> &SelectionStore {
        &self.selection
    }

    /// Mutable selection, for toggling entries.
    pub fn selection_mut(&mut self) -> &mut SelectionStore {
        &mut self.selection
    }

    /// Preferences.
    pub fn prefs(&self) -> &Preferences {
        &self.prefs
    }

    /// Listing the user is looking at.
    pub fn query(&self) -> &ListQuery {
        self.navigator.query()
    }

    /// Last loaded quota.
    pub fn quota(&self) -> Option<&StorageInfo> {
        self.quota.as_ref()
    }

    /// Flips to `true` when the server rejects the token.
    pub fn auth_expired(&self) -> watch::Receiver<bool> {
        self.api.subscribe_auth_expired()
    }

    /// Reload the current listing.
    ///
    /// # Errors
    ///
    /// Returns the API error; the previous listing is kept.
    pub async fn refresh(&mut self) -> Result<&Listing> {
        let navigator = self.navigator.clone();
        self.load(navigator).await
    }

    /// Fetch the listing `navigator` points at and make it current. On error
    /// the navigator, listing and selection are left as they were.
    async fn load(&mut self, navigator: Navigator) -> Result<&Listing> {
        let query = navigator.query().clone();
        let entities = self.api.list_files(&query).await?;
        self.selection
            .set_listing(&query, entities.iter().map(|e| e.id));
        debug!(%query, count = entities.len(), "listing loaded");
        self.navigator = navigator;
        self.listing = Listing::new(query, entities);
        Ok(&self.listing)
    }

    /// Reload the storage quota.
    ///
    /// # Errors
    ///
    /// Returns the API error.
    pub async fn refresh_quota(&mut self) -> Result<&StorageInfo> {
        let info = self.api.storage_info().await?;
        Ok(self.quota.insert(info))
    }

    /// Apply refreshes the upload queue asked for since the last call.
    /// Repeated requests of the same kind are merged.
    ///
    /// # Errors
    ///
    /// Returns the first API error.
    pub async fn sync(&mut self) -> Result<()> {
        let pending = self.refreshes.take();
        self.apply(pending).await
    }

    /// Refreshes requested and not yet applied.
    pub fn pending_refresh(&self) -> PendingRefresh {
        self.refreshes.pending()
    }

    /// Wait for the upload queue to request a refresh, then apply it.
    ///
    /// # Errors
    ///
    /// Returns the first API error.
    pub async fn next_refresh(&mut self) -> Result<PendingRefresh> {
        let pending = self.refreshes.next().await;
        self.apply(pending).await?;
        Ok(pending)
    }

    async fn apply(&mut self, pending: PendingRefresh) -> Result<()> {
        if pending.listing {
            self.refresh().await?;
        }
        if pending.quota {
            self.refresh_quota().await?;
        }
        Ok(())
    }

    /// Load an arbitrary listing.
    ///
    /// # Errors
    ///
    /// Returns the API error.
    pub async fn navigate(&mut self, query: ListQuery) -> Result<&Listing> {
        let mut next = self.navigator.clone();
        next.go(query);
        self.load(next).await
    }

    /// Open a folder and load it.
    ///
    /// # Errors
    ///
    /// Returns the API error.
    pub async fn open_folder(&mut self, id: FileId) -> Result<&Listing> {
        let mut next = self.navigator.clone();
        next.open_folder(id);
        self.load(next).await
    }

    /// Filter by category and reload.
    ///
    /// # Errors
    ///
    /// Returns the API error.
    pub async fn show_category(&mut self, category: Option<Category>) -> Result<&Listing> {
        let mut next = self.navigator.clone();
        next.show_category(category);
        self.load(next).await
    }

    /// Search and reload. Blank text clears the search.
    ///
    /// # Errors
    ///
    /// Returns the API error.
    pub async fn search(&mut self, text: &str) -> Result<&Listing> {
        let mut next = self.navigator.clone();
        next.search(text);
        self.load(next).await
    }

    /// Go back to the root listing.
    ///
    /// # Errors
    ///
    /// Returns the API error.
    pub async fn go_root(&mut self) -> Result<&Listing> {
        let mut next = self.navigator.clone();
        next.root();
        self.load(next).await
    }

    /// Render the current listing in the preferred view mode.
    pub fn render(&self) -> Vec<RenderDescriptor> {
        render(&self.listing.entities, self.prefs.view_mode(), &self.selection)
    }

    /// Change and persist the view mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the preferences cannot be saved.
    pub fn set_view_mode(&mut self, mode: ViewMode) -> Result<()> {
        self.prefs.set_view_mode(mode)
    }

    /// Delete the selection, then reload listing and quota.
    ///
    /// A failed reload is logged and does not hide the report.
    ///
    /// # Errors
    ///
    /// See [`batch::batch_delete`].
    pub async fn delete_selected(&mut self) -> Result<BatchReport> {
        let report = batch::batch_delete(self.api.as_ref(), &mut self.selection).await?;
        let pending = PendingRefresh {
            listing: true,
            quota: true,
        };
        if let Err(e) = self.apply(pending).await {
            warn!(error = %e, %report, "reload after delete failed");
        }
        Ok(report)
    }

    /// Download the selection into `dir`.
    ///
    /// # Errors
    ///
    /// See [`batch::batch_download`].
    pub async fn download_selected(&mut self, dir: &Path) -> Result<PathBuf> {
        batch::batch_download(self.api.as_ref(), &mut self.selection, dir).await
    }

    /// End the session: cancel uploads, drop the selection and forget the
    /// token.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials cannot be removed.
    pub async fn logout(&mut self) -> Result<()> {
        let cancelled = self.uploads.cancel_all().await.unwrap_or(0);
        self.selection.clear_all();
        self.listing = Listing::default();
        self.quota = None;
        self.api.logout().await?;
        info!(cancelled, "session ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_flags_collapse_requests() {
        let flags = RefreshFlags::new();
        for _ in 0..1000 {
            flags.refresh_listing();
            flags.refresh_quota();
        }
        assert_eq!(
            flags.take(),
            PendingRefresh {
                listing: true,
                quota: true
            }
        );
        assert!(flags.take().is_empty());
    }

    #[tokio::test]
    async fn test_next_waits_for_request() {
        let flags = RefreshFlags::new();
        let hook = flags.clone();
        let waiter = tokio::spawn(async move { flags.next().await });

        tokio::task::yield_now().await;
        hook.refresh_quota();

        let pending = waiter.await.unwrap();
        assert!(pending.quota);
        assert!(!pending.listing);
        assert!(hook.pending().is_empty());
    }

    #[tokio::test]
    async fn test_logout_clears_local_state() {
        let config = Config::default();
        let credentials = CredentialStore::in_memory();
        credentials.store("tok".into(), None, false).await.unwrap();

        let mut session =
            Session::with_parts(&config, credentials.clone(), Preferences::in_memory()).unwrap();
        session.logout().await.unwrap();

        assert!(!credentials.is_authenticated().await);
        assert!(session.selection().is_empty());
        assert!(session.listing().is_empty());
        assert!(session.uploads().snapshot().is_idle());
    }
}
