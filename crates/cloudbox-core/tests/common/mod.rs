//! Common test utilities for `Cloudbox` integration tests.
//!
//! Provides a throwaway HTTP server for API tests and a controllable upload
//! transport for queue tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cloudbox_core::api::ApiClient;
use cloudbox_core::auth::CredentialStore;
use cloudbox_core::config::ServerConfig;
use cloudbox_core::upload::{
    ProgressReporter, RefreshHook, TransferRequest, Transport, UploadReceipt,
};
use cloudbox_core::{Error, Result};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Serve `router` on an ephemeral local port and return the API base URL.
pub async fn spawn_server(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stub server");
    let addr = listener.local_addr().expect("Failed to read local address");
    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("Stub server failed");
    });
    format!("http://{addr}/api")
}

/// Client against `base_url`, logged in with `token` when given.
pub async fn client(base_url: &str, token: Option<&str>) -> ApiClient {
    let credentials = CredentialStore::in_memory();
    if let Some(token) = token {
        credentials
            .store(token.to_string(), None, false)
            .await
            .expect("Failed to store token");
    }
    let config = ServerConfig {
        base_url: base_url.to_string(),
        ..ServerConfig::default()
    };
    ApiClient::new(&config, credentials).expect("Failed to build client")
}

/// One upload the test has not resolved yet.
pub struct PendingTransfer {
    /// File name of the transfer
    pub name: String,
    /// Progress sink handed to the transport
    pub progress: ProgressReporter,
    finish: oneshot::Sender<Result<UploadReceipt>>,
}

impl PendingTransfer {
    /// Let the transfer succeed.
    pub fn succeed(self) {
        let _ = self.finish.send(Ok(UploadReceipt::default()));
    }

    /// Let the transfer fail with a server error.
    pub fn fail(self, message: &str) {
        let _ = self.finish.send(Err(Error::server(500, message)));
    }
}

/// Transport whose transfers finish only when the test says so.
///
/// Every started transfer shows up on the receiver returned by
/// [`GatedTransport::new`]. Cancelling returns [`Error::Aborted`] at once.
pub struct GatedTransport {
    started: mpsc::UnboundedSender<PendingTransfer>,
}

impl GatedTransport {
    /// Create the transport and the feed of started transfers.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<PendingTransfer>) {
        let (started, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { started }), rx)
    }
}

impl Transport for GatedTransport {
    async fn upload(
        &self,
        request: TransferRequest,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<UploadReceipt> {
        let (finish, done) = oneshot::channel();
        let _ = self.started.send(PendingTransfer {
            name: request.source.name().to_string(),
            progress,
            finish,
        });

        tokio::select! {
            () = cancel.cancelled() => Err(Error::Aborted),
            outcome = done => outcome.unwrap_or(Err(Error::Aborted)),
        }
    }
}

/// [`RefreshHook`] that counts notifications.
#[derive(Default)]
pub struct CountingRefresh {
    /// Listing refreshes requested
    pub listing: AtomicUsize,
    /// Quota refreshes requested
    pub quota: AtomicUsize,
}

impl CountingRefresh {
    /// `(listing, quota)` counts so far.
    pub fn counts(&self) -> (usize, usize) {
        (
            self.listing.load(Ordering::SeqCst),
            self.quota.load(Ordering::SeqCst),
        )
    }
}

impl RefreshHook for CountingRefresh {
    fn refresh_listing(&self) {
        self.listing.fetch_add(1, Ordering::SeqCst);
    }

    fn refresh_quota(&self) {
        self.quota.fetch_add(1, Ordering::SeqCst);
    }
}

/// Shared log of requests seen by a stub server.
pub type Recorder<T> = Arc<Mutex<Vec<T>>>;
