//! Async driver for the upload queue.
//!
//! One event-loop task owns the [`UploadQueue`]. Callers, transfer tasks and
//! removal timers talk to it over a single command channel, so every
//! transition is applied in arrival order and no lock is held across an
//! await point.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::queue::{CancelOutcome, Effect, QueueLimits, QueueSnapshot, UploadQueue};
use super::task::{TaskId, UploadStatus};
use super::{ProgressReporter, RefreshHook, TransferRequest, Transport, UploadReceipt, UploadSource};
use crate::api::{FileId, UploadedFile};
use crate::error::{Error, Result};

const EVENT_CAPACITY: usize = 256;

/// Notification about a change in the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// Task accepted into the queue
    Queued {
        /// Task
        id: TaskId,
        /// File name
        name: String,
    },
    /// Transfer started
    Started {
        /// Task
        id: TaskId,
    },
    /// Percentage advanced
    Progress {
        /// Task
        id: TaskId,
        /// Percentage in `[0, 100]`
        percent: f64,
    },
    /// Server stored the file
    Succeeded {
        /// Task
        id: TaskId,
        /// Stored record, if returned
        file: Option<UploadedFile>,
    },
    /// Transfer failed
    Failed {
        /// Task
        id: TaskId,
        /// Reason shown to the user
        reason: String,
    },
    /// Task cancelled
    Cancelled {
        /// Task
        id: TaskId,
    },
    /// Finished task dropped from the list
    Removed {
        /// Task
        id: TaskId,
    },
}

/// Result of queueing several files at once.
#[derive(Debug, Default)]
pub struct EnqueueReport {
    /// Accepted tasks, in input order
    pub queued: Vec<TaskId>,
    /// Rejected files with the reason
    pub rejected: Vec<(String, Error)>,
}

enum Command {
    Enqueue {
        source: UploadSource,
        parent_id: Option<FileId>,
        reply: oneshot::Sender<Result<TaskId>>,
    },
    Cancel {
        id: TaskId,
        reply: oneshot::Sender<CancelOutcome>,
    },
    CancelAll {
        reply: oneshot::Sender<usize>,
    },
    Dismiss {
        id: TaskId,
        reply: oneshot::Sender<bool>,
    },
    Progress {
        id: TaskId,
        sent: u64,
        total: Option<u64>,
    },
    Finished {
        id: TaskId,
        outcome: Result<UploadReceipt>,
    },
    Expire {
        id: TaskId,
    },
}

/// Handle to a running upload queue.
///
/// Cloning is cheap; the event loop stops once every handle is dropped.
#[derive(Clone)]
pub struct UploadManager {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<QueueSnapshot>,
    events: broadcast::Sender<UploadEvent>,
}

impl std::fmt::Debug for UploadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadManager")
            .field("snapshot", &*self.snapshot.borrow())
            .finish_non_exhaustive()
    }
}

impl UploadManager {
    /// Start the event loop on the current Tokio runtime.
    pub fn spawn<T: Transport>(
        transport: Arc<T>,
        hooks: Arc<dyn RefreshHook>,
        limits: QueueLimits,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(QueueSnapshot::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let driver = Driver {
            queue: UploadQueue::new(limits),
            transport,
            hooks,
            commands: commands.downgrade(),
            snapshot: snapshot_tx,
            events: events.clone(),
        };
        tokio::spawn(driver.run(rx));

        Self {
            commands,
            snapshot,
            events,
        }
    }

    async fn request<R>(&self, build: impl FnOnce(oneshot::Sender<R>) -> Command) -> Result<R> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())
    }

    /// Queue one file.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyName`] or [`Error::SizeExceeded`] when the file is
    /// rejected; nothing is queued in that case.
    pub async fn enqueue(&self, source: UploadSource, parent_id: Option<FileId>) -> Result<TaskId> {
        self.request(|reply| Command::Enqueue {
            source,
            parent_id,
            reply,
        })
        .await?
    }

    /// Queue several files, skipping the ones that are rejected.
    pub async fn enqueue_many(
        &self,
        sources: impl IntoIterator<Item = UploadSource>,
        parent_id: Option<FileId>,
    ) -> EnqueueReport {
        let mut report = EnqueueReport::default();
        for source in sources {
            let name = source.name().to_string();
            match self.enqueue(source, parent_id).await {
                Ok(id) => report.queued.push(id),
                Err(e) => {
                    warn!(file = %name, "skipping upload: {e}");
                    report.rejected.push((name, e));
                }
            }
        }
        report
    }

    /// Cancel a task.
    ///
    /// # Errors
    ///
    /// Returns an error only if the event loop has stopped.
    pub async fn cancel(&self, id: TaskId) -> Result<CancelOutcome> {
        self.request(|reply| Command::Cancel { id, reply }).await
    }

    /// Cancel every unfinished task. Returns how many were cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error only if the event loop has stopped.
    pub async fn cancel_all(&self) -> Result<usize> {
        self.request(|reply| Command::CancelAll { reply }).await
    }

    /// Remove a finished task from the list.
    ///
    /// # Errors
    ///
    /// Returns an error only if the event loop has stopped.
    pub async fn dismiss(&self, id: TaskId) -> Result<bool> {
        self.request(|reply| Command::Dismiss { id, reply }).await
    }

    /// The latest published state.
    pub fn snapshot(&self) -> QueueSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<QueueSnapshot> {
        self.snapshot.clone()
    }

    /// Receive per-task events.
    pub fn events(&self) -> broadcast::Receiver<UploadEvent> {
        self.events.subscribe()
    }

    /// Wait until nothing is pending or in flight.
    pub async fn wait_idle(&self) {
        let mut rx = self.snapshot.clone();
        // An Err means the loop is gone, which is idle too.
        let _ = rx.wait_for(QueueSnapshot::is_idle).await;
    }

    /// Cancel everything and wait for transfers to stop.
    ///
    /// # Errors
    ///
    /// Returns an error only if the event loop has stopped.
    pub async fn shutdown(&self) -> Result<()> {
        let cancelled = self.cancel_all().await?;
        debug!(cancelled, "shutting down upload queue");
        self.wait_idle().await;
        Ok(())
    }
}

fn stopped() -> Error {
    Error::Internal("upload queue is not running".into())
}

struct Driver<T> {
    queue: UploadQueue,
    transport: Arc<T>,
    hooks: Arc<dyn RefreshHook>,
    commands: mpsc::WeakUnboundedSender<Command>,
    snapshot: watch::Sender<QueueSnapshot>,
    events: broadcast::Sender<UploadEvent>,
}

impl<T: Transport> Driver<T> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            self.handle(command);
            self.publish();
        }
        debug!("upload queue stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Enqueue {
                source,
                parent_id,
                reply,
            } => {
                let name = source.name().to_string();
                let result = self.queue.enqueue(source, parent_id).map(|(id, effects)| {
                    self.emit(UploadEvent::Queued { id, name });
                    self.apply(effects);
                    id
                });
                let _ = reply.send(result);
            }
            Command::Cancel { id, reply } => {
                let (outcome, effects) = self.queue.cancel(id);
                if matches!(outcome, CancelOutcome::Removed | CancelOutcome::Aborting) {
                    self.emit(UploadEvent::Cancelled { id });
                }
                self.apply(effects);
                let _ = reply.send(outcome);
            }
            Command::CancelAll { reply } => {
                let ids: Vec<TaskId> = self
                    .queue
                    .tasks()
                    .iter()
                    .filter(|t| !t.status().is_terminal())
                    .map(super::UploadTask::id)
                    .collect();
                let (count, effects) = self.queue.cancel_all();
                for id in ids {
                    self.emit(UploadEvent::Cancelled { id });
                }
                self.apply(effects);
                let _ = reply.send(count);
            }
            Command::Dismiss { id, reply } => {
                let removed = self.queue.dismiss(id);
                if removed {
                    self.emit(UploadEvent::Removed { id });
                }
                let _ = reply.send(removed);
            }
            Command::Progress { id, sent, total } => {
                if let Some(percent) = self.queue.on_progress(id, sent, total) {
                    self.emit(UploadEvent::Progress { id, percent });
                }
            }
            Command::Finished { id, outcome } => {
                let file = outcome.as_ref().ok().and_then(|r| r.file.clone());
                let was_uploading = self
                    .queue
                    .get(id)
                    .is_some_and(|t| t.status() == UploadStatus::Uploading);
                let effects = self.queue.on_finished(id, outcome);
                if was_uploading {
                    match self.queue.get(id) {
                        Some(task) if task.status() == UploadStatus::Success => {
                            self.emit(UploadEvent::Succeeded { id, file });
                        }
                        Some(task) if task.status() == UploadStatus::Error => {
                            self.emit(UploadEvent::Failed {
                                id,
                                reason: task.error().unwrap_or_default().to_string(),
                            });
                        }
                        Some(_) => {}
                        // Aborted without a cancel request.
                        None => self.emit(UploadEvent::Cancelled { id }),
                    }
                }
                self.apply(effects);
            }
            Command::Expire { id } => {
                if self.queue.remove_finished(id) {
                    self.emit(UploadEvent::Removed { id });
                }
            }
        }
    }

    fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StartTransfer { request, cancel } => self.start(request, cancel),
                Effect::ScheduleRemoval { id, after } => self.schedule_removal(id, after),
                Effect::RefreshListing => self.hooks.refresh_listing(),
                Effect::RefreshQuota => self.hooks.refresh_quota(),
            }
        }
    }

    fn start(&self, request: TransferRequest, cancel: CancellationToken) {
        let id = request.task_id;
        self.emit(UploadEvent::Started { id });

        let progress_tx = self.commands.clone();
        let progress = ProgressReporter::new(move |sent, total| {
            if let Some(tx) = progress_tx.upgrade() {
                let _ = tx.send(Command::Progress { id, sent, total });
            }
        });

        let transport = Arc::clone(&self.transport);
        let done_tx = self.commands.clone();
        tokio::spawn(async move {
            let outcome = transport.upload(request, progress, cancel).await;
            match done_tx.upgrade() {
                Some(tx) => {
                    let _ = tx.send(Command::Finished { id, outcome });
                }
                None => debug!(task = %id, "upload finished after the queue stopped"),
            }
        });
    }

    fn schedule_removal(&self, id: TaskId, after: Duration) {
        let tx = self.commands.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::Expire { id });
            }
        });
    }

    fn emit(&self, event: UploadEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        let snapshot = self.queue.snapshot();
        self.snapshot.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}
