//! The upload queue state machine.

use std::collections::HashSet;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::task::{TaskId, UploadStatus, UploadTask, UploadTaskView};
use super::{TransferRequest, UploadReceipt, UploadSource};
use crate::api::FileId;
use crate::config::UploadConfig;
use crate::error::{Error, Result};

/// Limits the queue enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLimits {
    /// Largest accepted file in bytes
    pub max_file_size: u64,
    /// Simultaneous transfers
    pub max_concurrent: usize,
    /// How long a successful task stays listed
    pub completion_display_delay: Duration,
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self::from(&UploadConfig::default())
    }
}

impl From<&UploadConfig> for QueueLimits {
    fn from(config: &UploadConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            max_concurrent: config.max_concurrent_uploads.max(1),
            completion_display_delay: config.completion_display_delay,
        }
    }
}

/// Side effect requested by a queue transition.
#[derive(Debug)]
pub enum Effect {
    /// Begin transferring a task that just became `uploading`
    StartTransfer {
        /// What to send
        request: TransferRequest,
        /// Fires when the task is cancelled
        cancel: CancellationToken,
    },
    /// Drop a successful task from the list after a delay
    ScheduleRemoval {
        /// Task to drop
        id: TaskId,
        /// Delay
        after: Duration,
    },
    /// Re-fetch the file listing
    RefreshListing,
    /// Re-fetch the storage quota
    RefreshQuota,
}

/// Result of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// No such task is listed
    NotFound,
    /// The task had already finished; nothing changed
    AlreadyFinished,
    /// A pending task was dropped before it started
    Removed,
    /// The transfer was told to abort; its slot frees once it stops
    Aborting,
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueSnapshot {
    /// Listed tasks in enqueue order
    pub tasks: Vec<UploadTaskView>,
    /// Tasks in `uploading`
    pub uploading: usize,
    /// Tasks in `pending`
    pub pending: usize,
    /// Occupied transfer slots, including aborts still winding down
    pub in_flight: usize,
}

impl QueueSnapshot {
    /// Whether nothing is waiting or transferring.
    pub const fn is_idle(&self) -> bool {
        self.pending == 0 && self.in_flight == 0
    }

    /// Look up a task.
    pub fn get(&self, id: TaskId) -> Option<&UploadTaskView> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Number of listed tasks with `status`.
    pub fn count(&self, status: UploadStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }
}

/// Ordered collection of upload tasks with a concurrency cap.
#[derive(Debug, Default)]
pub struct UploadQueue {
    limits: QueueLimits,
    tasks: Vec<UploadTask>,
    /// Cancelled transfers that have not returned yet; each holds a slot.
    draining: HashSet<TaskId>,
}

impl UploadQueue {
    /// Create an empty queue.
    pub fn new(limits: QueueLimits) -> Self {
        Self {
            limits,
            tasks: Vec::new(),
            draining: HashSet::new(),
        }
    }

    /// Limits in force.
    pub const fn limits(&self) -> &QueueLimits {
        &self.limits
    }

    /// Listed tasks in enqueue order.
    pub fn tasks(&self) -> &[UploadTask] {
        &self.tasks
    }

    /// Look up a listed task.
    pub fn get(&self, id: TaskId) -> Option<&UploadTask> {
        self.tasks.iter().find(|t| t.id() == id)
    }

    /// Number of tasks in `uploading`.
    pub fn uploading_count(&self) -> usize {
        self.count(UploadStatus::Uploading)
    }

    /// Number of tasks in `pending`.
    pub fn pending_count(&self) -> usize {
        self.count(UploadStatus::Pending)
    }

    /// Occupied transfer slots.
    pub fn active_slots(&self) -> usize {
        self.uploading_count() + self.draining.len()
    }

    /// Whether nothing is waiting or transferring.
    pub fn is_idle(&self) -> bool {
        self.pending_count() == 0 && self.active_slots() == 0
    }

    fn count(&self, status: UploadStatus) -> usize {
        self.tasks.iter().filter(|t| t.status() == status).count()
    }

    fn position(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| t.id() == id)
    }

    /// Check a source against the queue's limits without queueing it.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyName`] or [`Error::SizeExceeded`].
    pub fn validate(&self, source: &UploadSource) -> Result<()> {
        if source.name().trim().is_empty() {
            return Err(Error::EmptyName);
        }
        if source.size() > self.limits.max_file_size {
            return Err(Error::SizeExceeded {
                name: source.name().to_string(),
                size: source.size(),
                limit: self.limits.max_file_size,
            });
        }
        Ok(())
    }

    /// Append a task and start transfers for any free slots.
    ///
    /// # Errors
    ///
    /// Validation failures leave the queue untouched.
    pub fn enqueue(
        &mut self,
        source: UploadSource,
        parent_id: Option<FileId>,
    ) -> Result<(TaskId, Vec<Effect>)> {
        self.validate(&source)?;

        let task = UploadTask::new(source, parent_id);
        let id = task.id();
        info!(task = %id, file = %task.name(), size = task.size(), "queued upload");
        self.tasks.push(task);

        Ok((id, self.schedule()))
    }

    /// Promote the oldest pending tasks while slots are free.
    pub fn schedule(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();

        while self.active_slots() < self.limits.max_concurrent {
            let Some(idx) = self
                .tasks
                .iter()
                .position(|t| t.status() == UploadStatus::Pending)
            else {
                break;
            };

            let task = &mut self.tasks[idx];
            match task.start() {
                Ok((source, handle)) => {
                    debug!(task = %task.id(), "starting transfer");
                    effects.push(Effect::StartTransfer {
                        request: TransferRequest {
                            task_id: task.id(),
                            source,
                            parent_id: task.parent_id(),
                        },
                        cancel: handle.token(),
                    });
                }
                Err(e) => {
                    warn!(task = %task.id(), "dropping unstartable upload: {e}");
                    self.tasks.remove(idx);
                }
            }
        }

        effects
    }

    /// Apply a progress report. Returns the new percentage if it advanced.
    pub fn on_progress(&mut self, id: TaskId, sent: u64, total: Option<u64>) -> Option<f64> {
        self.tasks
            .iter_mut()
            .find(|t| t.id() == id)
            .and_then(|t| t.advance(sent, total))
    }

    /// Record the outcome of a transfer and refill the freed slot.
    pub fn on_finished(&mut self, id: TaskId, outcome: Result<UploadReceipt>) -> Vec<Effect> {
        if self.draining.remove(&id) {
            debug!(task = %id, "cancelled transfer stopped");
            return self.schedule();
        }

        let mut effects = match self.settle(id, outcome) {
            Ok(effects) => effects,
            Err(e) => {
                debug!(task = %id, "ignoring completion: {e}");
                return Vec::new();
            }
        };
        effects.extend(self.schedule());
        effects
    }

    fn settle(&mut self, id: TaskId, outcome: Result<UploadReceipt>) -> Result<Vec<Effect>> {
        let idx = self
            .position(id)
            .ok_or_else(|| Error::TaskNotFound(id.as_uuid()))?;
        let task = &mut self.tasks[idx];

        match outcome {
            Ok(_) => {
                task.succeed()?;
                info!(task = %id, file = %task.name(), "upload complete");
                Ok(vec![
                    Effect::ScheduleRemoval {
                        id,
                        after: self.limits.completion_display_delay,
                    },
                    Effect::RefreshListing,
                    Effect::RefreshQuota,
                ])
            }
            Err(Error::Aborted) => {
                task.cancel()?;
                debug!(task = %id, "transfer aborted without a cancel request");
                self.tasks.remove(idx);
                Ok(Vec::new())
            }
            Err(e) => {
                warn!(task = %id, file = %task.name(), "upload failed: {e}");
                task.fail(e.to_string())?;
                Ok(Vec::new())
            }
        }
    }

    /// Cancel a task.
    ///
    /// Pending tasks are dropped outright. Uploading tasks leave the list at
    /// once, but keep their slot until [`Self::on_finished`] reports the abort.
    pub fn cancel(&mut self, id: TaskId) -> (CancelOutcome, Vec<Effect>) {
        let Some(idx) = self.position(id) else {
            return (CancelOutcome::NotFound, Vec::new());
        };
        if self.tasks[idx].status().is_terminal() {
            return (CancelOutcome::AlreadyFinished, Vec::new());
        }

        let outcome = match self.tasks[idx].cancel() {
            Ok(Some(_)) => {
                self.draining.insert(id);
                CancelOutcome::Aborting
            }
            Ok(None) => CancelOutcome::Removed,
            Err(e) => {
                warn!(task = %id, "cancel refused: {e}");
                return (CancelOutcome::AlreadyFinished, Vec::new());
            }
        };
        let task = self.tasks.remove(idx);
        info!(task = %id, file = %task.name(), "upload cancelled");

        (outcome, self.schedule())
    }

    /// Cancel every unfinished task. Returns how many were cancelled.
    pub fn cancel_all(&mut self) -> (usize, Vec<Effect>) {
        let mut ids: Vec<(bool, TaskId)> = self
            .tasks
            .iter()
            .filter(|t| !t.status().is_terminal())
            .map(|t| (t.status() == UploadStatus::Uploading, t.id()))
            .collect();
        // Pending first, so no slot opened by a cancel gets refilled.
        ids.sort_by_key(|(uploading, _)| *uploading);

        let mut effects = Vec::new();
        for (_, id) in &ids {
            effects.extend(self.cancel(*id).1);
        }
        (ids.len(), effects)
    }

    /// Remove a finished task the user has acknowledged.
    pub fn dismiss(&mut self, id: TaskId) -> bool {
        self.remove_if(id, |status| {
            matches!(status, UploadStatus::Error | UploadStatus::Success)
        })
    }

    /// Remove a successful task once its display delay has passed.
    pub fn remove_finished(&mut self, id: TaskId) -> bool {
        self.remove_if(id, |status| status == UploadStatus::Success)
    }

    fn remove_if(&mut self, id: TaskId, allowed: impl Fn(UploadStatus) -> bool) -> bool {
        match self.position(id) {
            Some(idx) if allowed(self.tasks[idx].status()) => {
                self.tasks.remove(idx);
                true
            }
            _ => false,
        }
    }

    /// Capture the queue for observers.
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            tasks: self.tasks.iter().map(UploadTask::view).collect(),
            uploading: self.uploading_count(),
            pending: self.pending_count(),
            in_flight: self.active_slots(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> QueueLimits {
        QueueLimits {
            max_file_size: 1024,
            max_concurrent: 3,
            completion_display_delay: Duration::from_secs(2),
        }
    }

    fn source(name: &str) -> UploadSource {
        UploadSource::from_bytes(name, vec![0u8; 16])
    }

    fn started(effects: &[Effect]) -> Vec<String> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::StartTransfer { request, .. } => Some(request.source.name().to_string()),
                _ => None,
            })
            .collect()
    }

    fn enqueue_all(queue: &mut UploadQueue, names: &[&str]) -> (Vec<TaskId>, Vec<String>) {
        let mut ids = Vec::new();
        let mut starts = Vec::new();
        for name in names {
            let (id, effects) = queue.enqueue(source(name), None).unwrap();
            ids.push(id);
            starts.extend(started(&effects));
        }
        (ids, starts)
    }

    #[test]
    fn test_at_most_three_transfers() {
        let mut queue = UploadQueue::new(limits());
        let (_, starts) = enqueue_all(&mut queue, &["a", "b", "c", "d", "e"]);

        assert_eq!(starts, vec!["a", "b", "c"]);
        assert_eq!(queue.uploading_count(), 3);
        assert_eq!(queue.pending_count(), 2);
    }

    #[test]
    fn test_freed_slot_goes_to_oldest_pending() {
        let mut queue = UploadQueue::new(limits());
        let (ids, _) = enqueue_all(&mut queue, &["a", "b", "c", "d", "e"]);

        let effects = queue.on_finished(ids[1], Ok(UploadReceipt::default()));
        assert_eq!(started(&effects), vec!["d"]);

        let effects = queue.on_finished(ids[0], Err(Error::Network("reset".into())));
        assert_eq!(started(&effects), vec!["e"]);
        assert_eq!(queue.uploading_count(), 3);
    }

    #[test]
    fn test_oversized_file_is_rejected_without_state_change() {
        let mut queue = UploadQueue::new(limits());
        let big = UploadSource::from_bytes("big.iso", vec![0u8; 1025]);

        let err = queue.enqueue(big, None).unwrap_err();
        assert!(matches!(err, Error::SizeExceeded { size: 1025, limit: 1024, .. }));
        assert!(queue.tasks().is_empty());
    }

    #[test]
    fn test_file_at_exact_limit_is_accepted() {
        let mut queue = UploadQueue::new(limits());
        let exact = UploadSource::from_bytes("exact.bin", vec![0u8; 1024]);
        assert!(queue.enqueue(exact, None).is_ok());
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let queue = UploadQueue::new(limits());
        assert!(matches!(queue.validate(&source("  ")), Err(Error::EmptyName)));
    }

    #[test]
    fn test_success_refreshes_exactly_once() {
        let mut queue = UploadQueue::new(limits());
        let (ids, _) = enqueue_all(&mut queue, &["a"]);

        let effects = queue.on_finished(ids[0], Ok(UploadReceipt::default()));
        let listing = effects
            .iter()
            .filter(|e| matches!(e, Effect::RefreshListing))
            .count();
        let quota = effects
            .iter()
            .filter(|e| matches!(e, Effect::RefreshQuota))
            .count();
        assert_eq!((listing, quota), (1, 1));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::ScheduleRemoval { id, .. } if *id == ids[0])));

        let task = queue.get(ids[0]).unwrap();
        assert_eq!(task.status(), UploadStatus::Success);
        assert!((task.progress() - 100.0).abs() < f64::EPSILON);

        let again = queue.on_finished(ids[0], Ok(UploadReceipt::default()));
        assert!(again.is_empty(), "a second completion must not refresh again");
    }

    #[test]
    fn test_failure_keeps_task_until_dismissed() {
        let mut queue = UploadQueue::new(limits());
        let (ids, _) = enqueue_all(&mut queue, &["a"]);

        let effects = queue.on_finished(ids[0], Err(Error::server(507, "quota exceeded")));
        assert!(effects.is_empty());

        let task = queue.get(ids[0]).unwrap();
        assert_eq!(task.status(), UploadStatus::Error);
        assert_eq!(task.error(), Some("quota exceeded"));
        assert!(!queue.remove_finished(ids[0]), "errors are not auto-removed");

        assert!(queue.dismiss(ids[0]));
        assert!(queue.tasks().is_empty());
    }

    #[test]
    fn test_cancel_pending_never_starts() {
        let mut queue = UploadQueue::new(limits());
        let (ids, _) = enqueue_all(&mut queue, &["a", "b", "c", "d"]);

        let (outcome, effects) = queue.cancel(ids[3]);
        assert_eq!(outcome, CancelOutcome::Removed);
        assert!(effects.is_empty());
        assert!(queue.get(ids[3]).is_none());

        let effects = queue.on_finished(ids[0], Ok(UploadReceipt::default()));
        assert!(started(&effects).is_empty());
    }

    #[test]
    fn test_cancel_uploading_holds_slot_until_abort() {
        let mut queue = UploadQueue::new(limits());
        let (ids, _) = enqueue_all(&mut queue, &["a", "b", "c", "d"]);

        let (outcome, effects) = queue.cancel(ids[0]);
        assert_eq!(outcome, CancelOutcome::Aborting);
        assert!(started(&effects).is_empty(), "slot is still held");
        assert!(queue.get(ids[0]).is_none(), "cancelled task leaves the list");
        assert_eq!(queue.active_slots(), 3);

        let effects = queue.on_finished(ids[0], Err(Error::Aborted));
        assert_eq!(started(&effects), vec!["d"]);
        assert_eq!(queue.active_slots(), 3);
        assert_eq!(queue.pending_count(), 0);
    }

    #[test]
    fn test_cancel_finished_is_noop() {
        let mut queue = UploadQueue::new(limits());
        let (ids, _) = enqueue_all(&mut queue, &["a"]);
        queue.on_finished(ids[0], Ok(UploadReceipt::default()));

        let (outcome, _) = queue.cancel(ids[0]);
        assert_eq!(outcome, CancelOutcome::AlreadyFinished);
        assert_eq!(queue.get(ids[0]).unwrap().status(), UploadStatus::Success);
        assert_eq!(queue.cancel(TaskId::new()).0, CancelOutcome::NotFound);
    }

    #[test]
    fn test_unrequested_abort_frees_slot() {
        let mut queue = UploadQueue::new(limits());
        let (ids, _) = enqueue_all(&mut queue, &["a", "b", "c", "d"]);

        let effects = queue.on_finished(ids[2], Err(Error::Aborted));
        assert_eq!(started(&effects), vec!["d"]);
        assert!(queue.get(ids[2]).is_none());
    }

    #[test]
    fn test_cancel_all_starts_nothing() {
        let mut queue = UploadQueue::new(limits());
        enqueue_all(&mut queue, &["a", "b", "c", "d", "e"]);

        let (count, effects) = queue.cancel_all();
        assert_eq!(count, 5);
        assert!(started(&effects).is_empty());
        assert!(queue.tasks().is_empty());
        assert!(!queue.is_idle(), "aborts are still winding down");
    }

    #[test]
    fn test_progress_ignores_unknown_and_stale_reports() {
        let mut queue = UploadQueue::new(limits());
        let (ids, _) = enqueue_all(&mut queue, &["a"]);

        assert_eq!(queue.on_progress(ids[0], 8, Some(16)), Some(50.0));
        assert_eq!(queue.on_progress(ids[0], 4, Some(16)), None);
        assert_eq!(queue.on_progress(ids[0], 12, None), None);
        assert_eq!(queue.on_progress(TaskId::new(), 1, Some(2)), None);
    }

    #[test]
    fn test_snapshot_counts() {
        let mut queue = UploadQueue::new(limits());
        let (ids, _) = enqueue_all(&mut queue, &["a", "b", "c", "d"]);
        queue.cancel(ids[0]);

        let snapshot = queue.snapshot();
        assert_eq!(snapshot.tasks.len(), 3);
        assert_eq!(snapshot.uploading, 2);
        assert_eq!(snapshot.pending, 1);
        assert_eq!(snapshot.in_flight, 3);
        assert!(!snapshot.is_idle());
    }
}
