//! Download registry: owns every task, bounds concurrency, and exposes
//! pause/resume/cancel.
//!
//! # Overview
//!
//! - [`DownloadRegistry`] - explicitly constructed owner of all tasks
//! - [`DownloadTask`] / [`DownloadStatus`] - task record and lifecycle
//! - [`DownloadRequest`] - start parameters, including a progress subscriber
//! - [`RegistryError`] - misuse errors (unknown id, illegal transition, ...)
//!
//! Each admitted task runs on its own tokio task. At most
//! `max_concurrent_downloads` workers hold a running slot; the rest wait in an
//! admission queue kept under the registry lock and are admitted oldest first
//! as slots free up. A paused task's worker exits too, so pausing frees its
//! slot, and resuming puts the task at the back of the queue.
//!
//! One mutex guards the task map and the queue. It is only held for
//! bookkeeping and for pushing snapshots into unbounded channels, never across
//! an `.await`.
//!
//! # Example
//!
//! ```no_run
//! use launcher_fetch::{DownloadRegistry, DownloadRequest, ManagerConfig};
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = DownloadRegistry::new(ManagerConfig::default())?;
//! let (tx, mut rx) = mpsc::unbounded_channel();
//! let id = registry.start_with(
//!     DownloadRequest::new("java", "https://example.com/jre.tar.gz", "./cache/jre.tar.gz")
//!         .subscriber(tx),
//! )?;
//! while let Some(snapshot) = rx.recv().await {
//!     println!("{id}: {} {:?}%", snapshot.status, snapshot.percentage);
//! }
//! registry.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod error;
mod task;

pub use error::RegistryError;
pub use task::{DownloadRequest, DownloadStatus, DownloadTask};

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::config::ManagerConfig;
use crate::download::{
    DownloadError, DownloadProgress, HttpTransfer, ProgressSink, RetryPolicy, Transfer,
    TransferEvent, TransferOutcome, TransferRequest,
};
use task::TaskEntry;

/// Owner of all download tasks.
///
/// Cheap to clone; clones share the same tasks. Must be used from inside a
/// tokio runtime since admitting a task spawns its worker.
#[derive(Clone)]
pub struct DownloadRegistry {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DownloadRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadRegistry")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

struct Inner {
    config: ManagerConfig,
    transfer: Arc<dyn Transfer>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    tasks: HashMap<String, TaskEntry>,
    /// Insertion order, for `list`.
    order: Vec<String>,
    /// Tasks waiting for a slot, oldest first, with the generation that queued them.
    queue: VecDeque<(String, u64)>,
    /// Workers currently holding a slot.
    running: usize,
    shutting_down: bool,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        // Entries stay consistent between statements, so a poisoned lock is usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DownloadRegistry {
    /// Creates a registry backed by the reqwest transfer engine.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Config`] for out-of-range settings, or
    /// [`RegistryError::HttpClient`] if the HTTP client cannot be built.
    pub fn new(config: ManagerConfig) -> Result<Self, RegistryError> {
        config.validate()?;
        let transfer = HttpTransfer::with_user_agent(&config.user_agent, config.connect_timeout_secs)
            .map_err(RegistryError::HttpClient)?;
        Self::with_transfer(config, Arc::new(transfer))
    }

    /// Creates a registry driving a custom [`Transfer`] implementation.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Config`] for out-of-range settings.
    pub fn with_transfer(
        config: ManagerConfig,
        transfer: Arc<dyn Transfer>,
    ) -> Result<Self, RegistryError> {
        config.validate()?;
        debug!(
            max_concurrent = config.max_concurrent_downloads,
            max_attempts = config.default_policy.max_attempts(),
            user_agent = %config.user_agent,
            "creating download registry"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                transfer,
                state: Mutex::new(State::default()),
            }),
        })
    }

    /// Returns the configuration this registry was built with.
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Starts a download with an explicit retry policy and returns its id.
    ///
    /// # Errors
    ///
    /// See [`start_with`](Self::start_with).
    pub fn start(
        &self,
        name: impl Into<String>,
        url: impl Into<String>,
        destination: impl Into<PathBuf>,
        policy: RetryPolicy,
    ) -> Result<String, RegistryError> {
        self.start_with(DownloadRequest::new(name, url, destination).policy(policy))
    }

    /// Registers a download and queues it for a running slot.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidUrl`] if the URL does not parse
    /// - [`RegistryError::DuplicateId`] if a caller-supplied id is taken
    /// - [`RegistryError::ShuttingDown`] after [`shutdown`](Self::shutdown)
    #[instrument(skip(self, request), fields(url = %request.url, name = %request.name))]
    pub fn start_with(&self, request: DownloadRequest) -> Result<String, RegistryError> {
        Url::parse(&request.url).map_err(|_| RegistryError::InvalidUrl(request.url.clone()))?;

        let mut state = self.inner.lock();
        if state.shutting_down {
            return Err(RegistryError::ShuttingDown);
        }

        let id = request
            .id
            .unwrap_or_else(|| format!("download-{}", Uuid::new_v4()));
        if state.tasks.contains_key(&id) {
            return Err(RegistryError::DuplicateId(id));
        }

        let policy = request
            .policy
            .unwrap_or_else(|| self.inner.config.default_policy.clone());
        let entry = TaskEntry {
            task: DownloadTask {
                id: id.clone(),
                name: request.name,
                url: request.url,
                destination: request.destination,
                status: DownloadStatus::Pending,
                total_bytes: None,
                downloaded_bytes: 0,
                speed_bps: 0,
                eta_seconds: None,
                attempt: 0,
                created_at: SystemTime::now(),
            },
            policy,
            stop: CancellationToken::new(),
            generation: 0,
            worker: None,
            resuming: false,
            subscriber: request.subscriber,
            retry_in: None,
            last_error: None,
        };
        entry.publish();
        info!(id = %id, destination = %entry.task.destination.display(), "download queued");

        state.order.push(id.clone());
        state.tasks.insert(id.clone(), entry);
        state.queue.push_back((id.clone(), 0));
        admit(&self.inner, &mut state);
        Ok(id)
    }

    /// Stops a running download, keeping its partial file.
    ///
    /// The task reports `Paused` at once; its final byte count is published
    /// when the worker has flushed and exited.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`], or [`RegistryError::InvalidTransition`]
    /// unless the task is `Downloading`.
    #[instrument(skip(self))]
    pub fn pause(&self, id: &str) -> Result<(), RegistryError> {
        let mut state = self.inner.lock();
        let entry = state
            .tasks
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        if entry.task.status != DownloadStatus::Downloading {
            return Err(RegistryError::invalid_transition(
                id,
                "pause",
                &entry.task.status,
            ));
        }

        entry.task.status = DownloadStatus::Paused;
        entry.task.speed_bps = 0;
        entry.task.eta_seconds = None;
        entry.retry_in = None;
        entry.stop.cancel();
        debug!(downloaded = entry.task.downloaded_bytes, "pause requested");
        Ok(())
    }

    /// Re-queues a paused download; it continues from its partial file.
    ///
    /// The task stays `Paused` while it waits for a slot and moves straight to
    /// `Downloading` when admitted.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`], [`RegistryError::ShuttingDown`], or
    /// [`RegistryError::InvalidTransition`] unless the task is `Paused` and not
    /// already queued.
    #[instrument(skip(self))]
    pub fn resume(&self, id: &str) -> Result<(), RegistryError> {
        let mut state = self.inner.lock();
        if state.shutting_down {
            return Err(RegistryError::ShuttingDown);
        }
        let entry = state
            .tasks
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        if entry.task.status != DownloadStatus::Paused || entry.resuming {
            return Err(RegistryError::invalid_transition(
                id,
                "resume",
                &entry.task.status,
            ));
        }

        entry.generation += 1;
        entry.stop = CancellationToken::new();
        entry.resuming = true;
        let generation = entry.generation;
        info!(offset = entry.task.downloaded_bytes, "download resumed");

        state.queue.push_back((id.to_string(), generation));
        admit(&self.inner, &mut state);
        Ok(())
    }

    /// Cancels a pending, running, or paused download.
    ///
    /// The `Cancelled` snapshot is the last one the subscriber receives.
    /// The partial file is left in place.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`], or [`RegistryError::InvalidTransition`]
    /// if the task already finished.
    #[instrument(skip(self))]
    pub fn cancel(&self, id: &str) -> Result<(), RegistryError> {
        let mut state = self.inner.lock();
        let entry = state
            .tasks
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        if entry.task.status.is_terminal() {
            return Err(RegistryError::invalid_transition(
                id,
                "cancel",
                &entry.task.status,
            ));
        }
        mark_cancelled(entry);
        info!("download cancelled");
        Ok(())
    }

    /// Removes a task, cancelling it first if it is still active.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] if no such task exists.
    #[instrument(skip(self))]
    pub fn remove(&self, id: &str) -> Result<DownloadTask, RegistryError> {
        let mut state = self.inner.lock();
        let mut entry = state
            .tasks
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        state.order.retain(|known| known != id);
        if !entry.task.status.is_terminal() {
            mark_cancelled(&mut entry);
        }
        debug!(status = %entry.task.status, "download removed");
        Ok(entry.task)
    }

    /// Returns a copy of the task record.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<DownloadTask> {
        self.inner.lock().tasks.get(id).map(|e| e.task.clone())
    }

    /// Returns the current snapshot of a task.
    #[must_use]
    pub fn progress(&self, id: &str) -> Option<DownloadProgress> {
        self.inner.lock().tasks.get(id).map(TaskEntry::snapshot)
    }

    /// Returns every task in start order.
    #[must_use]
    pub fn list(&self) -> Vec<DownloadTask> {
        let state = self.inner.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.tasks.get(id))
            .map(|e| e.task.clone())
            .collect()
    }

    /// Cancels every unfinished task and waits for all workers to exit.
    ///
    /// Later calls to `start`/`resume` fail with [`RegistryError::ShuttingDown`].
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let workers: Vec<JoinHandle<()>> = {
            let mut state = self.inner.lock();
            state.shutting_down = true;
            state.queue.clear();
            state
                .tasks
                .values_mut()
                .filter_map(|entry| {
                    if !entry.task.status.is_terminal() {
                        mark_cancelled(entry);
                    }
                    entry.worker.take()
                })
                .collect()
        };

        info!(workers = workers.len(), "shutting down download registry");
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "download worker panicked");
            }
        }
    }
}

/// Moves an entry to `Cancelled`, publishes the final snapshot, and stops its worker.
fn mark_cancelled(entry: &mut TaskEntry) {
    entry.task.status = DownloadStatus::Cancelled;
    entry.task.speed_bps = 0;
    entry.task.eta_seconds = None;
    entry.resuming = false;
    entry.stop.cancel();
    entry.publish_final();
}

/// Hands free slots to queued tasks, oldest first.
///
/// Runs under the registry lock, so tasks are admitted in queue order no
/// matter how the runtime schedules their workers. Entries that were
/// cancelled, removed, or re-queued since are skipped.
fn admit(inner: &Arc<Inner>, state: &mut State) {
    let State {
        tasks,
        queue,
        running,
        shutting_down,
        ..
    } = state;
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        return;
    };

    while !*shutting_down && *running < inner.config.max_concurrent_downloads {
        let Some((id, generation)) = queue.pop_front() else {
            break;
        };
        let Some(entry) = tasks.get_mut(&id) else {
            continue;
        };
        if entry.generation != generation || !entry.is_queued() {
            continue;
        }

        entry.task.status = DownloadStatus::Downloading;
        entry.task.attempt = 1;
        entry.resuming = false;
        entry.retry_in = None;
        entry.last_error = None;
        entry.publish();
        debug!(id = %id, generation, "download admitted");

        *running += 1;
        let slot = Slot {
            inner: Arc::clone(inner),
        };
        let previous = entry.worker.take();
        entry.worker = Some(runtime.spawn(run_worker(
            slot,
            id,
            generation,
            entry.stop.clone(),
            previous,
        )));
    }
}

/// A running slot held by one worker; dropping it admits the next queued task.
struct Slot {
    inner: Arc<Inner>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        let mut state = self.inner.lock();
        state.running = state.running.saturating_sub(1);
        admit(&self.inner, &mut state);
    }
}

/// Forwards engine/orchestrator events into the task record.
struct Reporter<'a> {
    inner: &'a Inner,
    id: &'a str,
    generation: u64,
    stop: &'a CancellationToken,
}

impl ProgressSink for Reporter<'_> {
    fn emit(&self, event: TransferEvent) {
        if self.stop.is_cancelled() {
            return;
        }
        let mut state = self.inner.lock();
        let Some(entry) = state.tasks.get_mut(self.id) else {
            return;
        };
        // Pause/cancel flip the status under this lock, so nothing leaks past them.
        if entry.generation != self.generation || entry.task.status != DownloadStatus::Downloading {
            return;
        }

        match event {
            TransferEvent::Progress(progress) => {
                entry.task.downloaded_bytes = progress.downloaded_bytes;
                entry.task.total_bytes = progress.total_bytes;
                entry.task.speed_bps = progress.speed_bps;
                entry.task.eta_seconds = progress.eta_seconds;
                entry.retry_in = None;
                entry.publish();
            }
            TransferEvent::Completed(progress) => {
                // The terminal snapshot is published once the worker records the outcome.
                entry.task.downloaded_bytes = progress.downloaded_bytes;
                entry.task.total_bytes = progress.total_bytes;
                entry.task.speed_bps = progress.speed_bps;
                entry.task.eta_seconds = progress.eta_seconds;
            }
            TransferEvent::Retrying {
                next_attempt,
                delay,
                reason,
            } => {
                entry.task.attempt = next_attempt;
                entry.task.speed_bps = 0;
                entry.task.eta_seconds = None;
                entry.retry_in = Some(delay);
                entry.last_error = Some(reason);
                entry.publish();
            }
        }
    }
}

/// Body of one admitted task: transfer, then record the outcome.
///
/// The slot is released when `slot` drops, including on panic.
#[instrument(skip(slot, stop, previous), fields(id = %id))]
async fn run_worker(
    slot: Slot,
    id: String,
    generation: u64,
    stop: CancellationToken,
    previous: Option<JoinHandle<()>>,
) {
    // The paused worker may still be flushing the partial file.
    if let Some(previous) = previous
        && let Err(e) = previous.await
    {
        warn!(error = %e, "previous download worker panicked");
    }

    let inner = slot.inner.as_ref();
    let Some((request, policy)) = prepare(inner, &id, generation) else {
        return;
    };

    let reporter = Reporter {
        inner,
        id: &id,
        generation,
        stop: &stop,
    };
    let result = crate::download::run(
        inner.transfer.as_ref(),
        &request,
        &policy,
        &reporter,
        &stop,
    )
    .await;

    finish(inner, &id, generation, result);
}

/// Builds the first attempt's request once the previous worker has exited.
fn prepare(inner: &Inner, id: &str, generation: u64) -> Option<(TransferRequest, RetryPolicy)> {
    let state = inner.lock();
    let entry = state.tasks.get(id)?;
    if entry.generation != generation || entry.task.status != DownloadStatus::Downloading {
        return None;
    }

    debug!(offset = entry.task.downloaded_bytes, "starting transfer");
    let request = TransferRequest {
        url: entry.task.url.clone(),
        destination: entry.task.destination.clone(),
        offset: entry.task.downloaded_bytes,
        deadline: entry.policy.attempt_deadline(),
    };
    Some((request, entry.policy.clone()))
}

/// Records how a worker's run ended.
fn finish(
    inner: &Inner,
    id: &str,
    generation: u64,
    result: Result<TransferOutcome, DownloadError>,
) {
    let mut state = inner.lock();
    let Some(entry) = state.tasks.get_mut(id) else {
        return;
    };
    // Completed, Cancelled and Failed records are frozen.
    if entry.task.status.is_terminal() {
        return;
    }

    match result {
        Ok(outcome) => {
            // A pause that lost the race to the last byte still completes.
            entry.task.downloaded_bytes = outcome.downloaded_bytes;
            entry.task.total_bytes = Some(outcome.total_bytes);
            entry.task.status = DownloadStatus::Completed;
            entry.task.eta_seconds = Some(0);
            entry.resuming = false;
            entry.publish_final();
            info!(bytes = outcome.downloaded_bytes, "download completed");
        }
        Err(DownloadError::Cancelled { downloaded_bytes }) => {
            // The next generation waits for this worker, so its count is the resume offset.
            entry.task.downloaded_bytes = downloaded_bytes;
            if entry.generation != generation {
                return;
            }
            match entry.task.status {
                DownloadStatus::Paused => {
                    entry.retry_in = None;
                    entry.publish();
                    info!(downloaded_bytes, "download paused");
                }
                DownloadStatus::Pending | DownloadStatus::Downloading => mark_cancelled(entry),
                _ => {}
            }
        }
        Err(error) => {
            if entry.generation != generation
                || entry.task.status != DownloadStatus::Downloading
            {
                return;
            }
            warn!(error = %error, "download failed");
            entry.task.status = DownloadStatus::Failed(error.to_string());
            entry.task.speed_bps = 0;
            entry.task.eta_seconds = None;
            entry.publish_final();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::download::ProgressStatus;

    /// Never finishes on its own; returns `Cancelled` when stopped.
    struct StallingTransfer;

    #[async_trait]
    impl Transfer for StallingTransfer {
        async fn transfer(
            &self,
            request: &TransferRequest,
            _sink: &dyn ProgressSink,
            stop: &CancellationToken,
        ) -> Result<TransferOutcome, DownloadError> {
            stop.cancelled().await;
            Err(DownloadError::cancelled(request.offset))
        }
    }

    fn registry(max_concurrent: usize) -> DownloadRegistry {
        let config = ManagerConfig {
            max_concurrent_downloads: max_concurrent,
            ..ManagerConfig::default()
        };
        DownloadRegistry::with_transfer(config, Arc::new(StallingTransfer)).unwrap()
    }

    async fn wait_for_status(registry: &DownloadRegistry, id: &str, status: DownloadStatus) {
        for _ in 0..200 {
            if registry.get(id).map(|t| t.status) == Some(status.clone()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {id} never reached {status}");
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_url() {
        let registry = registry(1);
        let result = registry.start("bad", "not a url", "out.bin", RetryPolicy::default());
        assert!(matches!(result, Err(RegistryError::InvalidUrl(_))));
        assert!(registry.list().is_empty());
    }

    #[tokio::test]
    async fn test_generated_ids_are_prefixed_and_unique() {
        let registry = registry(1);
        let a = registry
            .start("a", "https://example.com/a", "a.bin", RetryPolicy::default())
            .unwrap();
        let b = registry
            .start("b", "https://example.com/b", "b.bin", RetryPolicy::default())
            .unwrap();
        assert!(a.starts_with("download-"));
        assert_ne!(a, b);
        assert_eq!(
            registry.list().iter().map(|t| t.id.clone()).collect::<Vec<_>>(),
            vec![a, b]
        );
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected() {
        let registry = registry(1);
        let request = || DownloadRequest::new("a", "https://example.com/a", "a.bin").id("java");
        registry.start_with(request()).unwrap();
        assert!(matches!(
            registry.start_with(request()),
            Err(RegistryError::DuplicateId(id)) if id == "java"
        ));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let registry = registry(1);
        assert!(matches!(registry.pause("nope"), Err(RegistryError::NotFound(_))));
        assert!(matches!(registry.resume("nope"), Err(RegistryError::NotFound(_))));
        assert!(matches!(registry.cancel("nope"), Err(RegistryError::NotFound(_))));
        assert!(matches!(registry.remove("nope"), Err(RegistryError::NotFound(_))));
        assert!(registry.get("nope").is_none());
        assert!(registry.progress("nope").is_none());
    }

    #[tokio::test]
    async fn test_queued_task_waits_for_slot_and_cancels_directly() {
        let registry = registry(1);
        let first = registry
            .start("a", "https://example.com/a", "a.bin", RetryPolicy::default())
            .unwrap();
        wait_for_status(&registry, &first, DownloadStatus::Downloading).await;

        let second = registry
            .start("b", "https://example.com/b", "b.bin", RetryPolicy::default())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(registry.get(&second).unwrap().status, DownloadStatus::Pending);

        // Pausing a queued task is not a legal transition.
        assert!(matches!(
            registry.pause(&second),
            Err(RegistryError::InvalidTransition { .. })
        ));

        registry.cancel(&second).unwrap();
        assert_eq!(registry.get(&second).unwrap().status, DownloadStatus::Cancelled);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_pause_frees_slot_for_next_task() {
        let registry = registry(1);
        let first = registry
            .start("a", "https://example.com/a", "a.bin", RetryPolicy::default())
            .unwrap();
        wait_for_status(&registry, &first, DownloadStatus::Downloading).await;
        let second = registry
            .start("b", "https://example.com/b", "b.bin", RetryPolicy::default())
            .unwrap();

        registry.pause(&first).unwrap();
        assert_eq!(registry.get(&first).unwrap().status, DownloadStatus::Paused);
        wait_for_status(&registry, &second, DownloadStatus::Downloading).await;
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_resumed_task_stays_paused_until_admitted() {
        let registry = registry(1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let first = registry
            .start_with(DownloadRequest::new("a", "https://example.com/a", "a.bin").subscriber(tx))
            .unwrap();
        wait_for_status(&registry, &first, DownloadStatus::Downloading).await;
        let second = registry
            .start("b", "https://example.com/b", "b.bin", RetryPolicy::default())
            .unwrap();

        registry.pause(&first).unwrap();
        wait_for_status(&registry, &second, DownloadStatus::Downloading).await;

        // No free slot: the resumed task waits in the queue as Paused.
        registry.resume(&first).unwrap();
        assert_eq!(registry.get(&first).unwrap().status, DownloadStatus::Paused);
        assert!(matches!(
            registry.resume(&first),
            Err(RegistryError::InvalidTransition { .. })
        ));
        assert!(matches!(
            registry.pause(&first),
            Err(RegistryError::InvalidTransition { .. })
        ));

        registry.cancel(&second).unwrap();
        wait_for_status(&registry, &first, DownloadStatus::Downloading).await;
        registry.shutdown().await;

        let mut statuses = Vec::new();
        while let Ok(snapshot) = rx.try_recv() {
            if statuses.last() != Some(&snapshot.status) {
                statuses.push(snapshot.status);
            }
        }
        assert_eq!(
            statuses,
            vec![
                ProgressStatus::Pending,
                ProgressStatus::Downloading,
                ProgressStatus::Paused,
                ProgressStatus::Downloading,
                ProgressStatus::Cancelled,
            ]
        );
    }

    #[tokio::test]
    async fn test_created_at_is_set_on_start() {
        let registry = registry(1);
        let before = std::time::SystemTime::now();
        let id = registry
            .start("a", "https://example.com/a", "a.bin", RetryPolicy::default())
            .unwrap();
        let after = std::time::SystemTime::now();

        let task = registry.get(&id).unwrap();
        assert!(task.created_at >= before && task.created_at <= after);
        assert!(task.age() < Duration::from_secs(60));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_terminal_tasks_reject_transitions() {
        let registry = registry(1);
        let id = registry
            .start("a", "https://example.com/a", "a.bin", RetryPolicy::default())
            .unwrap();
        registry.cancel(&id).unwrap();

        for result in [registry.cancel(&id), registry.pause(&id), registry.resume(&id)] {
            assert!(matches!(result, Err(RegistryError::InvalidTransition { .. })));
        }
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_remove_cancels_active_task() {
        let registry = registry(1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = registry
            .start_with(DownloadRequest::new("a", "https://example.com/a", "a.bin").subscriber(tx))
            .unwrap();

        let removed = registry.remove(&id).unwrap();
        assert_eq!(removed.status, DownloadStatus::Cancelled);
        assert!(registry.get(&id).is_none());

        let mut last = None;
        while let Some(snapshot) = rx.recv().await {
            last = Some(snapshot.status);
        }
        assert_eq!(last, Some(ProgressStatus::Cancelled));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_everything_and_refuses_new_work() {
        let registry = registry(2);
        let running = registry
            .start("a", "https://example.com/a", "a.bin", RetryPolicy::default())
            .unwrap();
        wait_for_status(&registry, &running, DownloadStatus::Downloading).await;
        registry.pause(&running).unwrap();

        registry.shutdown().await;

        assert_eq!(registry.get(&running).unwrap().status, DownloadStatus::Cancelled);
        assert!(matches!(
            registry.start("b", "https://example.com/b", "b.bin", RetryPolicy::default()),
            Err(RegistryError::ShuttingDown)
        ));
        assert!(matches!(
            registry.resume(&running),
            Err(RegistryError::ShuttingDown)
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ManagerConfig {
            max_concurrent_downloads: 0,
            ..ManagerConfig::default()
        };
        assert!(matches!(
            DownloadRegistry::with_transfer(config, Arc::new(StallingTransfer)),
            Err(RegistryError::Config(_))
        ));
    }
}
