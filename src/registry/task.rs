//! Download task record and lifecycle states.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;

use crate::download::{DownloadProgress, ProgressStatus, RetryPolicy};

/// Lifecycle state of a task.
///
/// ```text
/// Pending -> Downloading -> Completed | Cancelled | Failed
/// Downloading <-> Paused, Paused -> Cancelled, Pending -> Cancelled
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadStatus {
    /// Waiting for a running slot.
    Pending,
    /// Transfer in flight, including backoff sleeps between attempts.
    Downloading,
    /// Stopped with its partial file kept; can be resumed.
    Paused,
    /// Finished successfully.
    Completed,
    /// Stopped by the caller.
    Cancelled,
    /// Gave up; carries the final error message.
    Failed(String),
}

impl DownloadStatus {
    /// Returns true for states that take no further transitions.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed(_))
    }

    /// Returns the status name without the failure message.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Point-in-time view of one download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    /// Unique id, `download-<uuid>` unless supplied by the caller.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Source URL.
    pub url: String,
    /// Destination file.
    pub destination: PathBuf,
    /// Current state.
    pub status: DownloadStatus,
    /// Expected size, once a response announced it.
    pub total_bytes: Option<u64>,
    /// Bytes in the destination.
    pub downloaded_bytes: u64,
    /// Throughput of the current attempt.
    pub speed_bps: u64,
    /// Seconds remaining, when computable.
    pub eta_seconds: Option<u64>,
    /// Current attempt number, 0 before the first attempt starts.
    pub attempt: u32,
    /// When the task was registered.
    pub created_at: SystemTime,
}

impl DownloadTask {
    /// Time since the task was registered; zero if the wall clock went backwards.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed().unwrap_or_default()
    }
}

/// Parameters for [`DownloadRegistry::start_with`](super::DownloadRegistry::start_with).
#[derive(Debug)]
pub struct DownloadRequest {
    pub(crate) name: String,
    pub(crate) url: String,
    pub(crate) destination: PathBuf,
    pub(crate) policy: Option<RetryPolicy>,
    pub(crate) id: Option<String>,
    pub(crate) subscriber: Option<mpsc::UnboundedSender<DownloadProgress>>,
}

impl DownloadRequest {
    /// Creates a request using the registry's default policy.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            destination: destination.into(),
            policy: None,
            id: None,
            subscriber: None,
        }
    }

    /// Uses `policy` instead of the registry default.
    #[must_use]
    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Uses a caller-chosen id instead of a generated one.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Delivers every snapshot of this task to `tx`, in order.
    ///
    /// The sender is dropped once the task reaches a terminal state, so a
    /// receiver loop ends on its own.
    #[must_use]
    pub fn subscriber(mut self, tx: mpsc::UnboundedSender<DownloadProgress>) -> Self {
        self.subscriber = Some(tx);
        self
    }
}

/// Registry-side bookkeeping for one task.
#[derive(Debug)]
pub(crate) struct TaskEntry {
    pub(crate) task: DownloadTask,
    pub(crate) policy: RetryPolicy,
    pub(crate) stop: tokio_util::sync::CancellationToken,
    /// Bumped on every resume; stale workers compare against it.
    pub(crate) generation: u64,
    pub(crate) worker: Option<tokio::task::JoinHandle<()>>,
    /// Set by resume while a paused task waits in the admission queue.
    pub(crate) resuming: bool,
    pub(crate) subscriber: Option<mpsc::UnboundedSender<DownloadProgress>>,
    /// Pending backoff, set while the orchestrator sleeps.
    pub(crate) retry_in: Option<Duration>,
    /// Reason of the last failed attempt.
    pub(crate) last_error: Option<String>,
}

impl TaskEntry {
    /// Whether the task is waiting for a running slot.
    pub(crate) fn is_queued(&self) -> bool {
        match self.task.status {
            DownloadStatus::Pending => true,
            DownloadStatus::Paused => self.resuming,
            _ => false,
        }
    }

    /// Builds the observer-facing snapshot of the current state.
    pub(crate) fn snapshot(&self) -> DownloadProgress {
        let task = &self.task;
        let (status, error_message) = match &task.status {
            DownloadStatus::Pending => (ProgressStatus::Pending, None),
            DownloadStatus::Downloading if self.retry_in.is_some() => {
                (ProgressStatus::Retrying, self.last_error.clone())
            }
            DownloadStatus::Downloading => (ProgressStatus::Downloading, None),
            DownloadStatus::Paused => (ProgressStatus::Paused, None),
            DownloadStatus::Completed => (ProgressStatus::Completed, None),
            DownloadStatus::Cancelled => (ProgressStatus::Cancelled, None),
            DownloadStatus::Failed(message) => (ProgressStatus::Failed, Some(message.clone())),
        };

        let percentage = if task.status == DownloadStatus::Completed {
            Some(100.0)
        } else {
            crate::download::percentage(task.downloaded_bytes, task.total_bytes)
        };

        DownloadProgress {
            id: task.id.clone(),
            name: task.name.clone(),
            url: task.url.clone(),
            status,
            total_bytes: task.total_bytes,
            downloaded_bytes: task.downloaded_bytes,
            percentage,
            speed_bps: task.speed_bps,
            eta_seconds: task.eta_seconds,
            error_message,
            attempt: task.attempt,
            retry_in_seconds: self
                .retry_in
                .map(|delay| delay.as_secs() + u64::from(delay.subsec_nanos() > 0)),
        }
    }

    /// Sends the current snapshot to the subscriber, if any.
    pub(crate) fn publish(&self) {
        if let Some(tx) = &self.subscriber {
            // A dropped receiver only means nobody is watching.
            let _ = tx.send(self.snapshot());
        }
    }

    /// Publishes a terminal snapshot and closes the subscription.
    pub(crate) fn publish_final(&mut self) {
        self.retry_in = None;
        self.publish();
        self.subscriber = None;
    }
}
