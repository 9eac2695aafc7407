//! Progress events and snapshots.
//!
//! The transfer engine and the retry orchestrator describe what happened as
//! [`TransferEvent`]s pushed into a [`ProgressSink`]. The registry folds those
//! into its task record and hands observers immutable [`DownloadProgress`]
//! snapshots, the wire shape UI/IPC layers bind to.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Byte counters and throughput of one transfer attempt at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferProgress {
    /// Bytes present in the destination, including any resumed prefix.
    pub downloaded_bytes: u64,
    /// Expected final size; `None` when the server sent no `Content-Length`.
    pub total_bytes: Option<u64>,
    /// Average throughput of the current attempt.
    pub speed_bps: u64,
    /// Seconds remaining at the current throughput, when computable.
    pub eta_seconds: Option<u64>,
}

impl TransferProgress {
    /// Completion percentage clamped to `[0, 100]`, `None` when indeterminate.
    #[must_use]
    pub fn percentage(&self) -> Option<f64> {
        percentage(self.downloaded_bytes, self.total_bytes)
    }
}

/// Something worth telling an observer about.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// Bytes moved (throttled), or the response headers just arrived.
    Progress(TransferProgress),
    /// The body was fully written.
    Completed(TransferProgress),
    /// An attempt failed with a retryable error; the orchestrator is about to sleep.
    Retrying {
        /// The attempt that will run after the sleep.
        next_attempt: u32,
        /// Backoff before that attempt.
        delay: Duration,
        /// Display form of the failure.
        reason: String,
    },
}

/// Receiver of transfer events.
///
/// Called inline from the transfer loop, so implementations must enqueue and
/// return; they must never wait on an observer.
pub trait ProgressSink: Send + Sync {
    /// Delivers one event.
    fn emit(&self, event: TransferEvent);
}

/// Discards every event.
impl ProgressSink for () {
    fn emit(&self, _event: TransferEvent) {}
}

impl ProgressSink for mpsc::UnboundedSender<TransferEvent> {
    fn emit(&self, event: TransferEvent) {
        // A dropped receiver only means nobody is watching.
        let _ = self.send(event);
    }
}

/// Status as reported in a snapshot.
///
/// Mirrors the task status, plus `Retrying` while a backoff sleep is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    /// Queued, waiting for a running slot.
    Pending,
    /// Transfer in flight.
    Downloading,
    /// Waiting out a backoff delay before the next attempt.
    Retrying,
    /// Stopped by the caller; resumable.
    Paused,
    /// Finished successfully.
    Completed,
    /// Stopped by the caller; terminal.
    Cancelled,
    /// Gave up; terminal.
    Failed,
}

impl ProgressStatus {
    /// Returns the wire string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Retrying => "retrying",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of a download task, delivered to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    /// Task id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Source URL.
    pub url: String,
    /// Status at the time of the snapshot.
    pub status: ProgressStatus,
    /// Expected size, `null` when unknown.
    pub total_bytes: Option<u64>,
    /// Bytes in the destination.
    pub downloaded_bytes: u64,
    /// `0..=100`, `null` when indeterminate.
    pub percentage: Option<f64>,
    /// Current throughput.
    pub speed_bps: u64,
    /// Seconds remaining, `null` when not computable.
    pub eta_seconds: Option<u64>,
    /// Failure or retry reason.
    pub error_message: Option<String>,
    /// Current attempt number (1-indexed).
    pub attempt: u32,
    /// Countdown for a pending retry.
    pub retry_in_seconds: Option<u64>,
}

impl DownloadProgress {
    /// Returns true once no further snapshots will follow.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ProgressStatus::Completed | ProgressStatus::Cancelled | ProgressStatus::Failed
        )
    }

    /// Formatted speed, e.g. `"3.2 MB/s"`.
    #[must_use]
    pub fn speed_string(&self) -> String {
        format!("{}/s", format_bytes(self.speed_bps))
    }

    /// Formatted ETA, e.g. `"2m 5s"`; `None` when unknown.
    #[must_use]
    pub fn eta_string(&self) -> Option<String> {
        self.eta_seconds.map(|secs| {
            if secs >= 3600 {
                format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
            } else if secs >= 60 {
                format!("{}m {}s", secs / 60, secs % 60)
            } else {
                format!("{secs}s")
            }
        })
    }
}

/// `downloaded / total * 100`, clamped; `None` for an unknown total.
///
/// An empty body (`total == 0`) counts as fully downloaded.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn percentage(downloaded: u64, total: Option<u64>) -> Option<f64> {
    let total = total?;
    if total == 0 {
        return Some(100.0);
    }
    Some((downloaded as f64 / total as f64 * 100.0).clamp(0.0, 100.0))
}

/// Human-readable binary size: `"512 B"`, `"1.5 KB"`, `"10.0 MB"`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    const PREFIXES: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT && exp < PREFIXES.len() - 1 {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!("{:.1} {}B", bytes as f64 / div as f64, PREFIXES[exp])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn snapshot(status: ProgressStatus) -> DownloadProgress {
        DownloadProgress {
            id: "download-1".to_string(),
            name: "java".to_string(),
            url: "https://example.com/jre.tar.gz".to_string(),
            status,
            total_bytes: Some(10_485_760),
            downloaded_bytes: 4_194_304,
            percentage: Some(40.0),
            speed_bps: 1_048_576,
            eta_seconds: Some(6),
            error_message: None,
            attempt: 1,
            retry_in_seconds: None,
        }
    }

    #[test]
    fn test_percentage_known_total() {
        assert_eq!(percentage(5, Some(10)), Some(50.0));
        assert_eq!(percentage(10_485_760, Some(10_485_760)), Some(100.0));
    }

    #[test]
    fn test_percentage_clamped_and_indeterminate() {
        assert_eq!(percentage(20, Some(10)), Some(100.0));
        assert_eq!(percentage(0, Some(0)), Some(100.0));
        assert_eq!(percentage(1234, None), None);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(10_485_760), "10.0 MB");
        assert_eq!(format_bytes(u64::MAX), "16.0 EB");
    }

    #[test]
    fn test_eta_string() {
        let mut progress = snapshot(ProgressStatus::Downloading);
        assert_eq!(progress.eta_string().as_deref(), Some("6s"));
        progress.eta_seconds = Some(125);
        assert_eq!(progress.eta_string().as_deref(), Some("2m 5s"));
        progress.eta_seconds = Some(3720);
        assert_eq!(progress.eta_string().as_deref(), Some("1h 2m"));
        progress.eta_seconds = None;
        assert!(progress.eta_string().is_none());
    }

    #[test]
    fn test_speed_string() {
        assert_eq!(snapshot(ProgressStatus::Downloading).speed_string(), "1.0 MB/s");
    }

    #[test]
    fn test_wire_shape_uses_camel_case_keys() {
        let json = serde_json::to_value(snapshot(ProgressStatus::Downloading)).unwrap();
        for key in [
            "id",
            "name",
            "url",
            "status",
            "totalBytes",
            "downloadedBytes",
            "percentage",
            "speedBps",
            "etaSeconds",
            "errorMessage",
        ] {
            assert!(json.get(key).is_some(), "missing key {key} in {json}");
        }
        assert_eq!(json["status"], "downloading");
        assert!(json["errorMessage"].is_null());
    }

    #[test]
    fn test_unknown_total_serializes_as_null() {
        let mut progress = snapshot(ProgressStatus::Downloading);
        progress.total_bytes = None;
        progress.percentage = None;
        let json = serde_json::to_value(&progress).unwrap();
        assert!(json["totalBytes"].is_null());
        assert!(json["percentage"].is_null());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(snapshot(ProgressStatus::Completed).is_terminal());
        assert!(snapshot(ProgressStatus::Cancelled).is_terminal());
        assert!(snapshot(ProgressStatus::Failed).is_terminal());
        assert!(!snapshot(ProgressStatus::Paused).is_terminal());
        assert!(!snapshot(ProgressStatus::Retrying).is_terminal());
    }

    #[test]
    fn test_unbounded_sender_sink_forwards_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.emit(TransferEvent::Retrying {
            next_attempt: 2,
            delay: Duration::from_secs(1),
            reason: "connection reset".to_string(),
        });
        assert!(matches!(
            rx.try_recv().unwrap(),
            TransferEvent::Retrying { next_attempt: 2, .. }
        ));
    }
}
