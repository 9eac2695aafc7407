//! Progress bars for download runs, fed by registry snapshots.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use launcher_fetch::{DownloadProgress, ProgressStatus, format_bytes};
use tokio::sync::mpsc;

/// One bar per download, stacked.
pub(crate) struct ProgressUi {
    multi: MultiProgress,
}

impl ProgressUi {
    /// Creates the UI; when `visible` is false nothing is drawn.
    pub(crate) fn new(visible: bool) -> Self {
        let multi = MultiProgress::new();
        if !visible {
            multi.set_draw_target(ProgressDrawTarget::hidden());
        }
        Self { multi }
    }

    /// Adds a bar labelled `name`.
    pub(crate) fn add(&self, name: &str) -> ProgressBar {
        let bar = self.multi.add(ProgressBar::new(0));
        bar.set_style(
            ProgressStyle::with_template("{prefix:.bold} [{bar:30.cyan/blue}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_prefix(name.to_string());
        bar.set_message("queued");
        bar
    }
}

/// Drives `bar` from a task's snapshots until the registry closes the channel.
///
/// Returns the last snapshot seen.
pub(crate) async fn follow(
    mut rx: mpsc::UnboundedReceiver<DownloadProgress>,
    bar: ProgressBar,
) -> Option<DownloadProgress> {
    let mut last = None;
    while let Some(snapshot) = rx.recv().await {
        if let Some(total) = snapshot.total_bytes {
            bar.set_length(total);
        }
        bar.set_position(snapshot.downloaded_bytes);
        bar.set_message(status_line(&snapshot));
        last = Some(snapshot);
    }
    bar.finish();
    last
}

/// Text shown after the bar.
pub(crate) fn status_line(snapshot: &DownloadProgress) -> String {
    let size = match snapshot.total_bytes {
        Some(total) => format!(
            "{} / {}",
            format_bytes(snapshot.downloaded_bytes),
            format_bytes(total)
        ),
        None => format_bytes(snapshot.downloaded_bytes),
    };

    match snapshot.status {
        ProgressStatus::Pending => "queued".to_string(),
        ProgressStatus::Downloading => {
            let mut line = format!("{size} {}", snapshot.speed_string());
            if let Some(eta) = snapshot.eta_string() {
                line.push_str(&format!(" eta {eta}"));
            }
            line
        }
        ProgressStatus::Retrying => format!(
            "retrying in {}s (attempt {}): {}",
            snapshot.retry_in_seconds.unwrap_or(0),
            snapshot.attempt,
            snapshot.error_message.as_deref().unwrap_or("unknown error")
        ),
        ProgressStatus::Paused => format!("paused at {size}"),
        ProgressStatus::Completed => format!("done, {size}"),
        ProgressStatus::Cancelled => "cancelled".to_string(),
        ProgressStatus::Failed => format!(
            "failed: {}",
            snapshot.error_message.as_deref().unwrap_or("unknown error")
        ),
    }
}
