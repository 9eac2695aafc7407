//! Retry orchestrator: runs transfer attempts under a [`RetryPolicy`].
//!
//! Each failed attempt is classified; fatal errors end the loop at once and
//! retryable ones sleep the backoff delay before trying again from whatever
//! the destination already holds. Stop requests interrupt both the transfer
//! and the sleep and surface as [`DownloadError::Cancelled`].

use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::client::{Transfer, TransferOutcome, TransferRequest};
use super::error::DownloadError;
use super::progress::{ProgressSink, TransferEvent};
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_error};

/// Runs `request` through `transfer` until it succeeds, fails fatally, runs
/// out of attempts, or `stop` fires.
///
/// The first attempt starts at `request.offset`; every later attempt starts at
/// the destination's on-disk length. `request.deadline` is replaced by the
/// policy's per-attempt deadline.
///
/// # Errors
///
/// - [`DownloadError::Cancelled`] when `stop` fires, during a transfer or a backoff sleep
/// - the raw error of the attempt when it is classified fatal
/// - [`DownloadError::ExhaustedRetries`] wrapping the last error when the budget runs out
#[instrument(skip_all, fields(url = %request.url, max_attempts = policy.max_attempts()))]
pub async fn run(
    transfer: &dyn Transfer,
    request: &TransferRequest,
    policy: &RetryPolicy,
    sink: &dyn ProgressSink,
    stop: &CancellationToken,
) -> Result<TransferOutcome, DownloadError> {
    let mut current = TransferRequest {
        deadline: policy.attempt_deadline(),
        ..request.clone()
    };
    let mut attempt = 1;

    loop {
        debug!(attempt, offset = current.offset, "starting attempt");

        let error = match transfer.transfer(&current, sink, stop).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => e,
        };

        let failure_type = classify_error(&error);
        match policy.should_retry(failure_type, attempt) {
            RetryDecision::Retry {
                delay,
                attempt: next,
            } => {
                warn!(
                    attempt,
                    next_attempt = next,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %error,
                    "attempt failed, retrying"
                );
                sink.emit(TransferEvent::Retrying {
                    next_attempt: next,
                    delay,
                    reason: error.to_string(),
                });

                tokio::select! {
                    biased;
                    () = stop.cancelled() => {
                        let on_disk = on_disk_len(&current.destination).await;
                        debug!(on_disk, "stopped during backoff");
                        return Err(DownloadError::cancelled(on_disk));
                    }
                    () = tokio::time::sleep(delay) => {}
                }

                current.offset = on_disk_len(&current.destination).await;
                attempt = next;
            }
            RetryDecision::DoNotRetry { reason } => {
                if failure_type == FailureType::Fatal {
                    warn!(attempt, error = %error, "fatal error, not retrying");
                    return Err(error);
                }
                warn!(attempts = attempt, %reason, error = %error, "giving up");
                return Err(DownloadError::exhausted(attempt, error));
            }
        }
    }
}

/// Size of the destination, 0 when it does not exist.
async fn on_disk_len(path: &Path) -> u64 {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.len())
        .unwrap_or(0)
}
