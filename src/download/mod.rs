//! HTTP transfer engine, error classification, and retry orchestration.
//!
//! # Features
//!
//! - Streaming downloads to disk in 32 KiB pieces with throttled progress events
//! - Resume from a partial file via `Range`, with silent restart when the server ignores it
//! - Cooperative stop through a [`CancellationToken`](tokio_util::sync::CancellationToken)
//! - Retryable/fatal classification and exponential backoff without jitter
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use launcher_fetch::download::{HttpTransfer, RetryPolicy, TransferRequest, run};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = HttpTransfer::new();
//! let request = TransferRequest {
//!     url: "https://example.com/jre.tar.gz".to_string(),
//!     destination: "./cache/jre.tar.gz".into(),
//!     offset: 0,
//!     deadline: Duration::from_secs(1800),
//! };
//! let outcome = run(&engine, &request, &RetryPolicy::critical(), &(), &CancellationToken::new()).await?;
//! println!("downloaded {} bytes", outcome.downloaded_bytes);
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod error;
mod filename;
mod orchestrator;
mod progress;
mod retry;

pub use client::{HttpTransfer, RemoteInfo, Transfer, TransferOutcome, TransferRequest};
pub use error::DownloadError;
pub use filename::{filename_from_url, unique_filename};
pub use orchestrator::run;
pub use progress::{
    DownloadProgress, ProgressSink, ProgressStatus, TransferEvent, TransferProgress,
    format_bytes, percentage,
};
pub use retry::{
    CRITICAL_MAX_RETRIES, DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy,
    classify_error, classify_message,
};

// Note: no module-local Result alias. Use `Result<T, DownloadError>` explicitly.
