//! Retry policy, backoff schedule, and failure classification.
//!
//! When an attempt fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::Retryable`] - transient; another attempt may succeed
//! - [`FailureType::Fatal`] - retrying cannot help
//!
//! The [`RetryPolicy`] then decides, from the classification and the attempt
//! count, whether to go again and how long to wait first.
//!
//! # Example
//!
//! ```
//! use launcher_fetch::download::{
//!     DownloadError, FailureType, RetryDecision, RetryPolicy, classify_error,
//! };
//!
//! let policy = RetryPolicy::default();
//! let error = DownloadError::http_status("https://example.com/java.zip", 503);
//!
//! match policy.should_retry(classify_error(&error), 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use tracing::{debug, instrument};

use super::DownloadError;
use super::constants::{LARGE_ASSET_DEADLINE, SMALL_ASSET_DEADLINE};

/// Default maximum attempts for ordinary assets.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Attempts used by [`RetryPolicy::critical`] for installer binaries.
pub const CRITICAL_MAX_RETRIES: u32 = 7;

/// Default base delay for exponential backoff (1 second).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (30 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Classification of download failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: connection reset, timeout, DNS failure, 503.
    Retryable,

    /// Failure that won't succeed regardless of retries.
    ///
    /// Examples: 403, 404, permission denied, disk full.
    Fatal,
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt this will be (1-indexed, so the first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why no retry is attempted.
        reason: String,
    },
}

/// Retry budget, backoff schedule, and per-attempt deadline.
///
/// # Delay Calculation
///
/// ```text
/// delay before attempt n (n > 1) = min(base_delay * 2^(n-2), max_delay)
/// ```
///
/// With the defaults (1s / 30s) the sequence is 1s, 2s, 4s, 8s, 16s, 30s, 30s, ...
/// No jitter is applied, so observers can render an exact countdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            deadline: LARGE_ASSET_DEADLINE,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with custom settings; `max_attempts` is raised to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            ..Self::default()
        }
    }

    /// Creates a policy with a custom attempt budget, defaults otherwise.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Policy for installer binaries the launcher cannot run without.
    #[must_use]
    pub fn critical() -> Self {
        Self::with_max_attempts(CRITICAL_MAX_RETRIES)
    }

    /// Policy for small assets: default budget, short deadline.
    #[must_use]
    pub fn small_asset() -> Self {
        Self::default().deadline(SMALL_ASSET_DEADLINE)
    }

    /// Overrides the per-attempt deadline.
    #[must_use]
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Returns the maximum number of attempts, including the first.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the base backoff delay.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Returns the backoff cap.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Returns the deadline applied to each transfer attempt.
    #[must_use]
    pub fn attempt_deadline(&self) -> Duration {
        self.deadline
    }

    /// Determines whether to retry after `attempt` (1-indexed) failed.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Fatal {
            return RetryDecision::DoNotRetry {
                reason: "fatal failure - retry would not help".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let next = attempt + 1;
        let delay = self.delay_before(next);
        debug!(attempt, next_attempt = next, delay_ms = delay.as_millis(), "will retry");

        RetryDecision::Retry {
            delay,
            attempt: next,
        }
    }

    /// Backoff to sleep before `attempt` (1-indexed). Zero for the first attempt.
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 1_u32.checked_shl(attempt - 2).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Retryable signatures in transport error text.
const RETRYABLE_SIGNATURES: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection closed",
    "connection timed out",
    "timed out",
    "timeout",
    "temporary failure",
    "network is unreachable",
    "network unreachable",
    "no such host",
    "dns error",
    "failed to lookup address",
    "broken pipe",
    "unexpected eof",
    "handshake timeout",
    "http 429",
    "http 502",
    "http 503",
    "http 504",
];

/// Fatal signatures: local filesystem problems.
const FATAL_SIGNATURES: &[&str] = &[
    "permission denied",
    "access is denied",
    "no such file",
    "not found",
    "disk full",
    "no space left",
    "read-only file system",
];

/// Classifies a download error.
///
/// | Error | Type |
/// |-------|------|
/// | `HttpStatus` 429, 502, 503, 504 | Retryable |
/// | `HttpStatus` anything else | Fatal |
/// | `Timeout` | Retryable |
/// | `Network` | by message ([`classify_message`]), default Retryable |
/// | `Filesystem` | Fatal |
/// | `InvalidUrl`, `Cancelled`, `ExhaustedRetries` | Fatal |
#[instrument(level = "debug")]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { status, .. } => classify_http_status(*status),
        DownloadError::Timeout { .. } => FailureType::Retryable,
        DownloadError::Network { reason, .. } => classify_message(reason),
        DownloadError::Filesystem { .. }
        | DownloadError::InvalidUrl { .. }
        | DownloadError::Cancelled { .. }
        | DownloadError::ExhaustedRetries { .. } => FailureType::Fatal,
    }
}

/// Classifies free-text error output by signature.
///
/// Unrecognized messages are Retryable: the launcher prefers one wasted
/// attempt over abandoning an install on a transient blip.
#[must_use]
pub fn classify_message(message: &str) -> FailureType {
    let lower = message.to_lowercase();

    if RETRYABLE_SIGNATURES.iter().any(|sig| lower.contains(sig)) {
        return FailureType::Retryable;
    }

    if let Some(status) = http_status_in(&lower) {
        return classify_http_status(status);
    }

    if FATAL_SIGNATURES.iter().any(|sig| lower.contains(sig)) {
        return FailureType::Fatal;
    }

    FailureType::Retryable
}

#[allow(clippy::match_same_arms)]
fn classify_http_status(status: u16) -> FailureType {
    match status {
        429 => FailureType::Retryable, // Too Many Requests
        502 => FailureType::Retryable, // Bad Gateway
        503 => FailureType::Retryable, // Service Unavailable
        504 => FailureType::Retryable, // Gateway Timeout
        _ => FailureType::Fatal,
    }
}

/// Extracts the status from an "http <code>" fragment.
fn http_status_in(lower: &str) -> Option<u16> {
    let start = lower.find("http ")? + "http ".len();
    let digits: String = lower[start..].chars().take_while(char::is_ascii_digit).collect();
    if digits.len() == 3 { digits.parse().ok() } else { None }
}
