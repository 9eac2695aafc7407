//! Error types for the download module.
//!
//! The transfer engine returns these raw; only the retry orchestrator decides
//! whether a given value is worth another attempt (see [`classify_error`]).
//!
//! [`classify_error`]: super::classify_error

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching an artifact.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Transport-level failure (connection refused/reset, DNS, TLS, stream cut).
    #[error("network error downloading {url}: {reason}")]
    Network {
        /// The URL being fetched.
        url: String,
        /// Flattened description of the transport error chain.
        reason: String,
    },

    /// The request or the body stream exceeded its deadline.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-2xx response.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Local I/O failure on the destination (create, write, truncate).
    #[error("filesystem error writing {path}: {source}")]
    Filesystem {
        /// The file or directory where the error occurred.
        path: PathBuf,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The URL could not be parsed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The rejected URL string.
        url: String,
    },

    /// The transfer was stopped by its owner (pause, cancel, shutdown).
    ///
    /// Not a failure: `downloaded_bytes` is what the destination holds.
    #[error("download cancelled after {downloaded_bytes} bytes")]
    Cancelled {
        /// Bytes present in the destination file when the transfer stopped.
        downloaded_bytes: u64,
    },

    /// The retry budget was spent; wraps the last underlying error.
    #[error("download failed after {attempts} attempts: {source}")]
    ExhaustedRetries {
        /// Number of attempts made.
        attempts: u32,
        /// The error from the final attempt.
        #[source]
        source: Box<DownloadError>,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error, flattening its source chain.
    ///
    /// reqwest's top-level message is generic ("error sending request"); the
    /// useful signature ("connection refused", "dns error") lives further down.
    pub fn network(url: impl Into<String>, source: &reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            reason: error_chain(source),
        }
    }

    /// Creates a network error from a plain description.
    pub fn network_reason(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a filesystem error.
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a cancellation marker.
    #[must_use]
    pub fn cancelled(downloaded_bytes: u64) -> Self {
        Self::Cancelled { downloaded_bytes }
    }

    /// Wraps the last error once the retry budget is spent.
    #[must_use]
    pub fn exhausted(attempts: u32, last: DownloadError) -> Self {
        Self::ExhaustedRetries {
            attempts,
            source: Box::new(last),
        }
    }

    /// Returns true for the owner-initiated stop marker.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns the HTTP status carried by this error, looking through
    /// [`DownloadError::ExhaustedRetries`].
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::ExhaustedRetries { source, .. } => source.status(),
            _ => None,
        }
    }
}

fn error_chain(error: &reqwest::Error) -> String {
    let mut reason = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(inner) = source {
        reason.push_str(": ");
        reason.push_str(&inner.to_string());
        source = inner.source();
    }
    reason
}

// No From<reqwest::Error> / From<std::io::Error>: every variant needs the url
// or path for context, which the source errors do not carry.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_timeout_display() {
        let error = DownloadError::timeout("https://example.com/java.tar.gz");
        assert!(error.to_string().contains("timeout"));
        assert!(error.to_string().contains("https://example.com/java.tar.gz"));
    }

    #[test]
    fn test_download_error_http_status_display() {
        let error = DownloadError::http_status("https://example.com/pack.zip", 403);
        let msg = error.to_string();
        assert!(msg.contains("403"), "Expected '403' in: {msg}");
        assert!(msg.contains("https://example.com/pack.zip"), "Expected URL in: {msg}");
    }

    #[test]
    fn test_download_error_filesystem_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = DownloadError::filesystem(PathBuf::from("/opt/launcher/prism.zip"), io_error);
        let msg = error.to_string();
        assert!(msg.contains("/opt/launcher/prism.zip"), "Expected path in: {msg}");
        assert!(msg.contains("access denied"), "Expected OS error in: {msg}");
    }

    #[test]
    fn test_download_error_exhausted_wraps_last_error() {
        let last = DownloadError::network_reason("https://example.com/a", "connection reset");
        let error = DownloadError::exhausted(3, last);
        let msg = error.to_string();
        assert!(msg.contains("3 attempts"), "Expected attempt count in: {msg}");
        assert!(msg.contains("connection reset"), "Expected cause in: {msg}");
        let source = std::error::Error::source(&error).unwrap();
        assert!(source.to_string().contains("connection reset"));
    }

    #[test]
    fn test_status_looks_through_exhausted() {
        let error = DownloadError::exhausted(2, DownloadError::http_status("u", 503));
        assert_eq!(error.status(), Some(503));
        assert_eq!(DownloadError::timeout("u").status(), None);
    }

    #[test]
    fn test_cancelled_marker() {
        let error = DownloadError::cancelled(4_194_304);
        assert!(error.is_cancelled());
        assert!(error.to_string().contains("4194304"));
        assert!(!DownloadError::timeout("u").is_cancelled());
    }
}
