//! Error types for registry operations.

use thiserror::Error;

use crate::config::ConfigError;

/// Registry misuse and construction failures.
///
/// Transfer failures are not registry errors: they end up in the task as
/// [`DownloadStatus::Failed`](super::DownloadStatus::Failed).
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No task with this id.
    #[error("download not found: {0}")]
    NotFound(String),

    /// The operation is not allowed from the task's current status.
    #[error("cannot {action} download {id} while {status}")]
    InvalidTransition {
        /// Task id.
        id: String,
        /// The rejected operation.
        action: &'static str,
        /// Status at the time of the call.
        status: String,
    },

    /// A caller-supplied id is already registered.
    #[error("download id already in use: {0}")]
    DuplicateId(String),

    /// `shutdown` has been called; no new work is accepted.
    #[error("download registry is shutting down")]
    ShuttingDown,

    /// The URL could not be parsed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

impl RegistryError {
    pub(crate) fn invalid_transition(
        id: impl Into<String>,
        action: &'static str,
        status: impl ToString,
    ) -> Self {
        Self::InvalidTransition {
            id: id.into(),
            action,
            status: status.to_string(),
        }
    }
}
