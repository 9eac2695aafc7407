//! Launcher Fetch Library
//!
//! Download manager for launcher assets: installer binaries, runtime archives,
//! and game archives fetched over HTTP(S) with live progress, automatic retry
//! with exponential backoff, resumable partial files, and a registry that runs
//! several downloads at once with pause/resume/cancel.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`download`] - transfer engine, error classifier, retry orchestrator
//! - [`registry`] - task registry with bounded concurrency and lifecycle control
//! - [`config`] - registry settings and validation
//! - [`user_agent`] - product-identifying User-Agent

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
pub mod registry;
pub mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, DEFAULT_MAX_CONCURRENT_DOWNLOADS, ManagerConfig};
pub use download::{
    CRITICAL_MAX_RETRIES, DEFAULT_MAX_RETRIES, DownloadError, DownloadProgress, FailureType,
    HttpTransfer, ProgressStatus, RetryDecision, RetryPolicy, Transfer, TransferRequest,
    classify_error, filename_from_url, format_bytes, unique_filename,
};
pub use registry::{DownloadRegistry, DownloadRequest, DownloadStatus, DownloadTask, RegistryError};
pub use user_agent::UserAgent;
