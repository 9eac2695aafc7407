//! Constants for the download module (chunking, throttling, timeouts).

use std::time::Duration;

/// Size of each write/progress step while streaming a body (32 KiB).
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Minimum spacing between progress emissions for one transfer.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default per-attempt deadline for large installer binaries (30 minutes).
pub const LARGE_ASSET_DEADLINE: Duration = Duration::from_secs(30 * 60);

/// Per-attempt deadline for small assets (2 minutes).
pub const SMALL_ASSET_DEADLINE: Duration = Duration::from_secs(2 * 60);

/// Deadline for HEAD probes.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
