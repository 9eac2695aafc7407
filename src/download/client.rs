//! Transfer engine: one HTTP GET streamed to disk with live progress.
//!
//! [`HttpTransfer`] is created once and shared by every worker so connections
//! are pooled. The [`Transfer`] trait is the seam the retry orchestrator and
//! the registry drive, which lets tests script failures without a socket.
//!
//! Two tasks writing the same destination at once is a caller error; nothing
//! here locks the destination file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::{Client, Method, Response, StatusCode};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::constants::{CHUNK_SIZE, CONNECT_TIMEOUT_SECS, PROBE_TIMEOUT, PROGRESS_INTERVAL};
use super::error::DownloadError;
use super::progress::{ProgressSink, TransferEvent, TransferProgress};
use crate::user_agent::UserAgent;

/// One transfer attempt: where from, where to, and how much is already there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Source URL.
    pub url: String,
    /// Destination file; parent directories are created on demand.
    pub destination: PathBuf,
    /// Bytes already in the destination. Non-zero sends a `Range` request.
    pub offset: u64,
    /// Wall-clock budget for the whole attempt, headers and body.
    pub deadline: Duration,
}

/// Result of a completed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Bytes written by this attempt.
    pub bytes_written: u64,
    /// Final size of the destination.
    pub downloaded_bytes: u64,
    /// Final size as announced by the server (or measured, when it did not say).
    pub total_bytes: u64,
    /// Whether the server honored the `Range` request.
    pub resumed: bool,
}

/// What a HEAD probe learned about a remote artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteInfo {
    /// `Content-Length`, if announced.
    pub content_length: Option<u64>,
    /// Whether the server advertises `Accept-Ranges: bytes`.
    pub accepts_ranges: bool,
}

/// How the server answered the request that opens an attempt.
enum Opened {
    /// A body to stream, ranged (206) or full (200).
    Body(Response),
    /// The ranged request started exactly at the remote size.
    Complete,
}

/// Performs a single transfer attempt.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Fetches `request.url` into `request.destination`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Cancelled`] when `stop` fires (not a failure),
    /// or the raw transport/HTTP/filesystem error. Never retries.
    async fn transfer(
        &self,
        request: &TransferRequest,
        sink: &dyn ProgressSink,
        stop: &CancellationToken,
    ) -> Result<TransferOutcome, DownloadError>;
}

/// reqwest-backed transfer engine.
#[derive(Debug, Clone)]
pub struct HttpTransfer {
    client: Client,
}

impl Default for HttpTransfer {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransfer {
    /// Creates an engine with the default User-Agent and connect timeout.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static configuration.
    /// This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_user_agent(&UserAgent::default(), CONNECT_TIMEOUT_SECS)
            .expect("failed to build HTTP client with static configuration")
    }

    /// Creates an engine with an explicit User-Agent and connect timeout.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error (e.g. TLS backend initialization).
    pub fn with_user_agent(
        user_agent: &UserAgent,
        connect_timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .user_agent(user_agent.to_string())
            .build()?;
        Ok(Self { client })
    }

    /// Asks the server for size and range support without fetching the body.
    ///
    /// # Errors
    ///
    /// Returns the same transport and status errors as a transfer.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn probe(&self, url: &str) -> Result<RemoteInfo, DownloadError> {
        let response = tokio::time::timeout(PROBE_TIMEOUT, self.send(Method::HEAD, url, None))
            .await
            .map_err(|_| DownloadError::timeout(url))??;

        let accepts_ranges = response
            .headers()
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("bytes"));

        Ok(RemoteInfo {
            content_length: header_content_length(&response),
            accepts_ranges,
        })
    }

    /// Downloads a small asset (manifest, version list) into memory.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Timeout`] when `deadline` elapses, otherwise the
    /// same errors as a transfer.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_bytes(&self, url: &str, deadline: Duration) -> Result<Vec<u8>, DownloadError> {
        let fetch = async {
            let response = self.send(Method::GET, url, None).await?;
            response
                .bytes()
                .await
                .map_err(|e| map_reqwest_error(url, &e))
        };
        let body = tokio::time::timeout(deadline, fetch)
            .await
            .map_err(|_| DownloadError::timeout(url))??;
        debug!(bytes = body.len(), "fetched into memory");
        Ok(body.to_vec())
    }

    /// Sends the GET that opens an attempt, resuming from `offset` when non-zero.
    ///
    /// A 416 reply means the partial file is not a prefix of the remote one:
    /// either it is already whole, or the remote shrank and the attempt
    /// restarts from zero.
    async fn open(&self, url: &str, offset: u64) -> Result<Opened, DownloadError> {
        if offset == 0 {
            return self.send(Method::GET, url, None).await.map(Opened::Body);
        }

        let range = format!("bytes={offset}-");
        let response = self.request(Method::GET, url, Some(&range)).await?;
        if response.status() != StatusCode::RANGE_NOT_SATISFIABLE {
            return check_status(url, response).map(Opened::Body);
        }

        let remote_total = header_content_range_total(&response);
        if remote_total == Some(offset) {
            debug!(offset, "partial file already holds the whole resource");
            return Ok(Opened::Complete);
        }
        warn!(
            offset,
            remote_total = ?remote_total,
            "range not satisfiable; restarting from zero"
        );
        self.send(Method::GET, url, None).await.map(Opened::Body)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        range: Option<&str>,
    ) -> Result<Response, DownloadError> {
        let response = self.request(method, url, range).await?;
        check_status(url, response)
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        range: Option<&str>,
    ) -> Result<Response, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let mut request = self.client.request(method, url);
        if let Some(range) = range {
            request = request.header(RANGE, range);
        }

        request
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, &e))
    }
}

fn check_status(url: &str, response: Response) -> Result<Response, DownloadError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(DownloadError::http_status(url, response.status().as_u16()))
    }
}

#[async_trait]
impl Transfer for HttpTransfer {
    #[instrument(skip(self, sink, stop), fields(url = %request.url, offset = request.offset))]
    async fn transfer(
        &self,
        request: &TransferRequest,
        sink: &dyn ProgressSink,
        stop: &CancellationToken,
    ) -> Result<TransferOutcome, DownloadError> {
        let url = request.url.as_str();
        let deadline = Instant::now() + request.deadline;

        if stop.is_cancelled() {
            return Err(DownloadError::cancelled(request.offset));
        }

        let opened = tokio::select! {
            biased;
            () = stop.cancelled() => return Err(DownloadError::cancelled(request.offset)),
            opened = tokio::time::timeout_at(deadline, self.open(url, request.offset)) => {
                opened.map_err(|_| DownloadError::timeout(url))??
            }
        };
        let response = match opened {
            Opened::Body(response) => response,
            Opened::Complete => {
                sink.emit(TransferEvent::Completed(TransferProgress {
                    downloaded_bytes: request.offset,
                    total_bytes: Some(request.offset),
                    speed_bps: 0,
                    eta_seconds: Some(0),
                }));
                info!(
                    path = %request.destination.display(),
                    bytes = request.offset,
                    "transfer complete, nothing left to fetch"
                );
                return Ok(TransferOutcome {
                    bytes_written: 0,
                    downloaded_bytes: request.offset,
                    total_bytes: request.offset,
                    resumed: true,
                });
            }
        };

        let status = response.status().as_u16();
        let resumed = request.offset > 0 && status == 206;
        if request.offset > 0 && !resumed {
            warn!(
                offset = request.offset,
                status, "server ignored Range request; restarting from zero"
            );
        }
        let start_offset = if resumed { request.offset } else { 0 };
        let total_bytes = header_content_length(&response).map(|len| start_offset + len);

        let file = open_destination(&request.destination, resumed).await?;
        debug!(
            path = %request.destination.display(),
            status,
            resumed,
            total_bytes = ?total_bytes,
            "streaming response body"
        );

        sink.emit(TransferEvent::Progress(TransferProgress {
            downloaded_bytes: start_offset,
            total_bytes,
            speed_bps: 0,
            eta_seconds: None,
        }));

        let mut writer = BufWriter::new(file);
        let mut stream = response.bytes_stream();
        let started = Instant::now();
        let mut last_emit = started;
        let mut downloaded = start_offset;
        let mut written: u64 = 0;
        let mut speed_bps = 0;

        loop {
            let next = tokio::select! {
                biased;
                () = stop.cancelled() => {
                    flush(&mut writer, &request.destination).await?;
                    debug!(downloaded, "transfer stopped by owner");
                    return Err(DownloadError::cancelled(downloaded));
                }
                () = tokio::time::sleep_until(deadline) => {
                    flush_partial(&mut writer, &request.destination).await;
                    return Err(DownloadError::timeout(url));
                }
                next = stream.next() => next,
            };

            let Some(chunk) = next else {
                break;
            };
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    // Keep what arrived so the next attempt can resume from it.
                    flush_partial(&mut writer, &request.destination).await;
                    return Err(map_reqwest_error(url, &e));
                }
            };

            for piece in chunk.chunks(CHUNK_SIZE) {
                if stop.is_cancelled() {
                    flush(&mut writer, &request.destination).await?;
                    return Err(DownloadError::cancelled(downloaded));
                }

                writer
                    .write_all(piece)
                    .await
                    .map_err(|e| DownloadError::filesystem(&request.destination, e))?;
                downloaded += piece.len() as u64;
                written += piece.len() as u64;

                let now = Instant::now();
                if now.duration_since(last_emit) >= PROGRESS_INTERVAL {
                    let (speed, eta_seconds) =
                        throughput(written, now.duration_since(started), downloaded, total_bytes);
                    speed_bps = speed;
                    sink.emit(TransferEvent::Progress(TransferProgress {
                        downloaded_bytes: downloaded,
                        total_bytes,
                        speed_bps,
                        eta_seconds,
                    }));
                    last_emit = now;
                }
            }
        }

        flush(&mut writer, &request.destination).await?;

        if let Some(total) = total_bytes
            && downloaded < total
        {
            return Err(DownloadError::network_reason(
                url,
                format!("unexpected eof: received {downloaded} of {total} bytes"),
            ));
        }

        let total = total_bytes.unwrap_or(downloaded);
        sink.emit(TransferEvent::Completed(TransferProgress {
            downloaded_bytes: downloaded,
            total_bytes: Some(total),
            speed_bps,
            eta_seconds: Some(0),
        }));

        info!(
            path = %request.destination.display(),
            bytes = downloaded,
            resumed,
            "transfer complete"
        );

        Ok(TransferOutcome {
            bytes_written: written,
            downloaded_bytes: downloaded,
            total_bytes: total,
            resumed,
        })
    }
}

/// Opens the destination for append (true resume) or create/truncate.
async fn open_destination(path: &Path, append: bool) -> Result<File, DownloadError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::filesystem(parent, e))?;
    }

    let result = if append {
        OpenOptions::new().create(true).append(true).open(path).await
    } else {
        File::create(path).await
    };
    result.map_err(|e| DownloadError::filesystem(path, e))
}

async fn flush(writer: &mut BufWriter<File>, path: &Path) -> Result<(), DownloadError> {
    writer
        .flush()
        .await
        .map_err(|e| DownloadError::filesystem(path, e))
}

/// Flushes on a path that already has an error to report; a failure is only logged.
async fn flush_partial(writer: &mut BufWriter<File>, path: &Path) {
    if let Err(e) = writer.flush().await {
        warn!(path = %path.display(), error = %e, "failed to flush partial file");
    }
}

fn map_reqwest_error(url: &str, error: &reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url)
    } else {
        DownloadError::network(url, error)
    }
}

fn header_content_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Remote size from a `Content-Range` header (`bytes */N` or `bytes a-b/N`).
fn header_content_range_total(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range_total)
}

fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.trim().rsplit_once('/')?;
    total.trim().parse().ok()
}

/// Average speed of this attempt and the ETA it implies.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn throughput(
    written: u64,
    elapsed: Duration,
    downloaded: u64,
    total: Option<u64>,
) -> (u64, Option<u64>) {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return (0, None);
    }
    let speed = (written as f64 / secs) as u64;
    let eta = match total {
        Some(total) if speed > 0 => Some(total.saturating_sub(downloaded) / speed),
        _ => None,
    };
    (speed, eta)
}
