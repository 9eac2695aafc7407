//! CLI entry point for the launcher download manager.

use std::collections::HashSet;
use std::io::{self, IsTerminal};

use anyhow::{Context, Result, bail};
use clap::Parser;
use launcher_fetch::{
    DownloadRegistry, DownloadRequest, DownloadStatus, filename_from_url, unique_filename,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

mod app_config;
mod cli;
mod progress_ui;

use cli::Args;
use progress_ui::ProgressUi;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (warn, bars carry progress)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let file_config = if args.no_config {
        None
    } else {
        app_config::load_default_file_config()?
    };
    let config = app_config::resolve_manager_config(&args, file_config.as_ref());
    debug!(?config, "resolved configuration");

    tokio::fs::create_dir_all(&args.output_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create output directory '{}'",
                args.output_dir.display()
            )
        })?;

    let registry = DownloadRegistry::new(config).context("Failed to create download registry")?;
    let ui = ProgressUi::new(!args.quiet && io::stderr().is_terminal());

    let mut rejected = 0_usize;
    let mut watchers = Vec::new();
    let mut taken = HashSet::new();
    for url in &args.urls {
        let name = unique_filename(&filename_from_url(url), &mut taken);
        let destination = args.output_dir.join(&name);
        let (tx, rx) = mpsc::unbounded_channel();

        match registry.start_with(DownloadRequest::new(&name, url, destination).subscriber(tx)) {
            Ok(id) => {
                debug!(id = %id, url = %url, "download started");
                watchers.push(tokio::spawn(progress_ui::follow(rx, ui.add(&name))));
            }
            Err(e) => {
                error!(url = %url, error = %e, "rejected download");
                rejected += 1;
            }
        }
    }

    let all_done = async {
        for watcher in watchers {
            if let Err(e) = watcher.await {
                warn!(error = %e, "progress watcher panicked");
            }
        }
    };
    tokio::select! {
        () = all_done => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, cancelling downloads");
        }
    }
    registry.shutdown().await;

    let mut failed = rejected;
    for task in registry.list() {
        match &task.status {
            DownloadStatus::Completed => {
                info!(
                    path = %task.destination.display(),
                    bytes = task.downloaded_bytes,
                    "saved"
                );
            }
            DownloadStatus::Failed(message) => {
                failed += 1;
                eprintln!("failed: {}: {message}", task.name);
                eprintln!("  download manually: {}", task.url);
            }
            other => {
                failed += 1;
                eprintln!("{other}: {}", task.name);
            }
        }
    }

    let total = args.urls.len();
    if !args.quiet {
        eprintln!("{} of {total} downloads completed", total - failed);
    }
    if failed > 0 {
        bail!("{failed} of {total} downloads did not complete");
    }
    Ok(())
}
