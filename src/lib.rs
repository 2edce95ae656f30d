//! # media-dl
//!
//! Concurrent download orchestration for `yt-dlp` style command-line tools.
//!
//! ## Design Philosophy
//!
//! media-dl is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//! - **Tool-agnostic at the seams** - Argument construction and record keeping
//!   are traits the caller can replace
//! - **Failure as data** - A running job never returns an error; it finishes
//!   with a severity and a trail of events
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::catalog::InMemoryCatalog;
//! use media_dl::tool::YtDlpArguments;
//! use media_dl::{Config, DownloadOrchestrator, DownloadTarget, TargetKind, run_with_shutdown};
//! use std::{path::PathBuf, sync::Arc};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = DownloadOrchestrator::new(
//!         Config::default(),
//!         Arc::new(YtDlpArguments::default()),
//!         Arc::new(InMemoryCatalog::new()),
//!     )?;
//!
//!     // Subscribe to events
//!     let mut events = orchestrator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let target = DownloadTarget {
//!         id: "clip".into(),
//!         name: "A clip".into(),
//!         url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".into(),
//!         kind: TargetKind::Video,
//!         save_dir: PathBuf::from("/media/clips"),
//!     };
//!     orchestrator
//!         .start(vec![(target, serde_json::json!({}))], None, false)
//!         .await?;
//!
//!     // Runs until the work is done or SIGTERM/SIGINT arrives
//!     tokio::select! {
//!         _ = orchestrator.wait() => {}
//!         _ = run_with_shutdown(orchestrator.clone()) => {}
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Media catalog collaborators
pub mod catalog;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Orchestrator and worker pool
pub mod orchestrator;
/// External process execution and output parsing
pub mod process;
/// Work queue
pub mod queue;
/// Progress event channel
pub mod sink;
/// External downloader integration
pub mod tool;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use catalog::{Catalog, InMemoryCatalog, MatchPolicy};
pub use config::Config;
pub use error::{Error, Result, WorkerError};
pub use orchestrator::DownloadOrchestrator;
pub use tool::{ArgumentBuilder, YtDlpArguments};
pub use types::{
    ConfirmKind, DlStat, DownloadTarget, Event, MediaFile, MediaRecord, Severity, Stage,
    StatusTag, SystemErrorCode, TargetKind, VideoMetadata, WorkId, WorkItem,
};

/// Stop the orchestrator when the process is asked to terminate
///
/// Resolves once a termination signal has arrived, the run has been told to
/// stop with [`DownloadOrchestrator::stop`] and its loop has wound down.
///
/// - **Unix:** SIGTERM or SIGINT. If one of them cannot be registered the other
///   is still honoured; if neither can, falls back to `tokio::signal::ctrl_c()`.
/// - **Other platforms:** Ctrl+C only.
pub async fn run_with_shutdown(orchestrator: DownloadOrchestrator) {
    wait_for_signal().await;
    orchestrator.stop();
    orchestrator.wait().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{Signal, SignalKind, signal};

    async fn next(listener: Option<&mut Signal>) {
        match listener {
            Some(listener) => {
                listener.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    // Registration can fail in sandboxes; keep whichever listeners we get
    let mut term = signal(SignalKind::terminate())
        .inspect_err(|e| tracing::warn!(error = %e, "SIGTERM listener unavailable"))
        .ok();
    let mut int = signal(SignalKind::interrupt())
        .inspect_err(|e| tracing::warn!(error = %e, "SIGINT listener unavailable"))
        .ok();

    if term.is_none() && int.is_none() {
        tracing::error!("No signal listener could be installed, falling back to ctrl_c");
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl_c listener failed");
        }
        return;
    }

    tokio::select! {
        () = next(term.as_mut()) => tracing::info!(signal = "SIGTERM", "Shutdown signal received"),
        () = next(int.as_mut()) => tracing::info!(signal = "SIGINT", "Shutdown signal received"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!(signal = "ctrl_c", "Shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "ctrl_c listener failed"),
    }
}
