//! Download orchestrator: runs a work source through a bounded worker pool
//!
//! A run is started with [`DownloadOrchestrator::start`]. A single loop task
//! pulls queued items from the [`WorkQueue`], hands them to available workers,
//! and applies pool resizes. Each worker runs one
//! [`ProcessAdapter`](crate::process::ProcessAdapter) at a time. Progress is
//! published on the event channel returned by [`DownloadOrchestrator::subscribe`].

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::Result;
use crate::process::StderrClassifier;
use crate::queue::WorkQueue;
use crate::sink::ProgressSink;
use crate::tool::ArgumentBuilder;
use crate::types::{Event, Stage, WorkId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

mod lifecycle;
mod pool;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(all(test, unix))]
mod tests;

/// Messages from API calls to the orchestrator loop
#[derive(Debug)]
enum Control {
    Resize(usize),
}

/// State shared between the API handle and the orchestrator loop
#[derive(Default)]
struct RunState {
    /// Set by `start`, cleared by `stop` or when the loop ends
    running: AtomicBool,
    /// Workers currently in the pool, doomed ones included
    pool_size: AtomicUsize,
    /// Control channel into the current run's loop
    control: Mutex<Option<mpsc::UnboundedSender<Control>>>,
    /// Work queue of the current (or most recent) run
    queue: Mutex<Option<Arc<WorkQueue>>>,
    /// Handle of the current (or most recent) loop task
    main_loop: Mutex<Option<JoinHandle<()>>>,
}

/// Orchestrates concurrent invocations of the external downloader
///
/// Cloneable; every clone drives the same engine.
///
/// # Example
///
/// ```no_run
/// use media_dl::catalog::InMemoryCatalog;
/// use media_dl::tool::YtDlpArguments;
/// use media_dl::{Config, DownloadOrchestrator, DownloadTarget, TargetKind};
/// use std::{path::PathBuf, sync::Arc};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let orchestrator = DownloadOrchestrator::new(
///     Config::default(),
///     Arc::new(YtDlpArguments::default()),
///     Arc::new(InMemoryCatalog::new()),
/// )?;
///
/// let mut events = orchestrator.subscribe();
/// tokio::spawn(async move {
///     while let Ok(event) = events.recv().await {
///         tracing::info!(?event, "download event");
///     }
/// });
///
/// let target = DownloadTarget {
///     id: "chan".into(),
///     name: "Some channel".into(),
///     url: "https://www.youtube.com/@example".into(),
///     kind: TargetKind::Container,
///     save_dir: PathBuf::from("/media/example"),
/// };
/// orchestrator
///     .start(vec![(target, serde_json::json!({}))], Some(2), true)
///     .await?;
/// orchestrator.wait().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DownloadOrchestrator {
    config: Arc<Config>,
    sink: ProgressSink,
    arguments: Arc<dyn ArgumentBuilder>,
    catalog: Arc<dyn Catalog>,
    classifier: Arc<StderrClassifier>,
    client: reqwest::Client,
    state: Arc<RunState>,
}

impl DownloadOrchestrator {
    /// Create an idle orchestrator
    ///
    /// Validates the configuration and compiles the stderr patterns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) for invalid settings and
    /// [`Error::Network`](crate::Error::Network) if the HTTP client cannot be built.
    pub fn new(
        config: Config,
        arguments: Arc<dyn ArgumentBuilder>,
        catalog: Arc<dyn Catalog>,
    ) -> Result<Self> {
        config.validate()?;
        let classifier = StderrClassifier::from_config(&config.stderr)?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("media-dl/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let sink = ProgressSink::new(config.pool.event_capacity);

        Ok(Self {
            config: Arc::new(config),
            sink,
            arguments,
            catalog,
            classifier: Arc::new(classifier),
            client,
            state: Arc::new(RunState::default()),
        })
    }

    /// Subscribe to orchestration events
    ///
    /// Each subscriber receives every event emitted after it subscribed. A
    /// subscriber that falls more than `pool.event_capacity` events behind
    /// receives `RecvError::Lagged` and skips ahead.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.sink.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Whether a run is in progress
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// Number of workers in the pool, including workers waiting to be retired
    pub fn pool_size(&self) -> usize {
        self.state.pool_size.load(Ordering::SeqCst)
    }

    /// Stage of an item in the current (or most recent) run
    pub async fn stage(&self, id: WorkId) -> Option<Stage> {
        let queue = self.state.queue.lock().await.clone()?;
        queue.stage(id).await
    }

    /// Wait for the orchestrator loop to finish
    ///
    /// Returns immediately if no run was started.
    pub async fn wait(&self) {
        let handle = self.state.main_loop.lock().await.take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::error!(error = %e, "Orchestrator loop failed");
        }
    }
}
