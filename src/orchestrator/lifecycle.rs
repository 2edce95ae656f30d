//! Run lifecycle: start, resize, stop, and the orchestrator loop itself.

use super::pool::WorkerPool;
use super::worker::Completion;
use super::{Control, DownloadOrchestrator, RunState};
use crate::error::{Error, Result};
use crate::process::AdapterContext;
use crate::queue::WorkQueue;
use crate::sink::ProgressSink;
use crate::tool::find_binary;
use crate::types::{DownloadTarget, Event, Severity, Stage};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc;

impl DownloadOrchestrator {
    /// Start running `source` with `pool_size` workers
    ///
    /// `pool_size` of `None` uses `pool.default_pool_size`. With
    /// `simulate_only` set, the tool only reports metadata and nothing is
    /// downloaded.
    ///
    /// # Errors
    ///
    /// Rejected before anything is spawned when the source is empty, a target
    /// has no URL, the pool size is zero, or a run is already in progress. A
    /// stopped run counts as in progress until [`wait`](Self::wait) returns.
    pub async fn start(
        &self,
        source: Vec<(DownloadTarget, serde_json::Value)>,
        pool_size: Option<usize>,
        simulate_only: bool,
    ) -> Result<()> {
        if self.is_running() {
            return Err(Error::AlreadyRunning);
        }
        // A stopped run is still winding down until its loop task returns
        if self
            .state
            .main_loop
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
        {
            return Err(Error::AlreadyRunning);
        }
        let pool_size = pool_size.unwrap_or(self.config.pool.default_pool_size);
        if pool_size == 0 {
            return Err(Error::Config {
                message: "pool size must be at least 1".into(),
                key: None,
            });
        }
        let queue = Arc::new(WorkQueue::from_source(source)?);

        if self
            .state
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::AlreadyRunning);
        }

        let binary = find_binary(&self.config.tool);
        match &binary {
            Some(path) => tracing::debug!(binary = %path.display(), "Using downloader binary"),
            None => tracing::warn!(
                names = ?self.config.tool.binary_names,
                "No downloader binary found; every item will fail"
            ),
        }

        let ctx = AdapterContext {
            config: self.config.clone(),
            arguments: self.arguments.clone(),
            catalog: self.catalog.clone(),
            sink: self.sink.clone(),
            client: self.client.clone(),
            binary,
            classifier: self.classifier.clone(),
        };

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::new(pool_size, ctx, simulate_only, completion_tx);

        *self.state.control.lock().await = Some(control_tx);
        *self.state.queue.lock().await = Some(queue.clone());
        self.state.pool_size.store(pool.len(), Ordering::SeqCst);

        tracing::info!(
            total = queue.len(),
            pool_size,
            simulate_only,
            arguments = self.arguments.name(),
            catalog = self.catalog.name(),
            "Starting orchestration"
        );

        let main_loop = MainLoop {
            total: queue.len(),
            queue,
            pool,
            state: self.state.clone(),
            sink: self.sink.clone(),
            poll: self.config.pool.orchestrator_poll_interval,
            control_rx,
            completion_rx,
            started: 0,
            completed: 0,
        };
        let handle = tokio::spawn(main_loop.run());
        *self.state.main_loop.lock().await = Some(handle);
        Ok(())
    }

    /// Change the number of workers in the running pool
    ///
    /// Growing takes effect on the loop's next iteration. Shrinking marks
    /// workers for removal; a worker that is busy finishes its job first.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for a size of zero, [`Error::NotRunning`] when idle.
    pub async fn resize(&self, pool_size: usize) -> Result<()> {
        if pool_size == 0 {
            return Err(Error::Config {
                message: "pool size must be at least 1".into(),
                key: None,
            });
        }
        if !self.is_running() {
            return Err(Error::NotRunning);
        }
        let control = self.state.control.lock().await;
        match control.as_ref() {
            Some(tx) if tx.send(Control::Resize(pool_size)).is_ok() => Ok(()),
            _ => Err(Error::NotRunning),
        }
    }

    /// Ask the current run to end
    ///
    /// The loop notices on its next iteration, stops every worker's process,
    /// waits for the workers to exit and then emits
    /// [`Event::OperationFinished`]. Use [`wait`](Self::wait) to block until
    /// then. Calling this while idle does nothing.
    pub fn stop(&self) {
        if self.state.running.swap(false, Ordering::SeqCst) {
            tracing::info!("Stop requested");
        }
    }
}

struct MainLoop {
    queue: Arc<WorkQueue>,
    pool: WorkerPool,
    state: Arc<RunState>,
    sink: ProgressSink,
    poll: Duration,
    control_rx: mpsc::UnboundedReceiver<Control>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    total: usize,
    started: usize,
    completed: usize,
}

impl MainLoop {
    async fn run(mut self) {
        self.sink.emit(Event::JobCountChanged { total: self.total });

        loop {
            if !self.state.running.load(Ordering::SeqCst) {
                tracing::info!("Orchestrator stopping");
                break;
            }

            while let Ok(control) = self.control_rx.try_recv() {
                match control {
                    Control::Resize(size) => self.pool.resize(size),
                }
            }
            self.drain_completions().await;

            match self.queue.fetch_next().await {
                None if self.pool.all_available() => {
                    tracing::info!(total = self.total, "All items processed");
                    break;
                }
                None => {}
                Some(item) => {
                    if let Some(position) = self.pool.first_available() {
                        if self.pool.is_doomed(position) {
                            self.pool.retire(position).await;
                        } else {
                            let id = item.id;
                            match self.pool.assign(position, item).await {
                                Ok(()) => {
                                    self.queue.change_stage(id, Stage::Active).await;
                                    self.started += 1;
                                    tracing::debug!(work_id = %id, started = self.started, "Job assigned");
                                    self.sink.emit(Event::JobStarted {
                                        id,
                                        started: self.started,
                                        total: self.total,
                                    });
                                }
                                Err(e) => {
                                    tracing::warn!(work_id = %id, error = %e, "Worker rejected job");
                                }
                            }
                        }
                    }
                }
            }

            self.state
                .pool_size
                .store(self.pool.len(), Ordering::SeqCst);
            tokio::time::sleep(self.poll).await;
        }

        self.pool.shutdown().await;
        self.drain_completions().await;
        self.state.pool_size.store(0, Ordering::SeqCst);
        *self.state.control.lock().await = None;
        self.state.running.store(false, Ordering::SeqCst);

        tracing::info!(
            completed = self.completed,
            total = self.total,
            "Orchestration finished"
        );
        self.sink.emit(Event::OperationFinished {
            completed: self.completed,
            total: self.total,
        });
    }

    async fn drain_completions(&mut self) {
        while let Ok(Completion { id, severity }) = self.completion_rx.try_recv() {
            self.completed += 1;
            if severity == Severity::Error {
                self.queue.change_stage(id, Stage::Error).await;
            }
        }
    }
}
