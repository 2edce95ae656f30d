//! Pool slot that runs one work item at a time

use crate::error::WorkerError;
use crate::process::{AdapterContext, ProcessAdapter, StopHandle};
use crate::types::{Event, Severity, WorkId, WorkItem};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Reported to the orchestrator when a job ends
#[derive(Debug, Clone, Copy)]
pub(crate) struct Completion {
    pub(crate) id: WorkId,
    pub(crate) severity: Severity,
}

/// One worker task plus the handles the orchestrator drives it with
///
/// The worker polls its slot; when the orchestrator puts an item there it runs a
/// fresh [`ProcessAdapter`] to completion, reports the outcome, clears the slot
/// and becomes available again.
pub(crate) struct Worker {
    index: usize,
    /// Marked for removal once its current job (if any) is done
    pub(crate) doomed: bool,
    available: Arc<AtomicBool>,
    slot: Arc<Mutex<Option<WorkItem>>>,
    active: Arc<Mutex<Option<StopHandle>>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn the worker loop
    pub(crate) fn spawn(
        index: usize,
        ctx: AdapterContext,
        simulate: bool,
        completions: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        let available = Arc::new(AtomicBool::new(true));
        let slot = Arc::new(Mutex::new(None));
        let active = Arc::new(Mutex::new(None));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(worker_loop(WorkerLoop {
            index,
            ctx,
            simulate,
            completions,
            available: available.clone(),
            slot: slot.clone(),
            active: active.clone(),
            cancel: cancel.clone(),
        }));

        tracing::debug!(worker = index, "Worker spawned");
        Self {
            index,
            doomed: false,
            available,
            slot,
            active,
            cancel,
            handle: Some(handle),
        }
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    /// Whether the worker can take a job
    pub(crate) fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Hand the worker a job
    pub(crate) async fn assign(&self, item: WorkItem) -> Result<(), WorkerError> {
        if self.cancel.is_cancelled() {
            return Err(WorkerError::Closed { worker: self.index });
        }
        if !self.is_available() {
            return Err(WorkerError::Busy { worker: self.index });
        }
        self.available.store(false, Ordering::SeqCst);
        *self.slot.lock().await = Some(item);
        Ok(())
    }

    /// Stop the running adapter (if any) and ask the loop to exit
    pub(crate) async fn close(&self) {
        // Cancel first: a job registered after this point sees the token and stops itself
        self.cancel.cancel();
        if let Some(stop) = self.active.lock().await.as_ref() {
            tracing::debug!(worker = self.index, "Stopping active job");
            stop.stop();
        }
    }

    /// Wait for the worker loop to exit
    pub(crate) async fn join(&mut self) {
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            tracing::warn!(worker = self.index, error = %e, "Worker task failed");
        }
    }
}

struct WorkerLoop {
    index: usize,
    ctx: AdapterContext,
    simulate: bool,
    completions: mpsc::UnboundedSender<Completion>,
    available: Arc<AtomicBool>,
    slot: Arc<Mutex<Option<WorkItem>>>,
    active: Arc<Mutex<Option<StopHandle>>>,
    cancel: CancellationToken,
}

async fn worker_loop(w: WorkerLoop) {
    let poll = w.ctx.config.pool.worker_poll_interval;

    loop {
        let job = w.slot.lock().await.clone();

        if let Some(item) = job {
            let id = item.id;
            tracing::debug!(worker = w.index, work_id = %id, "Job picked up");

            let adapter = ProcessAdapter::new(item, w.simulate, w.ctx.clone());
            let stop = adapter.stop_handle();
            *w.active.lock().await = Some(stop.clone());
            if w.cancel.is_cancelled() {
                // Closed between assignment and start
                stop.stop();
            }

            let result = adapter.run().await;
            *w.active.lock().await = None;

            tracing::debug!(worker = w.index, work_id = %id, severity = %result.severity, "Job finished");
            w.ctx.sink.emit(Event::JobFinished {
                id,
                severity: result.severity,
            });
            w.completions
                .send(Completion {
                    id,
                    severity: result.severity,
                })
                .ok();

            *w.slot.lock().await = None;
            w.available.store(true, Ordering::SeqCst);
            continue;
        }

        if w.cancel.is_cancelled() {
            break;
        }

        tokio::select! {
            () = w.cancel.cancelled() => {}
            () = tokio::time::sleep(poll) => {}
        }
    }

    tracing::debug!(worker = w.index, "Worker exited");
}
