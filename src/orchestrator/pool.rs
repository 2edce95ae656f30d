//! Worker pool owned by the orchestrator loop

use super::worker::{Completion, Worker};
use crate::error::WorkerError;
use crate::process::AdapterContext;
use crate::types::{Event, WorkItem};
use tokio::sync::mpsc;

/// The live workers of one run
///
/// Only the orchestrator loop touches the pool, so it needs no lock. Growing
/// takes effect immediately; shrinking marks workers as doomed and they are
/// removed lazily the next time the loop picks them for a job.
pub(crate) struct WorkerPool {
    workers: Vec<Worker>,
    next_index: usize,
    ctx: AdapterContext,
    simulate: bool,
    completions: mpsc::UnboundedSender<Completion>,
}

impl WorkerPool {
    pub(crate) fn new(
        size: usize,
        ctx: AdapterContext,
        simulate: bool,
        completions: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        let mut pool = Self {
            workers: Vec::with_capacity(size),
            next_index: 0,
            ctx,
            simulate,
            completions,
        };
        for _ in 0..size {
            pool.spawn_worker();
        }
        pool
    }

    /// Number of workers in the pool, doomed ones included
    pub(crate) fn len(&self) -> usize {
        self.workers.len()
    }

    /// Number of workers not marked for removal
    pub(crate) fn live(&self) -> usize {
        self.workers.iter().filter(|w| !w.doomed).count()
    }

    pub(crate) fn all_available(&self) -> bool {
        self.workers.iter().all(Worker::is_available)
    }

    pub(crate) fn first_available(&self) -> Option<usize> {
        self.workers.iter().position(Worker::is_available)
    }

    pub(crate) fn is_doomed(&self, position: usize) -> bool {
        self.workers.get(position).is_some_and(|w| w.doomed)
    }

    pub(crate) async fn assign(&self, position: usize, item: WorkItem) -> Result<(), WorkerError> {
        match self.workers.get(position) {
            Some(worker) => worker.assign(item).await,
            None => Err(WorkerError::Closed { worker: position }),
        }
    }

    /// Adjust the pool towards `target` live workers
    pub(crate) fn resize(&mut self, target: usize) {
        let before = self.len();

        while self.live() < target {
            if let Some(worker) = self.workers.iter_mut().find(|w| w.doomed) {
                tracing::debug!(worker = worker.index(), "Worker reprieved");
                worker.doomed = false;
            } else {
                self.spawn_worker();
            }
        }
        while self.live() > target {
            if let Some(worker) = self.workers.iter_mut().find(|w| !w.doomed) {
                tracing::debug!(worker = worker.index(), "Worker marked for removal");
                worker.doomed = true;
            }
        }

        tracing::info!(target, live = self.live(), workers = self.len(), "Pool resized");
        if self.len() != before {
            self.ctx.sink.emit(Event::PoolResized { size: self.len() });
        }
    }

    /// Tear down a doomed worker and drop it from the pool
    pub(crate) async fn retire(&mut self, position: usize) {
        if position >= self.workers.len() {
            return;
        }
        let mut worker = self.workers.remove(position);
        worker.close().await;
        worker.join().await;
        tracing::info!(worker = worker.index(), workers = self.len(), "Worker retired");
        self.ctx.sink.emit(Event::PoolResized { size: self.len() });
    }

    /// Close every worker, then wait for all of them to exit
    pub(crate) async fn shutdown(&mut self) {
        for worker in &self.workers {
            worker.close().await;
        }
        futures::future::join_all(self.workers.iter_mut().map(Worker::join)).await;
        self.workers.clear();
    }

    fn spawn_worker(&mut self) {
        let worker = Worker::spawn(
            self.next_index,
            self.ctx.clone(),
            self.simulate,
            self.completions.clone(),
        );
        self.next_index += 1;
        self.workers.push(worker);
    }
}
