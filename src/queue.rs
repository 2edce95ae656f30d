//! Work queue: the ordered list of work items for one orchestration run
//!
//! The queue is the only structure shared between the orchestrator loop and
//! anything else. It exposes exactly two operations on its items, both under a
//! single lock: [`WorkQueue::fetch_next`] and [`WorkQueue::change_stage`].
//! Fetching does not claim the item; the caller must follow a successful
//! assignment with a separate `change_stage(id, Stage::Active)`.

use crate::error::{Error, Result};
use crate::types::{DownloadTarget, Stage, WorkId, WorkItem};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct QueueState {
    items: Vec<WorkItem>,
    index: HashMap<WorkId, usize>,
}

/// Ordered work items with per-item lifecycle stage
#[derive(Debug)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    len: usize,
}

impl WorkQueue {
    /// Build a queue from a work source of `(target, options)` pairs
    ///
    /// Items are numbered from 1 in source order. Rejects an empty source and
    /// targets with an empty URL.
    pub fn from_source(source: Vec<(DownloadTarget, serde_json::Value)>) -> Result<Self> {
        if source.is_empty() {
            return Err(Error::InvalidWorkSource("work source is empty".into()));
        }

        let mut state = QueueState::default();
        for (position, (target, options)) in source.into_iter().enumerate() {
            if target.url.trim().is_empty() {
                return Err(Error::InvalidWorkSource(format!(
                    "target '{}' at position {} has no source URL",
                    target.name, position
                )));
            }
            let id = WorkId(position as i64 + 1);
            state.index.insert(id, position);
            state.items.push(WorkItem {
                id,
                target: Arc::new(target),
                options: Arc::new(options),
                stage: Stage::Queued,
            });
        }

        let len = state.items.len();
        Ok(Self {
            state: Mutex::new(state),
            len,
        })
    }

    /// First item still waiting for a worker, in source order
    ///
    /// Does not change any stage.
    pub async fn fetch_next(&self) -> Option<WorkItem> {
        let state = self.state.lock().await;
        state
            .items
            .iter()
            .find(|item| item.stage == Stage::Queued)
            .cloned()
    }

    /// Set the stage of an item; returns `false` for an unknown id
    pub async fn change_stage(&self, id: WorkId, stage: Stage) -> bool {
        let mut state = self.state.lock().await;
        let Some(&position) = state.index.get(&id) else {
            return false;
        };
        state.items[position].stage = stage;
        true
    }

    /// Current stage of an item
    pub async fn stage(&self, id: WorkId) -> Option<Stage> {
        let state = self.state.lock().await;
        state.index.get(&id).map(|&position| state.items[position].stage)
    }

    /// Number of items in the queue
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the queue holds no items (never true for a built queue)
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
