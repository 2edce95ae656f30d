//! Progress sink: the event channel between the engine and its consumers

use crate::types::{DlStat, Event, SystemErrorCode, WorkId};
use tokio::sync::broadcast;

/// Cloneable handle for emitting [`Event`]s
///
/// Every task in the engine (orchestrator loop, workers, process adapters) holds
/// a clone. Sending never fails the sender: with no subscribers the event is
/// dropped.
#[derive(Clone, Debug)]
pub struct ProgressSink {
    tx: broadcast::Sender<Event>,
}

impl ProgressSink {
    /// Create a sink buffering up to `capacity` events per lagging subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to every event emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: Event) {
        // send() only errs when nobody is listening
        self.tx.send(event).ok();
    }

    /// Live status snapshot for one item
    pub fn status(&self, id: WorkId, stat: DlStat) {
        self.emit(Event::Status { id, stat });
    }

    /// Append to an item's error log
    pub fn item_error(&self, id: WorkId, message: impl Into<String>) {
        self.emit(Event::ItemError {
            id,
            message: message.into(),
        });
    }

    /// Append to an item's warning log
    pub fn item_warning(&self, id: WorkId, message: impl Into<String>) {
        self.emit(Event::ItemWarning {
            id,
            message: message.into(),
        });
    }

    /// Report a non-fatal engine problem
    pub fn system_error(&self, code: SystemErrorCode, message: impl Into<String>) {
        self.emit(Event::SystemError {
            code: code.code(),
            message: message.into(),
        });
    }
}
