//! Event sinks: where bus events land.

use std::sync::Arc;

use super::Event;
use crate::events::EventKind;
use crate::services::TaskManager;

/// Receives every event emitted on the bus. Sinks must not block; slow
/// consumers should hand off to their own channel.
pub trait EventSink: Send + Sync {
    fn handle(&self, event: &Event);
}

/// Logs events through `tracing` (the default sink).
#[derive(Debug, Default)]
pub struct StdOutSink;

impl EventSink for StdOutSink {
    fn handle(&self, event: &Event) {
        match &event.kind {
            EventKind::Error { message } => {
                tracing::error!(task = %event.task_id, %message, "workflow error")
            }
            EventKind::Cancelled => {
                tracing::warn!(task = %event.task_id, "workflow cancelled")
            }
            EventKind::Progress {
                stage,
                progress,
                message,
            } => tracing::info!(task = %event.task_id, %stage, progress, %message, "progress"),
            other => tracing::debug!(task = %event.task_id, kind = other.type_name(), "event"),
        }
    }
}

/// Forwards events into a flume channel, e.g. for a streaming consumer.
pub struct ChannelSink {
    tx: flume::Sender<Event>,
}

impl ChannelSink {
    pub fn new(tx: flume::Sender<Event>) -> Self {
        ChannelSink { tx }
    }
}

impl EventSink for ChannelSink {
    fn handle(&self, event: &Event) {
        // Receiver dropped just means nobody is streaming anymore.
        let _ = self.tx.send(event.clone());
    }
}

/// Bridges bus events to the external task manager contract.
pub struct TaskManagerSink {
    manager: Arc<dyn TaskManager>,
}

impl TaskManagerSink {
    pub fn new(manager: Arc<dyn TaskManager>) -> Self {
        TaskManagerSink { manager }
    }
}

impl EventSink for TaskManagerSink {
    fn handle(&self, event: &Event) {
        self.manager
            .send_event(&event.task_id, event.kind.type_name(), event.to_json());
    }
}
