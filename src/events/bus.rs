//! The event bus: one flume channel drained by a listener task into the
//! registered sinks.

use std::sync::Arc;

use super::{Event, EventKind, EventSink};

/// Handle used by the driver and agents to emit events.
#[derive(Clone)]
pub struct EventEmitter {
    tx: flume::Sender<Event>,
    task_id: Arc<str>,
}

impl EventEmitter {
    pub fn emit(&self, kind: EventKind) {
        // A closed bus only means the run already finished tearing down.
        let _ = self.tx.send(Event::new(self.task_id.as_ref(), kind));
    }

    pub fn progress(&self, stage: impl Into<String>, progress: u8, message: impl Into<String>) {
        self.emit(EventKind::Progress {
            stage: stage.into(),
            progress,
            message: message.into(),
        });
    }

    pub fn log(&self, level: &str, message: impl Into<String>) {
        self.emit(EventKind::Log {
            level: level.into(),
            message: message.into(),
        });
    }

    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Rebind the emitter to another task id (used when a session is
    /// resumed under the same bus).
    #[must_use]
    pub fn for_task(&self, task_id: &str) -> Self {
        EventEmitter {
            tx: self.tx.clone(),
            task_id: Arc::from(task_id),
        }
    }
}

/// Subscription handle yielding events as they are emitted.
pub struct EventStream {
    rx: flume::Receiver<Event>,
}

impl EventStream {
    pub async fn next(&self) -> Option<Event> {
        self.rx.recv_async().await.ok()
    }

    pub fn try_iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.rx.try_iter()
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<Event> {
        self.rx.try_iter().collect()
    }
}

/// Fan-out bus. Events flow through an unbounded channel into a listener
/// task that hands each one to every sink in registration order.
pub struct EventBus {
    tx: flume::Sender<Event>,
    listener: tokio::task::JoinHandle<()>,
    subscriber_tx: flume::Sender<Event>,
    subscriber_rx: flume::Receiver<Event>,
}

impl EventBus {
    /// Build a bus over the given sinks and start its listener. Must be
    /// called from within a tokio runtime.
    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        let (tx, rx) = flume::unbounded::<Event>();
        let (subscriber_tx, subscriber_rx) = flume::unbounded::<Event>();
        let fan_tx = subscriber_tx.clone();
        let listener = tokio::spawn(async move {
            while let Ok(event) = rx.recv_async().await {
                for sink in &sinks {
                    sink.handle(&event);
                }
                let _ = fan_tx.send(event);
            }
        });
        EventBus {
            tx,
            listener,
            subscriber_tx,
            subscriber_rx,
        }
    }

    pub fn emitter(&self, task_id: &str) -> EventEmitter {
        EventEmitter {
            tx: self.tx.clone(),
            task_id: Arc::from(task_id),
        }
    }

    /// Subscribe to the full event stream. Multiple subscribers compete
    /// for events; use one subscriber per bus.
    pub fn subscribe(&self) -> EventStream {
        EventStream {
            rx: self.subscriber_rx.clone(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::with_sinks(vec![Box::new(super::StdOutSink)])
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.listener.abort();
        // Keep the subscriber half alive until the bus goes away.
        let _ = &self.subscriber_tx;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Collect {
        seen: Arc<Mutex<Vec<Event>>>,
    }

    impl EventSink for Collect {
        fn handle(&self, event: &Event) {
            self.seen.lock().unwrap().push(event.clone());
        }
    }

    #[tokio::test]
    async fn events_reach_sinks_and_subscribers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let bus = EventBus::with_sinks(vec![Box::new(Collect { seen: seen.clone() })]);
        let stream = bus.subscribe();
        let emitter = bus.emitter("task-9");
        emitter.progress("writer", 35, "writing");
        emitter.emit(EventKind::Complete);

        let first = stream.next().await.unwrap();
        let second = stream.next().await.unwrap();
        assert_eq!(first.kind.type_name(), "progress");
        assert!(second.kind.is_terminal());
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(first.task_id, "task-9");
    }
}
