//! Ordered event delivery to observers.

use lc_protocol::ipc::Event;
use tokio::sync::mpsc;

/// Cloneable emitter for core events.
///
/// All clones feed the same channel, so events reach the observer in the
/// order they were emitted. Emitting never blocks and never fails: events
/// sent after the receiver is dropped are discarded.
#[derive(Clone, Debug, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<Event>>,
}

impl EventSink {
    /// Create a sink that forwards to `tx`.
    pub fn new(tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Create a sink paired with its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Create a sink that drops every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: Event) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (sink, mut rx) = EventSink::channel();
        let clone = sink.clone();

        sink.emit(Event::ContextCleared {
            source_id: "first".to_string(),
        });
        clone.emit(Event::ContextCleared {
            source_id: "second".to_string(),
        });

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(matches!(first, Event::ContextCleared { source_id } if source_id == "first"));
        assert!(matches!(second, Event::ContextCleared { source_id } if source_id == "second"));
    }

    #[test]
    fn test_disabled_and_closed_sinks_do_not_panic() {
        EventSink::disabled().emit(Event::ContextCleared {
            source_id: "x".to_string(),
        });

        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.emit(Event::ContextCleared {
            source_id: "x".to_string(),
        });
    }
}
