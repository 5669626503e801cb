//! # Event Bus
//!
//! Broadcast-based publish-subscribe hub modeling the host application's
//! event bus. The pipeline consumes the host's "generation finished" signal
//! and re-emits "message available" after a merge; it never calls other
//! components directly.
//!
//! Tokio's broadcast channel is used rather than an MPSC channel so that
//! multiple consumers (the pipeline, downstream parsers, UI) can observe the
//! same signal, with backpressure handled through the channel capacity.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

/// Signals exchanged over the host event bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, strum::Display, Default)]
pub enum EventType {
    /// The primary model finished producing a narrative reply.
    #[default]
    GenerationEnded,
    /// A transcript entry gained (or regained) parseable content; re-emitted
    /// by the result merger so downstream parsers reprocess the entry.
    MessageAvailable,
    /// Pipeline hooks were installed.
    PipelineEnabled,
    /// Pipeline hooks were torn down.
    PipelineDisabled,
    /// Extension escape hatch for host-specific signals.
    Custom(String),
}

/// Event payload values.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    String(String),
    Boolean(bool),
    Null,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Integer(value as i64)
    }
}

/// A discrete message on the bus: a type plus key-value parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Event {
    pub event_type: EventType,
    pub parameters: HashMap<String, Value>,
}

impl Event {
    pub fn generation_ended() -> Self {
        Self {
            event_type: EventType::GenerationEnded,
            ..Default::default()
        }
    }

    /// "Message available" for the entry at `index`, carrying the index so
    /// downstream parsers know which entry to reprocess.
    pub fn message_available(index: usize) -> Self {
        Self {
            event_type: EventType::MessageAvailable,
            parameters: {
                let mut params = HashMap::new();
                params.insert("index".to_string(), Value::from(index));
                params
            },
        }
    }

    pub fn entry_index(&self) -> Option<usize> {
        match self.parameters.get("index") {
            Some(Value::Integer(i)) if *i >= 0 => Some(*i as usize),
            _ => None,
        }
    }
}

/// Central message hub for the host's event-driven architecture.
///
/// Maintains a single broadcast channel; an internal receiver keeps the
/// channel alive while no consumer is subscribed, so `publish` before the
/// first `subscribe` does not fail.
pub struct EventBus {
    event_sender: broadcast::Sender<Event>,
    capacity: usize,
    _internal_receiver: broadcast::Receiver<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (event_sender, event_receiver) = broadcast::channel(capacity);
        Self {
            event_sender,
            capacity,
            _internal_receiver: event_receiver,
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.event_sender.subscribe())
    }

    /// Publishes an event to all subscribers.
    pub async fn publish(&self, event: Event) -> EventResult<()> {
        debug!("Publishing event: {:?}", event);
        self.event_sender
            .send(event)
            .map_err(|e| EventError::SendFailed {
                message: e.to_string(),
            })?;
        Ok(())
    }

    /// Publishes without awaiting, for use from synchronous contexts. Same
    /// semantics as [`publish`](Self::publish).
    pub fn sync_publish(&self, event: Event) -> EventResult<()> {
        debug!("Sync publishing event: {:?}", event);
        self.event_sender
            .send(event)
            .map_err(|e| EventError::SendFailed {
                message: e.to_string(),
            })?;
        Ok(())
    }

    pub fn queue_size(&self) -> usize {
        self.event_sender.len()
    }

    pub fn subscribers_size(&self) -> usize {
        self.event_sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

pub struct EventReceiver {
    pub receiver: broadcast::Receiver<Event>,
}

impl EventReceiver {
    pub fn new(receiver: broadcast::Receiver<Event>) -> Self {
        Self { receiver }
    }

    /// Receives the next event. On lag the receiver resubscribes and reports
    /// how many events were skipped; callers should call `recv` again
    /// promptly to avoid lagging further.
    pub async fn recv(&mut self) -> EventResult<Event> {
        match self.receiver.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                self.receiver = self.receiver.resubscribe();
                Err(EventError::Lagged { count: n })
            }
            Err(e) => Err(EventError::ReceiveFailed {
                message: e.to_string(),
            }),
        }
    }
}

#[derive(Error, Debug)]
pub enum EventError {
    #[error("Event send failed: {message}")]
    SendFailed { message: String },

    #[error("Event receive failed: {message}")]
    ReceiveFailed { message: String },

    #[error("Event receiver lagged, skipped {count} events")]
    Lagged { count: u64 },
}

pub type EventResult<T> = Result<T, EventError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initial_publish_success() {
        let bus = EventBus::new(16);
        assert!(bus.publish(Event::generation_ended()).await.is_ok());
    }

    #[tokio::test]
    async fn test_basic_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut event_rx = bus.subscribe();

        bus.publish(Event::generation_ended()).await.unwrap();

        let received = event_rx.recv().await.unwrap();
        assert_eq!(received.event_type, EventType::GenerationEnded);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(Event::message_available(3)).await.unwrap();

        let received1 = rx1.recv().await.unwrap();
        let received2 = rx2.recv().await.unwrap();

        assert_eq!(received1.event_type, EventType::MessageAvailable);
        assert_eq!(received2.entry_index(), Some(3));
    }

    #[tokio::test]
    async fn test_bus_introspection() {
        let bus = EventBus::new(16);
        assert_eq!(bus.capacity(), 16);
        // Only the internal keep-alive receiver exists before subscribe.
        assert_eq!(bus.subscribers_size(), 1);

        let _rx = bus.subscribe();
        assert_eq!(bus.subscribers_size(), 2);

        assert_eq!(bus.queue_size(), 0);
        bus.publish(Event::generation_ended()).await.unwrap();
        assert_eq!(bus.queue_size(), 1);
    }

    #[tokio::test]
    async fn test_sync_publish() {
        let bus = EventBus::new(16);
        let mut event_rx = bus.subscribe();

        bus.sync_publish(Event::message_available(0)).unwrap();

        let received = event_rx.recv().await.unwrap();
        assert_eq!(received.event_type, EventType::MessageAvailable);
        assert_eq!(received.entry_index(), Some(0));
    }
}
