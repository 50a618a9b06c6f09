//! # Event Bus
//!
//! Broadcast hub for the intents and lifecycle notifications the engine emits.
//! The runtime never navigates, opens a modal or shows a message by itself: it
//! publishes an [`Event`] and whatever hosts the engine subscribes and acts.
//!
//! Errors travel on a separate channel as [`ErrorEvent`]s so that a consumer
//! interested only in failures does not have to filter the main stream.
//!
//! Both channels keep an internal receiver, so publishing never fails merely
//! because nobody is listening yet. A slow subscriber that falls more than
//! `capacity` events behind gets [`EventError::Lagged`] and is resubscribed at
//! the head of the stream.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// What happened. Payload details live in [`Event::parameters`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, strum::Display)]
pub enum EventType {
    /// A named interaction event started dispatching.
    EventTriggered { event: String },
    StateUpdated { key: String },
    VariableUpdated { key: String },
    Navigate,
    ShowMessage,
    OpenModal,
    CloseModal,
    ApiCalled,
    RenderStarted { schema_id: String },
    RenderCached { schema_id: String },
    RenderCompleted { schema_id: String },
    CacheCleared,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_type: EventType,
    pub parameters: HashMap<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            parameters: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_parameter(mut self, key: &str, value: Value) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }

    /// A parameter, or `null` when absent.
    pub fn parameter(&self, key: &str) -> Value {
        self.parameters.get(key).cloned().unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum ErrorSeverity {
    #[default]
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ErrorEvent {
    pub error_type: String,
    pub message: String,
    pub severity: ErrorSeverity,
    pub parameters: HashMap<String, Value>,
}

impl ErrorEvent {
    pub fn new(error_type: &str, message: impl Into<String>, severity: ErrorSeverity) -> Self {
        Self {
            error_type: error_type.to_string(),
            message: message.into(),
            severity,
            parameters: HashMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: &str, value: Value) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }
}

#[derive(Debug)]
pub struct EventBus {
    event_sender: broadcast::Sender<Event>,
    error_sender: broadcast::Sender<ErrorEvent>,
    capacity: usize,
    _internal_receiver: broadcast::Receiver<Event>,
    _internal_error_receiver: broadcast::Receiver<ErrorEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (event_sender, event_receiver) = broadcast::channel(capacity);
        let (error_sender, error_receiver) = broadcast::channel(capacity);
        Self {
            event_sender,
            error_sender,
            capacity,
            _internal_receiver: event_receiver,
            _internal_error_receiver: error_receiver,
        }
    }

    pub fn subscribe(&self) -> (EventReceiver, ErrorReceiver) {
        let event_rx = self.event_sender.subscribe();
        let error_rx = self.error_sender.subscribe();
        (EventReceiver::new(event_rx), ErrorReceiver::new(error_rx))
    }

    pub async fn publish(&self, event: Event) -> EventResult<()> {
        self.sync_publish(event)
    }

    pub fn sync_publish(&self, event: Event) -> EventResult<()> {
        debug_event("Publishing", &event);
        self.event_sender
            .send(event)
            .map_err(|e| EventError::SendFailed {
                message: e.to_string(),
            })?;
        Ok(())
    }

    pub fn sync_publish_error(&self, error: ErrorEvent) -> EventResult<()> {
        debug!("Publishing error event: {:?}", error);
        self.error_sender
            .send(error)
            .map_err(|e| EventError::SendFailed {
                message: e.to_string(),
            })?;
        Ok(())
    }

    pub fn subscribers_size(&self) -> usize {
        // minus the internal receiver
        self.event_sender.receiver_count().saturating_sub(1)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

pub fn debug_event(prefix: &str, event: &Event) {
    match event.event_type {
        EventType::StateUpdated { .. } | EventType::VariableUpdated { .. } => {
            trace!("{} Event: {:?}", prefix, event)
        }
        _ => debug!("{} Event: {:?}", prefix, event),
    }
}

pub struct EventReceiver {
    pub receiver: broadcast::Receiver<Event>,
}

impl EventReceiver {
    pub fn new(receiver: broadcast::Receiver<Event>) -> Self {
        Self { receiver }
    }

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

    /// Non-blocking receive; `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

pub struct ErrorReceiver {
    pub receiver: broadcast::Receiver<ErrorEvent>,
}

impl ErrorReceiver {
    fn new(receiver: broadcast::Receiver<ErrorEvent>) -> Self {
        Self { receiver }
    }

    pub async fn recv(&mut self) -> EventResult<ErrorEvent> {
        self.receiver
            .recv()
            .await
            .map_err(|e| EventError::ReceiveFailed {
                message: e.to_string(),
            })
    }

    pub fn try_recv(&mut self) -> Option<ErrorEvent> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Error, Debug)]
pub enum EventError {
    #[error("Event Send failed: {message}")]
    SendFailed { message: String },

    #[error("Event Receive failed: {message}")]
    ReceiveFailed { message: String },

    #[error("Event lagged: {count}")]
    Lagged { count: u64 },
}

pub type EventResult<T> = Result<T, EventError>;
