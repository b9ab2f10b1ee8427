//! Client event channels.
//!
//! The consumer and producer report asynchronously through four unbounded
//! channels: consumer notifications, producer delivery successes, consumer
//! errors and producer errors. Producers of events hold an [`EventSink`];
//! the supervisor consumes the matching [`EventSource`]s. A source ends once
//! its sink is closed, which happens when the owning client is closed.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Coarse event classification used to route events to a supervisor loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Rebalance notifications and delivery confirmations
    Notification,
    /// Consumer and producer errors
    Error,
}

impl EventKind {
    /// Metric label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notification => "notification",
            Self::Error => "error",
        }
    }
}

/// Phase of a consumer-group rebalance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceKind {
    /// Partitions are being revoked from this member
    Revoke,
    /// Partitions were assigned to this member
    Assign,
    /// The rebalance failed
    Error,
}

impl fmt::Display for RebalanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Revoke => "revoke",
            Self::Assign => "assign",
            Self::Error => "error",
        })
    }
}

/// Partitions by topic
pub type Assignment = BTreeMap<String, Vec<i32>>;

/// Asynchronous event reported by the consumer or producer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Consumer-group membership changed
    Rebalance {
        /// Rebalance phase
        kind: RebalanceKind,
        /// Partitions involved, by topic
        assignment: Assignment,
    },
    /// A produced record was acknowledged by the cluster
    Delivered {
        /// Topic the record landed in
        topic: String,
        /// Partition the record landed in
        partition: i32,
        /// Offset assigned by the broker
        offset: i64,
        /// Record payload
        payload: Vec<u8>,
    },
    /// Consumer-side error
    ConsumerError(String),
    /// Producer-side error
    ProducerError(String),
}

impl ClientEvent {
    /// Classification of this event
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Rebalance { .. } | Self::Delivered { .. } => EventKind::Notification,
            Self::ConsumerError(_) | Self::ProducerError(_) => EventKind::Error,
        }
    }

    /// Which client produced the event
    pub fn stream(&self) -> &'static str {
        match self {
            Self::Rebalance { .. } | Self::ConsumerError(_) => "consumer",
            Self::Delivered { .. } | Self::ProducerError(_) => "producer",
        }
    }
}

/// Receiving half of one event channel
pub type EventSource = UnboundedReceiverStream<ClientEvent>;

/// Closable sending half of one event channel
pub struct EventSink {
    name: &'static str,
    sender: Mutex<Option<mpsc::UnboundedSender<ClientEvent>>>,
}

impl EventSink {
    /// Create a named channel, returning the sink and its source
    pub fn channel(name: &'static str) -> (Arc<Self>, EventSource) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(Self {
            name,
            sender: Mutex::new(Some(tx)),
        });
        (sink, UnboundedReceiverStream::new(rx))
    }

    /// Channel name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Send an event; returns false once the sink is closed or the source
    /// has been dropped
    pub fn emit(&self, event: ClientEvent) -> bool {
        let guard = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Close the sink so the source ends after draining
    pub fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }

    /// Whether [`EventSink::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Sending halves of all four event channels
#[derive(Debug, Clone)]
pub struct EventSinks {
    /// Consumer rebalance notifications
    pub consumer_notifications: Arc<EventSink>,
    /// Producer delivery confirmations
    pub producer_successes: Arc<EventSink>,
    /// Consumer errors
    pub consumer_errors: Arc<EventSink>,
    /// Producer errors
    pub producer_errors: Arc<EventSink>,
}

impl EventSinks {
    /// Close the consumer's channels
    pub fn close_consumer(&self) {
        self.consumer_notifications.close();
        self.consumer_errors.close();
    }

    /// Close the producer's channels
    pub fn close_producer(&self) {
        self.producer_successes.close();
        self.producer_errors.close();
    }
}

/// Receiving halves of all four event channels
#[derive(Debug)]
pub struct EventStreams {
    /// Consumer rebalance notifications
    pub consumer_notifications: EventSource,
    /// Producer delivery confirmations
    pub producer_successes: EventSource,
    /// Consumer errors
    pub consumer_errors: EventSource,
    /// Producer errors
    pub producer_errors: EventSource,
}

impl EventStreams {
    /// Split into the notification sources and the error sources
    pub fn split(self) -> (Vec<EventSource>, Vec<EventSource>) {
        (
            vec![self.consumer_notifications, self.producer_successes],
            vec![self.consumer_errors, self.producer_errors],
        )
    }
}

/// Create the four event channels
pub fn event_channels() -> (EventSinks, EventStreams) {
    let (consumer_notifications, consumer_notifications_rx) =
        EventSink::channel("consumer_notifications");
    let (producer_successes, producer_successes_rx) = EventSink::channel("producer_successes");
    let (consumer_errors, consumer_errors_rx) = EventSink::channel("consumer_errors");
    let (producer_errors, producer_errors_rx) = EventSink::channel("producer_errors");

    (
        EventSinks {
            consumer_notifications,
            producer_successes,
            consumer_errors,
            producer_errors,
        },
        EventStreams {
            consumer_notifications: consumer_notifications_rx,
            producer_successes: producer_successes_rx,
            consumer_errors: consumer_errors_rx,
            producer_errors: producer_errors_rx,
        },
    )
}
