//! Supervision of the client event streams.
//!
//! Both background loops are instances of [`fan_in`]: loop A merges the
//! consumer notifications with the producer delivery confirmations, loop B
//! merges the consumer and producer errors. Events are reported and
//! dropped; nothing here touches client state.

use futures::stream::{select_all, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::kafka::{ClientEvent, EventSource, EventStreams};
use crate::logging::payload_field;
use crate::metrics;

/// Merge `sources` and call `report` for every event until all of them end
///
/// Returns the number of events seen.
pub async fn fan_in<F>(label: &'static str, sources: Vec<EventSource>, mut report: F) -> u64
where
    F: FnMut(ClientEvent),
{
    let mut merged = select_all(sources);
    let mut seen = 0u64;

    while let Some(event) = merged.next().await {
        seen += 1;
        report(event);
    }

    debug!(loop_name = label, events = seen, "Event sources closed");
    seen
}

/// Reports client events to the log and metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct EventSupervisor {
    include_payload: bool,
}

/// Handles of the two supervision loops
#[derive(Debug)]
pub struct SupervisorHandles {
    /// Notifications and delivery confirmations
    pub notifications: JoinHandle<u64>,
    /// Consumer and producer errors
    pub errors: JoinHandle<u64>,
}

impl SupervisorHandles {
    /// Wait for both loops to end, returning (notifications, errors) seen
    pub async fn join(self) -> (u64, u64) {
        let notifications = self.notifications.await.unwrap_or_else(|e| {
            warn!(error = %e, "Notification loop ended abnormally");
            0
        });
        let errors = self.errors.await.unwrap_or_else(|e| {
            warn!(error = %e, "Error loop ended abnormally");
            0
        });
        (notifications, errors)
    }
}

impl EventSupervisor {
    /// Create a supervisor; payloads of delivered records are logged only
    /// when `include_payload` is set
    pub fn new(include_payload: bool) -> Self {
        Self { include_payload }
    }

    /// Spawn both loops over the session's event streams
    pub fn spawn(&self, events: EventStreams) -> SupervisorHandles {
        let (notification_sources, error_sources) = events.split();
        let supervisor = *self;

        SupervisorHandles {
            notifications: tokio::spawn(fan_in(
                "notifications",
                notification_sources,
                move |event| supervisor.report(&event),
            )),
            errors: tokio::spawn(fan_in("errors", error_sources, move |event| {
                supervisor.report(&event)
            })),
        }
    }

    /// Report one event
    pub fn report(&self, event: &ClientEvent) {
        metrics::record_event(event);

        match event {
            ClientEvent::Rebalance { kind, assignment } => {
                info!(rebalance = %kind, assignment = ?assignment, "Consumer group rebalanced");
            }
            ClientEvent::Delivered {
                topic,
                partition,
                offset,
                payload,
            } => {
                info!(
                    topic = %topic,
                    partition = partition,
                    offset = offset,
                    payload = payload_field(self.include_payload, payload).as_deref(),
                    "Produced record delivered"
                );
            }
            ClientEvent::ConsumerError(message) => {
                warn!(stream = "consumer", error = %message, "Consumer error");
            }
            ClientEvent::ProducerError(message) => {
                warn!(stream = "producer", error = %message, "Producer error");
            }
        }
    }
}
