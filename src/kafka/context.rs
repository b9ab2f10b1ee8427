//! rdkafka client contexts that forward callbacks into event channels.

use std::sync::Arc;

use rdkafka::client::ClientContext;
use rdkafka::config::RDKafkaLogLevel;
use rdkafka::consumer::{ConsumerContext, Rebalance};
use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::message::DeliveryResult;
use rdkafka::producer::ProducerContext;
use rdkafka::{Message as _, TopicPartitionList};
use tracing::{debug, error, info, warn};

use super::events::{Assignment, ClientEvent, EventSink, RebalanceKind};

fn forward_log(client: &'static str, level: RDKafkaLogLevel, facility: &str, message: &str) {
    match level {
        RDKafkaLogLevel::Emerg
        | RDKafkaLogLevel::Alert
        | RDKafkaLogLevel::Critical
        | RDKafkaLogLevel::Error => error!(client, facility, "{}", message),
        RDKafkaLogLevel::Warning => warn!(client, facility, "{}", message),
        RDKafkaLogLevel::Notice | RDKafkaLogLevel::Info => info!(client, facility, "{}", message),
        RDKafkaLogLevel::Debug => debug!(client, facility, "{}", message),
    }
}

fn assignment_of(list: &TopicPartitionList) -> Assignment {
    let mut assignment = Assignment::new();
    for elem in list.elements() {
        assignment
            .entry(elem.topic().to_string())
            .or_default()
            .push(elem.partition());
    }
    assignment
}

/// Consumer context: rebalances become notifications, client and commit
/// failures become consumer errors
pub struct ConsumerEvents {
    notifications: Arc<EventSink>,
    errors: Arc<EventSink>,
}

impl ConsumerEvents {
    /// Create a context emitting into the given sinks
    pub fn new(notifications: Arc<EventSink>, errors: Arc<EventSink>) -> Self {
        Self {
            notifications,
            errors,
        }
    }

    /// Report a consumer error
    pub fn report_error(&self, error: impl ToString) {
        self.errors.emit(ClientEvent::ConsumerError(error.to_string()));
    }

    fn rebalance_event(rebalance: &Rebalance<'_>) -> ClientEvent {
        match rebalance {
            Rebalance::Assign(list) => ClientEvent::Rebalance {
                kind: RebalanceKind::Assign,
                assignment: assignment_of(list),
            },
            Rebalance::Revoke(list) => ClientEvent::Rebalance {
                kind: RebalanceKind::Revoke,
                assignment: assignment_of(list),
            },
            Rebalance::Error(_) => ClientEvent::Rebalance {
                kind: RebalanceKind::Error,
                assignment: Assignment::new(),
            },
        }
    }
}

impl ClientContext for ConsumerEvents {
    fn log(&self, level: RDKafkaLogLevel, fac: &str, log_message: &str) {
        forward_log("consumer", level, fac, log_message);
    }

    fn error(&self, error: KafkaError, reason: &str) {
        self.report_error(format!("{error}: {reason}"));
    }
}

impl ConsumerContext for ConsumerEvents {
    fn pre_rebalance<'a>(&self, rebalance: &Rebalance<'a>) {
        if let Rebalance::Error(e) = rebalance {
            self.report_error(format!("rebalance failed: {e}"));
        }
        if let Rebalance::Revoke(_) | Rebalance::Error(_) = rebalance {
            self.notifications.emit(Self::rebalance_event(rebalance));
        }
    }

    fn post_rebalance<'a>(&self, rebalance: &Rebalance<'a>) {
        if let Rebalance::Assign(_) = rebalance {
            self.notifications.emit(Self::rebalance_event(rebalance));
        }
    }

    fn commit_callback(&self, result: KafkaResult<()>, _offsets: &TopicPartitionList) {
        if let Err(e) = result {
            self.report_error(format!("offset commit failed: {e}"));
        }
    }
}

/// Producer context: delivery reports become successes or producer errors
pub struct ProducerEvents {
    successes: Arc<EventSink>,
    errors: Arc<EventSink>,
}

impl ProducerEvents {
    /// Create a context emitting into the given sinks
    pub fn new(successes: Arc<EventSink>, errors: Arc<EventSink>) -> Self {
        Self { successes, errors }
    }

    /// Translate one delivery report into an event
    pub fn delivery_event(result: &DeliveryResult<'_>) -> ClientEvent {
        match result {
            Ok(message) => ClientEvent::Delivered {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            },
            Err((error, message)) => ClientEvent::ProducerError(format!(
                "delivery to {} failed: {}",
                message.topic(),
                error
            )),
        }
    }
}

impl ClientContext for ProducerEvents {
    fn log(&self, level: RDKafkaLogLevel, fac: &str, log_message: &str) {
        forward_log("producer", level, fac, log_message);
    }

    fn error(&self, error: KafkaError, reason: &str) {
        self.errors
            .emit(ClientEvent::ProducerError(format!("{error}: {reason}")));
    }
}

impl ProducerContext for ProducerEvents {
    type DeliveryOpaque = ();

    fn delivery(&self, delivery_result: &DeliveryResult<'_>, _delivery_opaque: Self::DeliveryOpaque) {
        let event = Self::delivery_event(delivery_result);
        match event {
            ClientEvent::Delivered { .. } => self.successes.emit(event),
            _ => self.errors.emit(event),
        };
    }
}
