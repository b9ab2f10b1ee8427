//! Broker client construction and the event streams it produces.
//!
//! The rest of the crate talks to the cluster through the [`Connector`] and
//! [`BrokerSession`] traits. [`KafkaConnector`] is the rdkafka-backed
//! implementation: a `StreamConsumer` subscribed to one topic and a
//! `ThreadedProducer`, both bound to the verified TLS transport, with their
//! callbacks forwarded into [`EventStreams`].

pub mod client;
pub mod consumer;
pub mod context;
pub mod endpoint;
pub mod events;
pub mod identity;
pub mod message;
pub mod producer;

use rdkafka::error::KafkaError;
use thiserror::Error;

pub use client::{BrokerSession, ConnectPlan, Connected, Connector, KafkaConnector, KafkaSession};
pub use endpoint::{parse_broker_urls, BrokerEndpoint};
pub use events::{
    event_channels, Assignment, ClientEvent, EventKind, EventSink, EventSinks, EventSource,
    EventStreams, RebalanceKind,
};
pub use identity::{qualify, ClientIdentity};
pub use message::{InboundRecord, Message, MessageMetadata};

/// Errors from broker client construction and operation
#[derive(Error, Debug)]
pub enum ClientError {
    /// An entry in the broker URL list could not be parsed
    #[error("invalid broker URL '{url}': {reason}")]
    InvalidBrokerUrl {
        /// The offending entry
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// The broker URL list held no entries
    #[error("no broker URLs configured")]
    NoBrokers,

    /// librdkafka rejected the configuration or an operation
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),

    /// A record could not be queued for publishing
    #[error("failed to publish to {topic}: {message}")]
    Publish {
        /// Destination topic
        topic: String,
        /// Underlying error
        message: String,
    },

    /// The handle has already been closed
    #[error("{0} is closed")]
    Closed(&'static str),
}
