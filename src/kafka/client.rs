//! The client aggregate and the connector seam.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rdkafka::consumer::Consumer;
use rdkafka::producer::{BaseRecord, Producer};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::consumer::{create_consumer, SentinelConsumer};
use super::context::{ConsumerEvents, ProducerEvents};
use super::events::{event_channels, ClientEvent, EventSinks, EventStreams};
use super::identity::{qualify, ClientIdentity};
use super::message::InboundRecord;
use super::producer::{create_producer, SentinelProducer};
use super::{BrokerEndpoint, ClientError};
use crate::config::Config;
use crate::tls::TransportConfig;

/// Everything needed to construct the clients, resolved once at startup
#[derive(Debug, Clone)]
pub struct ConnectPlan {
    /// Verified broker endpoints
    pub brokers: Vec<BrokerEndpoint>,
    /// Shared TLS transport
    pub transport: TransportConfig,
    /// Group name and client id
    pub identity: ClientIdentity,
    /// Prefix-qualified topic to consume
    pub topic: String,
    /// Automatic offset commit interval
    pub commit_interval: Duration,
    /// Capacity of the inbound record channel
    pub inbound_buffer: usize,
}

impl ConnectPlan {
    /// Resolve a plan from configuration and already-verified brokers
    pub fn new(
        config: &Config,
        brokers: Vec<BrokerEndpoint>,
        transport: TransportConfig,
        created_at: DateTime<Utc>,
    ) -> Self {
        let kafka = &config.kafka;
        Self {
            brokers,
            transport,
            identity: ClientIdentity::new(&kafka.prefix, &kafka.consumer_group, created_at),
            topic: qualify(&kafka.prefix, &kafka.topic),
            commit_interval: kafka.commit_interval(),
            inbound_buffer: config.dispatch.inbound_buffer,
        }
    }

    /// Comma-separated `host:port` list for `bootstrap.servers`
    pub fn bootstrap_servers(&self) -> String {
        self.brokers
            .iter()
            .map(BrokerEndpoint::address)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// A connected consumer/producer pair
///
/// Implementations must tolerate every method being called from any task.
/// Closing is performed by the shutdown coordinator, which guarantees each
/// close method runs at most once.
pub trait BrokerSession: Send + Sync + 'static {
    /// Start pumping inbound records into a bounded channel
    ///
    /// The channel closes once `cancel` fires or the consumer stops.
    fn messages(self: Arc<Self>, cancel: CancellationToken) -> mpsc::Receiver<InboundRecord>;

    /// Queue one record on the asynchronous producer
    ///
    /// The outcome arrives later on the producer success or error stream.
    fn publish(&self, topic: &str, key: Option<&[u8]>, payload: &[u8]) -> Result<(), ClientError>;

    /// Flush outstanding records and close the producer's event streams
    fn close_producer(&self, flush_timeout: Duration) -> Result<(), ClientError>;

    /// Leave the group and close the consumer's event streams
    fn close_consumer(&self) -> Result<(), ClientError>;
}

/// A freshly connected session and its event streams
pub struct Connected<S> {
    /// The client handles
    pub session: Arc<S>,
    /// Receiving halves of the session's event channels
    pub events: EventStreams,
}

/// Builds sessions from a resolved plan
pub trait Connector {
    /// Session type produced
    type Session: BrokerSession;

    /// Construct and connect the consumer and producer
    ///
    /// # Errors
    ///
    /// Returns `ClientError` when either client cannot be constructed.
    fn connect(&self, plan: &ConnectPlan) -> Result<Connected<Self::Session>, ClientError>;
}

/// rdkafka-backed connector
#[derive(Debug, Default, Clone, Copy)]
pub struct KafkaConnector;

impl Connector for KafkaConnector {
    type Session = KafkaSession;

    fn connect(&self, plan: &ConnectPlan) -> Result<Connected<KafkaSession>, ClientError> {
        let (sinks, events) = event_channels();

        let consumer = create_consumer(
            plan,
            ConsumerEvents::new(
                sinks.consumer_notifications.clone(),
                sinks.consumer_errors.clone(),
            ),
        )?;
        let producer = create_producer(
            plan,
            ProducerEvents::new(sinks.producer_successes.clone(), sinks.producer_errors.clone()),
        )?;

        info!(
            brokers = %plan.bootstrap_servers(),
            topic = %plan.topic,
            "Connected consumer and producer"
        );

        Ok(Connected {
            session: Arc::new(KafkaSession {
                consumer,
                producer,
                sinks,
                inbound_buffer: plan.inbound_buffer,
                producer_closed: AtomicBool::new(false),
                consumer_closed: AtomicBool::new(false),
            }),
            events,
        })
    }
}

/// One consumer handle and one producer handle sharing a transport
pub struct KafkaSession {
    consumer: SentinelConsumer,
    producer: SentinelProducer,
    sinks: EventSinks,
    inbound_buffer: usize,
    producer_closed: AtomicBool,
    consumer_closed: AtomicBool,
}

impl BrokerSession for KafkaSession {
    fn messages(self: Arc<Self>, cancel: CancellationToken) -> mpsc::Receiver<InboundRecord> {
        let (tx, rx) = mpsc::channel(self.inbound_buffer);

        tokio::spawn(async move {
            loop {
                let record = tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = self.consumer.recv() => match received {
                        Ok(message) => InboundRecord::from_message(&message),
                        Err(e) => {
                            self.sinks
                                .consumer_errors
                                .emit(ClientEvent::ConsumerError(e.to_string()));
                            continue;
                        }
                    },
                };

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = tx.send(record) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("Inbound record pump stopped");
        });

        rx
    }

    fn publish(&self, topic: &str, key: Option<&[u8]>, payload: &[u8]) -> Result<(), ClientError> {
        if self.producer_closed.load(Ordering::SeqCst) {
            return Err(ClientError::Closed("producer"));
        }

        let mut record = BaseRecord::<[u8], [u8]>::to(topic).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }
        self.producer
            .send(record)
            .map_err(|(e, _)| ClientError::Publish {
                topic: topic.to_string(),
                message: e.to_string(),
            })
    }

    fn close_producer(&self, flush_timeout: Duration) -> Result<(), ClientError> {
        if self.producer_closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let flushed = self.producer.flush(flush_timeout);
        self.sinks.close_producer();
        flushed?;
        Ok(())
    }

    fn close_consumer(&self) -> Result<(), ClientError> {
        if self.consumer_closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.consumer.unsubscribe();
        self.sinks.close_consumer();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka::consumer::consumer_settings;
    use crate::kafka::producer::producer_settings;
    use crate::test_utils::TestPki;
    use chrono::TimeZone;

    fn plan(prefix: &str) -> ConnectPlan {
        let mut config = Config::default();
        config.kafka.prefix = prefix.to_string();
        config.kafka.commit_interval_ms = 1000;

        ConnectPlan::new(
            &config,
            vec![
                BrokerEndpoint::new("broker-1", 9096),
                BrokerEndpoint::new("broker-2", 9096),
                BrokerEndpoint::new("broker-3", 9096),
            ],
            TestPki::new().transport(),
            Utc.with_ymd_and_hms(2024, 1, 15, 8, 30, 0).unwrap(),
        )
    }

    fn setting(settings: &[(&'static str, String)], key: &str) -> Option<String> {
        settings
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.clone())
    }

    #[test]
    fn test_plan_without_prefix() {
        let plan = plan("");
        assert_eq!(plan.topic, "order_events");
        assert_eq!(plan.identity.group(), "heroku-kafka-demo-go");
        assert_eq!(
            plan.identity.client_id(),
            "heroku-kafka-demo-go-20240115083000"
        );
        assert_eq!(
            plan.bootstrap_servers(),
            "broker-1:9096,broker-2:9096,broker-3:9096"
        );
    }

    #[test]
    fn test_plan_with_prefix() {
        let plan = plan("tenant-a.");
        assert_eq!(plan.topic, "tenant-a.order_events");
        assert_eq!(plan.identity.group(), "tenant-a.heroku-kafka-demo-go");
    }

    #[test]
    fn test_consumer_settings() {
        let settings = consumer_settings(&plan(""));

        assert_eq!(
            setting(&settings, "partition.assignment.strategy").as_deref(),
            Some("roundrobin")
        );
        assert_eq!(setting(&settings, "enable.auto.commit").as_deref(), Some("true"));
        assert_eq!(
            setting(&settings, "auto.commit.interval.ms").as_deref(),
            Some("1000")
        );
        assert_eq!(setting(&settings, "auto.offset.reset").as_deref(), Some("latest"));
        assert_eq!(
            setting(&settings, "group.id").as_deref(),
            Some("heroku-kafka-demo-go")
        );
        assert_eq!(setting(&settings, "security.protocol").as_deref(), Some("ssl"));
    }

    #[test]
    fn test_producer_settings() {
        let settings = producer_settings(&plan(""));

        assert_eq!(setting(&settings, "acks").as_deref(), Some("all"));
        assert_eq!(setting(&settings, "linger.ms").as_deref(), Some("0"));
        assert_eq!(setting(&settings, "batch.num.messages").as_deref(), Some("1"));
        assert_eq!(
            setting(&settings, "client.id").as_deref(),
            Some("heroku-kafka-demo-go-20240115083000")
        );
        assert_eq!(
            setting(&settings, "ssl.endpoint.identification.algorithm").as_deref(),
            Some("none")
        );
        assert!(setting(&settings, "group.id").is_none());
    }
}
