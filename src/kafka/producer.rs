//! Asynchronous publisher factory.

use rdkafka::config::ClientConfig;
use rdkafka::producer::ThreadedProducer;
use tracing::info;

use super::client::ConnectPlan;
use super::context::ProducerEvents;
use super::ClientError;

/// The rdkafka producer type used by the session
pub type SentinelProducer = ThreadedProducer<ProducerEvents>;

/// librdkafka properties for the producer
///
/// Every in-sync replica must acknowledge, and each record is sent as soon
/// as it is queued.
pub fn producer_settings(plan: &ConnectPlan) -> Vec<(&'static str, String)> {
    let mut settings = vec![
        ("bootstrap.servers", plan.bootstrap_servers()),
        ("client.id", plan.identity.client_id().to_string()),
        ("acks", "all".to_string()),
        ("linger.ms", "0".to_string()),
        ("batch.num.messages", "1".to_string()),
    ];
    settings.extend(plan.transport.librdkafka_settings());
    settings
}

/// Create the producer
///
/// # Errors
///
/// Returns `ClientError::Kafka` when librdkafka rejects the configuration.
pub fn create_producer(
    plan: &ConnectPlan,
    context: ProducerEvents,
) -> Result<SentinelProducer, ClientError> {
    let mut config = ClientConfig::new();
    for (key, value) in producer_settings(plan) {
        config.set(key, value);
    }

    let producer: SentinelProducer = config.create_with_context(context)?;
    info!(client_id = %plan.identity.client_id(), "Producer created");
    Ok(producer)
}
