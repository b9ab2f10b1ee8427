//! Consumer-group client factory.

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use tracing::info;

use super::client::ConnectPlan;
use super::context::ConsumerEvents;
use super::ClientError;

/// The rdkafka consumer type used by the session
pub type SentinelConsumer = StreamConsumer<ConsumerEvents>;

/// librdkafka properties for the consumer-group client
pub fn consumer_settings(plan: &ConnectPlan) -> Vec<(&'static str, String)> {
    let mut settings = vec![
        ("bootstrap.servers", plan.bootstrap_servers()),
        ("group.id", plan.identity.group().to_string()),
        ("client.id", plan.identity.client_id().to_string()),
        ("partition.assignment.strategy", "roundrobin".to_string()),
        ("enable.auto.commit", "true".to_string()),
        (
            "auto.commit.interval.ms",
            plan.commit_interval.as_millis().to_string(),
        ),
        ("auto.offset.reset", "latest".to_string()),
        ("enable.partition.eof", "false".to_string()),
    ];
    settings.extend(plan.transport.librdkafka_settings());
    settings
}

/// Create the consumer and subscribe it to the qualified topic
///
/// # Errors
///
/// Returns `ClientError::Kafka` when librdkafka rejects the configuration
/// or the subscription.
pub fn create_consumer(
    plan: &ConnectPlan,
    context: ConsumerEvents,
) -> Result<SentinelConsumer, ClientError> {
    let mut config = ClientConfig::new();
    for (key, value) in consumer_settings(plan) {
        config.set(key, value);
    }

    let consumer: SentinelConsumer = config.create_with_context(context)?;
    consumer.subscribe(&[plan.topic.as_str()])?;

    info!(
        group_id = %plan.identity.group(),
        client_id = %plan.identity.client_id(),
        topic = %plan.topic,
        "Consumer subscribed"
    );
    Ok(consumer)
}
