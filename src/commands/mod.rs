/*!
Command handlers for the CLI

This module provides the handlers invoked by the CLI entrypoint:

- `run`: Verify brokers, connect, and consume until stopped
- `verify`: Verify every broker certificate and exit
- `publish`: Send one record and wait for its delivery report

Every handler goes through the same verify-before-connect startup in
`crate::bootstrap`.
*/

use crate::bootstrap;
use crate::config::Config;
use crate::error::Result;
use crate::kafka::KafkaConnector;
use anyhow::Context;
use std::sync::Arc;

// Run command handler
pub mod run {
    //! Long-running consumer.
    //!
    //! Dispatch runs in the foreground; the two supervision loops and the
    //! signal watcher run in the background until shutdown.

    use super::*;
    use crate::dispatcher::ReportingHandler;
    use crate::runtime::{run_session, shutdown_signal, SessionReport};

    /// Verify brokers, connect, and consume until a signal or stream end
    ///
    /// # Errors
    ///
    /// Returns an error if startup fails; steady-state errors are only
    /// reported.
    pub async fn run_consumer(config: Config) -> Result<SessionReport> {
        let (plan, connected) = bootstrap::connect(&config, &KafkaConnector)
            .await
            .context("Startup failed")?;
        tracing::info!(
            topic = %plan.topic,
            group_id = %plan.identity.group(),
            client_id = %plan.identity.client_id(),
            "Client connected"
        );

        let handler = Arc::new(ReportingHandler::new(config.logging.include_payload));
        Ok(run_session(connected, &config, handler, shutdown_signal()).await)
    }
}

// Verify command handler
pub mod verify {
    //! Certificate check without connecting any client.

    use super::*;
    use crate::tls::VerifiedBroker;

    /// Verify every configured broker and report the fingerprints
    ///
    /// # Errors
    ///
    /// Returns the first decoding, parsing or verification error.
    pub async fn verify_brokers(config: Config) -> Result<Vec<VerifiedBroker>> {
        let cluster = bootstrap::verify_brokers(&config)
            .await
            .context("Broker verification failed")?;

        for broker in &cluster.verified {
            println!("{}  {}", broker.endpoint, broker.fingerprint);
        }
        Ok(cluster.verified)
    }
}

// Publish command handler
pub mod publish {
    //! One-shot publish through the asynchronous producer.
    //!
    //! The record is queued, then the handler waits for the first event on
    //! the producer's success or error stream before closing the session.

    use super::*;
    use crate::kafka::{qualify, BrokerSession, ClientEvent, EventSource};
    use crate::shutdown::{ShutdownCoordinator, ShutdownTrigger};
    use anyhow::bail;
    use futures::stream::{select, StreamExt};
    use std::time::Duration;

    /// Where a published record landed
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct DeliveryReport {
        /// Destination topic
        pub topic: String,
        /// Partition assigned
        pub partition: i32,
        /// Offset assigned
        pub offset: i64,
    }

    /// Wait for the first delivery outcome on the producer streams
    ///
    /// # Errors
    ///
    /// Returns an error for a producer error, a timeout, or streams that
    /// close without reporting.
    pub async fn await_delivery(
        successes: EventSource,
        errors: EventSource,
        timeout: Duration,
    ) -> Result<DeliveryReport> {
        let mut outcomes = select(successes, errors);
        let event = tokio::time::timeout(timeout, outcomes.next())
            .await
            .with_context(|| format!("No delivery report within {:?}", timeout))?;

        match event {
            Some(ClientEvent::Delivered {
                topic,
                partition,
                offset,
                ..
            }) => Ok(DeliveryReport {
                topic,
                partition,
                offset,
            }),
            Some(ClientEvent::ProducerError(message)) => bail!("Delivery failed: {}", message),
            Some(other) => bail!("Unexpected producer event: {:?}", other),
            None => bail!("Producer closed before reporting delivery"),
        }
    }

    /// Verify brokers, connect, publish one record and wait for delivery
    ///
    /// `topic` is a base name; the configured prefix is applied to it.
    ///
    /// # Errors
    ///
    /// Returns an error if startup fails, the record cannot be queued, or
    /// the delivery report is negative or missing.
    pub async fn publish_record(
        config: Config,
        payload: String,
        key: Option<String>,
        topic: Option<String>,
    ) -> Result<DeliveryReport> {
        let topic = qualify(
            &config.kafka.prefix,
            topic.as_deref().unwrap_or(&config.kafka.topic),
        );
        let (_, connected) = bootstrap::connect(&config, &KafkaConnector)
            .await
            .context("Startup failed")?;

        let session = connected.session;
        let events = connected.events;
        let coordinator = ShutdownCoordinator::new(session.clone(), config.shutdown.flush_timeout());

        let queued = session.publish(&topic, key.as_deref().map(str::as_bytes), payload.as_bytes());
        let outcome = match queued {
            Ok(()) => {
                await_delivery(
                    events.producer_successes,
                    events.producer_errors,
                    config.shutdown.flush_timeout(),
                )
                .await
            }
            Err(e) => Err(e.into()),
        };

        coordinator.shutdown(ShutdownTrigger::Completed).await;
        let report = outcome?;
        tracing::info!(
            topic = %report.topic,
            partition = report.partition,
            offset = report.offset,
            "Record delivered"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::publish::{await_delivery, DeliveryReport};
    use crate::kafka::{ClientEvent, EventSink};
    use std::time::Duration;

    #[tokio::test]
    async fn test_await_delivery_success() {
        let (successes, successes_rx) = EventSink::channel("successes");
        let (_errors, errors_rx) = EventSink::channel("errors");
        successes.emit(ClientEvent::Delivered {
            topic: "order_events".to_string(),
            partition: 1,
            offset: 99,
            payload: b"{}".to_vec(),
        });

        let report = await_delivery(successes_rx, errors_rx, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(
            report,
            DeliveryReport {
                topic: "order_events".to_string(),
                partition: 1,
                offset: 99,
            }
        );
    }

    #[tokio::test]
    async fn test_await_delivery_error() {
        let (_successes, successes_rx) = EventSink::channel("successes");
        let (errors, errors_rx) = EventSink::channel("errors");
        errors.emit(ClientEvent::ProducerError("Local: Message timed out".to_string()));

        let result = await_delivery(successes_rx, errors_rx, Duration::from_secs(1)).await;
        assert!(result.unwrap_err().to_string().contains("Message timed out"));
    }

    #[tokio::test]
    async fn test_await_delivery_timeout() {
        let (_successes, successes_rx) = EventSink::channel("successes");
        let (_errors, errors_rx) = EventSink::channel("errors");

        let result = await_delivery(successes_rx, errors_rx, Duration::from_millis(10)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_await_delivery_closed_streams() {
        let (successes, successes_rx) = EventSink::channel("successes");
        let (errors, errors_rx) = EventSink::channel("errors");
        successes.close();
        errors.close();

        let result = await_delivery(successes_rx, errors_rx, Duration::from_secs(1)).await;
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("closed before reporting"));
    }
}
