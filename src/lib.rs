//! Kafka Sentinel - certificate-gated Kafka consumer library
//!
//! Verifies every broker's TLS certificate against a trusted root before any
//! client connects, builds a mutually-authenticated consumer and producer,
//! then dispatches inbound records concurrently while supervising the
//! client error and notification streams.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `tls`: Material decoding, transport configuration and broker verification
//! - `kafka`: Broker endpoints, client identity, event channels and the rdkafka clients
//! - `bootstrap`: Verify-before-connect startup
//! - `dispatcher`: Concurrent, bounded message dispatch
//! - `supervisor`: Fan-in of error and notification streams
//! - `shutdown`: Exactly-once close of the client session
//! - `runtime`: The steady-state run loop and signal handling
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use kafka_sentinel::{bootstrap, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/sentinel.yaml", &Default::default())?;
//!     let cluster = bootstrap::verify_brokers(&config).await?;
//!     println!("{} brokers verified", cluster.verified.len());
//!     Ok(())
//! }
//! ```

pub mod bootstrap;
pub mod cli;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod kafka;
pub mod logging;
pub mod metrics;
pub mod runtime;
pub mod shutdown;
pub mod supervisor;
pub mod tls;

// Re-export commonly used types
pub use config::Config;
pub use dispatcher::{MessageDispatcher, MessageHandler, ReportingHandler};
pub use error::{Result, SentinelError};
pub use kafka::{BrokerSession, Connector, KafkaConnector, Message};
pub use runtime::{run_session, RunOutcome};
pub use shutdown::{LifecycleState, ShutdownCoordinator, ShutdownTrigger};

#[cfg(test)]
pub mod test_utils;
