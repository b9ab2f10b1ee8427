//! Startup: decode material, verify every broker, then connect.
//!
//! Nothing here builds a client until every broker has passed
//! certificate verification.

use chrono::Utc;
use tracing::info;

use crate::config::Config;
use crate::error::SentinelError;
use crate::kafka::{parse_broker_urls, BrokerEndpoint, ConnectPlan, Connected, Connector};
use crate::tls::{CertificateVerifier, TlsMaterial, TransportConfig, VerifiedBroker};

/// Brokers that passed verification and the transport they were checked with
#[derive(Debug, Clone)]
pub struct VerifiedCluster {
    /// Broker endpoints in configuration order
    pub brokers: Vec<BrokerEndpoint>,
    /// Verification results, one per broker
    pub verified: Vec<VerifiedBroker>,
    /// Transport shared by the verification dials and the clients
    pub transport: TransportConfig,
}

/// Decode material, parse the broker list and verify every broker
///
/// # Errors
///
/// Returns the first configuration, material, URL or verification error.
pub async fn verify_brokers(config: &Config) -> Result<VerifiedCluster, SentinelError> {
    config.validate()?;

    let brokers = parse_broker_urls(&config.kafka.url)?;
    let material = TlsMaterial::decode(&config.kafka.tls, config.material_encoding())?;
    let transport = TransportConfig::build(material)?;

    info!(brokers = brokers.len(), "Verifying broker certificates");
    let verifier = CertificateVerifier::new(&transport, config.kafka.verify_timeout());
    let verified = verifier.verify_all(&brokers).await?;

    Ok(VerifiedCluster {
        brokers,
        verified,
        transport,
    })
}

/// Verify every broker and then construct the clients through `connector`
///
/// # Errors
///
/// Returns a verification error without calling `connector`, or the
/// connector's error if client construction fails.
pub async fn connect<C: Connector>(
    config: &Config,
    connector: &C,
) -> Result<(ConnectPlan, Connected<C::Session>), SentinelError> {
    let cluster = verify_brokers(config).await?;
    let plan = ConnectPlan::new(config, cluster.brokers, cluster.transport, Utc::now());
    let connected = connector.connect(&plan)?;
    Ok((plan, connected))
}
