//! Broker certificate verification.
//!
//! [`RootChainVerifier`] is the rustls hook: it accepts a server chain only
//! if it leads to one of the trusted roots, and ignores the server name.
//! [`CertificateVerifier`] uses it to dial each broker once, purely for
//! inspection, before any Kafka client is built.

use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::verify_server_cert_signed_by_trust_anchor;
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::ParsedCertificate;
use rustls::{DigitallySignedStruct, RootCertStore, SignatureScheme};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

use super::{TlsError, TlsResult, TransportConfig};
use crate::kafka::BrokerEndpoint;
use crate::metrics;

/// Server certificate verifier that checks chain validity only
#[derive(Debug)]
pub struct RootChainVerifier {
    roots: Arc<RootCertStore>,
    provider: Arc<CryptoProvider>,
}

impl RootChainVerifier {
    /// Create a verifier over the given trusted roots
    pub fn new(roots: Arc<RootCertStore>, provider: Arc<CryptoProvider>) -> Self {
        Self { roots, provider }
    }
}

impl ServerCertVerifier for RootChainVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        verify_leaf_at(&self.roots, end_entity, intermediates, now, &self.provider)?;
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Verify that `leaf` chains to one of `roots`, with no name check
///
/// # Errors
///
/// Returns the rustls error describing why the chain is not trusted.
pub fn verify_leaf(
    roots: &RootCertStore,
    leaf: &CertificateDer<'_>,
    intermediates: &[CertificateDer<'_>],
) -> Result<(), rustls::Error> {
    let provider = rustls::crypto::ring::default_provider();
    verify_leaf_at(roots, leaf, intermediates, UnixTime::now(), &provider)
}

fn verify_leaf_at(
    roots: &RootCertStore,
    leaf: &CertificateDer<'_>,
    intermediates: &[CertificateDer<'_>],
    now: UnixTime,
    provider: &CryptoProvider,
) -> Result<(), rustls::Error> {
    let parsed = ParsedCertificate::try_from(leaf)?;
    verify_server_cert_signed_by_trust_anchor(
        &parsed,
        roots,
        intermediates,
        now,
        provider.signature_verification_algorithms.all,
    )
}

/// Result of a successful broker verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedBroker {
    /// The broker that was dialed
    pub endpoint: BrokerEndpoint,
    /// SHA-256 fingerprint of the presented leaf, colon-separated hex
    pub fingerprint: String,
}

/// Dials brokers over TLS and checks their certificates
#[derive(Clone)]
pub struct CertificateVerifier {
    transport: TransportConfig,
    timeout: Duration,
}

impl CertificateVerifier {
    /// Create a verifier using the shared transport configuration
    pub fn new(transport: &TransportConfig, timeout: Duration) -> Self {
        Self {
            transport: transport.clone(),
            timeout,
        }
    }

    /// Verify every broker; the first failure is returned
    ///
    /// Brokers are dialed concurrently. Nothing is returned unless every
    /// broker passed.
    ///
    /// # Errors
    ///
    /// Returns the first `TlsError` encountered.
    pub async fn verify_all(&self, brokers: &[BrokerEndpoint]) -> TlsResult<Vec<VerifiedBroker>> {
        let verified =
            futures::future::try_join_all(brokers.iter().map(|broker| self.verify(broker)))
                .await?;
        info!(
            brokers = verified.len(),
            "All broker server certificates are valid"
        );
        Ok(verified)
    }

    /// Verify a single broker
    ///
    /// Opens a TCP connection, performs the TLS handshake with the
    /// root-chain verifier, re-checks the extracted leaf, and closes the
    /// connection. The connection is never used for data.
    ///
    /// # Errors
    ///
    /// Returns `TlsError::Untrusted` when the chain does not lead to a
    /// trusted root, `TlsError::Timeout` when the dial exceeds the
    /// configured timeout, and `TlsError::Connect` / `TlsError::Handshake`
    /// for transport failures.
    pub async fn verify(&self, broker: &BrokerEndpoint) -> TlsResult<VerifiedBroker> {
        let result = tokio::time::timeout(self.timeout, self.dial(broker))
            .await
            .unwrap_or_else(|_| {
                Err(TlsError::Timeout {
                    broker: broker.address(),
                    after: self.timeout,
                })
            });

        match &result {
            Ok(verified) => {
                metrics::record_verification("valid");
                info!(
                    broker = %broker,
                    fingerprint = %verified.fingerprint,
                    "Broker certificate verified"
                );
            }
            Err(e) => {
                metrics::record_verification("invalid");
                warn!(broker = %broker, error = %e, "Unable to verify broker certificate");
            }
        }
        result
    }

    async fn dial(&self, broker: &BrokerEndpoint) -> TlsResult<VerifiedBroker> {
        let address = broker.address();
        let server_name = ServerName::try_from(broker.host().to_string())
            .map_err(|e| TlsError::Config(format!("invalid server name: {e}")))?;

        let tcp = TcpStream::connect(&address)
            .await
            .map_err(|e| TlsError::Connect {
                broker: address.clone(),
                message: e.to_string(),
            })?;

        debug!(broker = %address, "initiating verification handshake");
        let connector = TlsConnector::from(self.transport.handshake_config());
        let mut stream = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| classify_handshake_error(&address, e))?;

        let (_, session) = stream.get_ref();
        let chain = session
            .peer_certificates()
            .filter(|certs| !certs.is_empty())
            .ok_or_else(|| TlsError::NoPeerCertificate(address.clone()))?;
        let (leaf, intermediates) = chain.split_first().ok_or_else(|| {
            TlsError::NoPeerCertificate(address.clone())
        })?;

        verify_leaf(self.transport.roots(), leaf, intermediates).map_err(|e| {
            TlsError::Untrusted {
                broker: address.clone(),
                reason: e.to_string(),
            }
        })?;
        let fingerprint = fingerprint(leaf);

        // Inspection only; the connection is discarded.
        if let Err(e) = stream.shutdown().await {
            debug!(broker = %address, error = %e, "verification connection shutdown failed");
        }

        Ok(VerifiedBroker {
            endpoint: broker.clone(),
            fingerprint,
        })
    }
}

fn classify_handshake_error(broker: &str, error: std::io::Error) -> TlsError {
    let rustls_error = error
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>());

    match rustls_error {
        Some(rustls::Error::InvalidCertificate(reason)) => TlsError::Untrusted {
            broker: broker.to_string(),
            reason: format!("{reason:?}"),
        },
        _ => TlsError::Handshake {
            broker: broker.to_string(),
            message: error.to_string(),
        },
    }
}

/// SHA-256 fingerprint in the familiar `AB:CD:...` form
pub fn fingerprint(cert: &CertificateDer<'_>) -> String {
    Sha256::digest(cert.as_ref())
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}
