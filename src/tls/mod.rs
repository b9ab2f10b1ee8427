//! TLS material, transport configuration and broker certificate verification.
//!
//! Startup runs through this module in three steps:
//!
//! 1. [`TlsMaterial::decode`] turns the at-rest material (base64 outside
//!    production) into parsed certificates and a private key.
//! 2. [`TransportConfig::build`] assembles the mutual-TLS handshake
//!    configuration shared by verification dials and the Kafka clients.
//! 3. [`CertificateVerifier::verify_all`] dials every broker and checks the
//!    presented leaf against the trusted roots. Any failure aborts startup.
//!
//! Hostname matching is not part of the trust decision: brokers are
//! addressed by whatever the cluster advertises, so the guarantee is
//! "the broker presents a chain to the trusted root", enforced both by
//! the verification dial and by librdkafka on the data connections.

pub mod material;
pub mod transport;
pub mod verifier;

use std::time::Duration;
use thiserror::Error;

pub use material::{MaterialEncoding, TlsMaterial};
pub use transport::TransportConfig;
pub use verifier::{verify_leaf, CertificateVerifier, RootChainVerifier, VerifiedBroker};

/// Errors from TLS material handling and broker verification
#[derive(Error, Debug)]
pub enum TlsError {
    /// Material field is not valid base64
    #[error("{field} is not valid base64")]
    Base64 {
        /// Configuration field name
        field: String,
    },

    /// Material field contained no certificates
    #[error("no certificates found in {0}")]
    NoCertificates(String),

    /// Material field contained no private key
    #[error("no private key found in {0}")]
    NoPrivateKey(String),

    /// Material field is malformed PEM or X.509
    #[error("invalid PEM in {field}: {message}")]
    Pem {
        /// Configuration field name
        field: String,
        /// Parser message
        message: String,
    },

    /// Handshake configuration could not be built
    #[error("TLS configuration error: {0}")]
    Config(String),

    /// TCP connection to the broker failed
    #[error("failed to connect to broker {broker}: {message}")]
    Connect {
        /// Broker address
        broker: String,
        /// Underlying error
        message: String,
    },

    /// TLS handshake failed for a reason other than certificate trust
    #[error("TLS handshake with broker {broker} failed: {message}")]
    Handshake {
        /// Broker address
        broker: String,
        /// Underlying error
        message: String,
    },

    /// Broker certificate does not chain to the trusted roots
    #[error("broker {broker} has an invalid certificate: {reason}")]
    Untrusted {
        /// Broker address
        broker: String,
        /// Verification failure
        reason: String,
    },

    /// Broker completed the handshake without presenting a certificate
    #[error("broker {0} presented no certificate")]
    NoPeerCertificate(String),

    /// Verification dial did not finish in time
    #[error("verification of broker {broker} timed out after {after:?}")]
    Timeout {
        /// Broker address
        broker: String,
        /// Configured timeout
        after: Duration,
    },
}

/// Result alias for TLS operations
pub type TlsResult<T> = std::result::Result<T, TlsError>;
