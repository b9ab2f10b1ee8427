//! Error types for Kafka Sentinel
//!
//! Each subsystem owns a `thiserror` enum (`TlsError`, `ClientError`,
//! `ConfigError`). `SentinelError` folds them together for callers that
//! want one type, and command handlers use `anyhow` for context.

use thiserror::Error;

use crate::kafka::ClientError;
use crate::tls::TlsError;

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required value is absent from file, environment and CLI
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// A value is present but out of range or malformed
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// The configuration file could not be read
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        /// Path that was attempted
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for this schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Top-level error type for Kafka Sentinel operations
#[derive(Error, Debug)]
pub enum SentinelError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// TLS material, transport or certificate verification errors
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    /// Broker client construction or operation errors
    #[error("Client error: {0}")]
    Client(#[from] ClientError),
}

/// Result type alias used by command handlers and the binary
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_missing_display() {
        let error = ConfigError::Missing("KAFKA_URL".to_string());
        assert_eq!(
            error.to_string(),
            "Missing required configuration: KAFKA_URL"
        );
    }

    #[test]
    fn test_config_error_wraps_into_sentinel_error() {
        let error: SentinelError = ConfigError::Invalid("max_in_flight is 0".to_string()).into();
        assert!(matches!(error, SentinelError::Config(_)));
        assert_eq!(
            error.to_string(),
            "Configuration error: Invalid configuration: max_in_flight is 0"
        );
    }

    #[test]
    fn test_tls_error_conversion() {
        let error: SentinelError = TlsError::NoCertificates("trusted_cert".to_string()).into();
        assert!(matches!(error, SentinelError::Tls(_)));
    }

    #[test]
    fn test_client_error_conversion() {
        let error: SentinelError = ClientError::InvalidBrokerUrl {
            url: "::nope".to_string(),
            reason: "relative URL without a base".to_string(),
        }
        .into();
        assert!(matches!(error, SentinelError::Client(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SentinelError>();
    }
}
