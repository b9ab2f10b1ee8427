//! Mutual-TLS transport configuration shared by every broker connection.

use std::sync::Arc;

use rustls::crypto::ring;
use rustls::ClientConfig;

use super::{RootChainVerifier, TlsError, TlsMaterial, TlsResult};

/// Immutable TLS transport configuration
///
/// Built once from decoded material. Cloning is cheap; every clone shares
/// the same parsed material and handshake configuration.
#[derive(Clone)]
pub struct TransportConfig {
    material: Arc<TlsMaterial>,
    handshake: Arc<ClientConfig>,
}

impl std::fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConfig")
            .field("material", &self.material)
            .finish_non_exhaustive()
    }
}

impl TransportConfig {
    /// Build the handshake configuration from decoded material
    ///
    /// The client presents its certificate and key, trusts only the
    /// configured roots, and does not match the server name.
    ///
    /// # Errors
    ///
    /// Returns `TlsError::Config` if the key does not match the
    /// certificate or the protocol configuration is rejected.
    pub fn build(material: TlsMaterial) -> TlsResult<Self> {
        let provider = Arc::new(ring::default_provider());
        let verifier = Arc::new(RootChainVerifier::new(
            Arc::new(material.roots().clone()),
            provider.clone(),
        ));

        let handshake = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| TlsError::Config(e.to_string()))?
            .dangerous()
            .with_custom_certificate_verifier(verifier)
            .with_client_auth_cert(material.client_chain().to_vec(), material.client_key())
            .map_err(|e| TlsError::Config(format!("client certificate rejected: {e}")))?;

        Ok(Self {
            material: Arc::new(material),
            handshake: Arc::new(handshake),
        })
    }

    /// Handshake configuration for verification dials
    pub fn handshake_config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.handshake)
    }

    /// Trusted root store
    pub fn roots(&self) -> &rustls::RootCertStore {
        self.material.roots()
    }

    /// Decoded material
    pub fn material(&self) -> &TlsMaterial {
        &self.material
    }

    /// Equivalent librdkafka client properties
    ///
    /// The Kafka clients get the same trust decision as the verification
    /// dial: chain validation against the configured roots, no endpoint
    /// identification.
    pub fn librdkafka_settings(&self) -> Vec<(&'static str, String)> {
        vec![
            ("security.protocol", "ssl".to_string()),
            ("ssl.ca.pem", self.material.trusted_pem().to_string()),
            ("ssl.certificate.pem", self.material.client_cert_pem().to_string()),
            ("ssl.key.pem", self.material.client_key_pem().to_string()),
            ("enable.ssl.certificate.verification", "true".to_string()),
            ("ssl.endpoint.identification.algorithm", "none".to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestPki;

    fn material() -> TlsMaterial {
        TestPki::new().material()
    }

    #[test]
    fn test_build_transport() {
        let transport = TransportConfig::build(material()).unwrap();
        assert_eq!(transport.roots().len(), 1);
        assert_eq!(transport.material().client_chain().len(), 1);
    }

    #[test]
    fn test_librdkafka_settings() {
        let transport = TransportConfig::build(material()).unwrap();
        let settings = transport.librdkafka_settings();
        let get = |key: &str| {
            settings
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
                .unwrap()
        };

        assert_eq!(get("security.protocol"), "ssl");
        assert_eq!(get("enable.ssl.certificate.verification"), "true");
        assert_eq!(get("ssl.endpoint.identification.algorithm"), "none");
        assert!(get("ssl.ca.pem").contains("BEGIN CERTIFICATE"));
        assert!(get("ssl.key.pem").contains("PRIVATE KEY"));
    }

    #[test]
    fn test_clones_share_configuration() {
        let transport = TransportConfig::build(material()).unwrap();
        let clone = transport.clone();
        assert!(Arc::ptr_eq(
            &transport.handshake_config(),
            &clone.handshake_config()
        ));
    }
}
