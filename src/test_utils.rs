//! Test utilities for Kafka Sentinel
//!
//! Mints throwaway PKI with rcgen so unit tests can exercise TLS material,
//! transport and verification without fixtures on disk.

use rcgen::{BasicConstraints, Certificate, CertificateParams, IsCa, KeyPair};
use rustls::pki_types::CertificateDer;
use rustls::RootCertStore;

use crate::tls::{TlsMaterial, TransportConfig};

/// A CA plus a client certificate it signed
pub struct TestPki {
    ca: Certificate,
    ca_key: KeyPair,
    client: Certificate,
    client_key: KeyPair,
}

fn ca_params() -> CertificateParams {
    let mut params =
        CertificateParams::new(Vec::<String>::new()).expect("Failed to build CA params");
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params
}

impl TestPki {
    /// Generate a fresh self-signed CA and client certificate
    ///
    /// # Panics
    ///
    /// Panics if key or certificate generation fails
    pub fn new() -> Self {
        let ca_key = KeyPair::generate().expect("Failed to generate CA key");
        let ca = ca_params()
            .self_signed(&ca_key)
            .expect("Failed to self-sign CA");
        Self::with_ca(ca, ca_key)
    }

    fn with_ca(ca: Certificate, ca_key: KeyPair) -> Self {
        let client_key = KeyPair::generate().expect("Failed to generate client key");
        let client = CertificateParams::new(vec!["sentinel-client".to_string()])
            .expect("Failed to build client params")
            .signed_by(&client_key, &ca, &ca_key)
            .expect("Failed to sign client certificate");

        Self {
            ca,
            ca_key,
            client,
            client_key,
        }
    }

    /// A subordinate CA signed by this one, with its own client certificate
    pub fn intermediate(&self) -> Self {
        let key = KeyPair::generate().expect("Failed to generate intermediate key");
        let cert = ca_params()
            .signed_by(&key, &self.ca, &self.ca_key)
            .expect("Failed to sign intermediate CA");
        Self::with_ca(cert, key)
    }

    /// A self-signed leaf certificate for `host`, trusted by nobody
    pub fn self_signed_der(host: &str) -> CertificateDer<'static> {
        let key = KeyPair::generate().expect("Failed to generate leaf key");
        CertificateParams::new(vec![host.to_string()])
            .expect("Failed to build leaf params")
            .self_signed(&key)
            .expect("Failed to self-sign leaf")
            .der()
            .clone()
    }

    /// CA certificate as PEM
    pub fn ca_pem(&self) -> String {
        self.ca.pem()
    }

    /// CA certificate as DER
    pub fn ca_der(&self) -> CertificateDer<'static> {
        self.ca.der().clone()
    }

    /// A root store holding only this CA
    pub fn roots(&self) -> RootCertStore {
        let mut store = RootCertStore::empty();
        store
            .add(self.ca_der())
            .expect("Failed to add CA to root store");
        store
    }

    /// Client certificate as PEM
    pub fn client_cert_pem(&self) -> String {
        self.client.pem()
    }

    /// Client key as PEM
    pub fn client_key_pem(&self) -> String {
        self.client_key.serialize_pem()
    }

    fn issue(&self, host: &str) -> (Certificate, KeyPair) {
        let key = KeyPair::generate().expect("Failed to generate server key");
        let cert = CertificateParams::new(vec![host.to_string()])
            .expect("Failed to build server params")
            .signed_by(&key, &self.ca, &self.ca_key)
            .expect("Failed to sign server certificate");
        (cert, key)
    }

    /// A server certificate for `host` signed by this CA, as (cert, key) PEM
    pub fn server_pem(&self, host: &str) -> (String, String) {
        let (cert, key) = self.issue(host);
        (cert.pem(), key.serialize_pem())
    }

    /// A server certificate for `host` signed by this CA, as DER
    pub fn server_der(&self, host: &str) -> CertificateDer<'static> {
        self.issue(host).0.der().clone()
    }

    /// Parsed client material trusting this CA
    pub fn material(&self) -> TlsMaterial {
        TlsMaterial::from_pem(
            self.ca_pem(),
            self.client_cert_pem(),
            self.client_key_pem(),
        )
        .expect("Failed to parse generated material")
    }

    /// Transport configuration trusting this CA
    pub fn transport(&self) -> TransportConfig {
        TransportConfig::build(self.material()).expect("Failed to build transport")
    }
}

impl Default for TestPki {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pki_material_parses() {
        let pki = TestPki::new();
        let material = pki.material();
        assert_eq!(material.roots().len(), 1);
        assert!(pki.ca_pem().starts_with("-----BEGIN CERTIFICATE-----"));
    }

    #[test]
    fn test_server_pem_is_signed_by_ca() {
        let pki = TestPki::new();
        let (cert_pem, key_pem) = pki.server_pem("localhost");
        let mut reader = cert_pem.as_bytes();
        let cert = rustls_pemfile::certs(&mut reader)
            .next()
            .unwrap()
            .unwrap();

        assert!(key_pem.contains("PRIVATE KEY"));
        assert!(crate::tls::verify_leaf(pki.material().roots(), &cert, &[]).is_ok());
    }

    #[test]
    fn test_intermediate_chains_to_parent() {
        let root = TestPki::new();
        let intermediate = root.intermediate();
        let leaf = intermediate.server_der("broker-1.internal");

        let chain = [intermediate.ca_der()];
        assert!(crate::tls::verify_leaf(&root.roots(), &leaf, &chain).is_ok());
    }
}
