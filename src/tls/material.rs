//! Decoding of at-rest TLS material into parsed certificates and keys.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::RootCertStore;
use tracing::debug;

use super::{TlsError, TlsResult};
use crate::config::TlsMaterialConfig;

/// How the material is stored in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialEncoding {
    /// Multi-line PEM wrapped in base64 so it fits a single env line
    Base64,
    /// Raw PEM
    Pem,
}

impl MaterialEncoding {
    /// Production stores raw PEM; every other environment stores base64.
    pub fn for_environment(environment: &str) -> Self {
        if environment.eq_ignore_ascii_case("production") {
            Self::Pem
        } else {
            Self::Base64
        }
    }
}

/// Parsed, immutable TLS material
///
/// Keeps the PEM text as well as the parsed form: the verification dial
/// uses the parsed certificates, librdkafka takes the PEM strings.
pub struct TlsMaterial {
    trusted_pem: String,
    client_cert_pem: String,
    client_key_pem: String,
    roots: RootCertStore,
    client_chain: Vec<CertificateDer<'static>>,
    client_key: PrivateKeyDer<'static>,
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("roots", &self.roots.len())
            .field("client_chain", &self.client_chain.len())
            .field("client_key", &"<redacted>")
            .finish()
    }
}

impl TlsMaterial {
    /// Decode and parse the configured material
    ///
    /// # Errors
    ///
    /// Returns `TlsError::Base64` for undecodable fields, `TlsError::Pem`
    /// for malformed PEM or X.509, and `TlsError::NoCertificates` /
    /// `TlsError::NoPrivateKey` when a field holds nothing usable.
    pub fn decode(config: &TlsMaterialConfig, encoding: MaterialEncoding) -> TlsResult<Self> {
        let trusted_pem = unwrap_field("trusted_cert", &config.trusted_cert, encoding)?;
        let client_cert_pem = unwrap_field("client_cert", &config.client_cert, encoding)?;
        let client_key_pem = unwrap_field("client_cert_key", &config.client_cert_key, encoding)?;

        Self::from_pem(trusted_pem, client_cert_pem, client_key_pem)
    }

    /// Parse material that is already PEM
    ///
    /// # Errors
    ///
    /// See [`TlsMaterial::decode`].
    pub fn from_pem(
        trusted_pem: String,
        client_cert_pem: String,
        client_key_pem: String,
    ) -> TlsResult<Self> {
        let root_certs = parse_certificates("trusted_cert", &trusted_pem)?;
        let mut roots = RootCertStore::empty();
        for cert in root_certs {
            roots.add(cert).map_err(|e| TlsError::Pem {
                field: "trusted_cert".to_string(),
                message: e.to_string(),
            })?;
        }
        debug!(count = roots.len(), "loaded trusted root certificates");

        let client_chain = parse_certificates("client_cert", &client_cert_pem)?;
        if let Some(leaf) = client_chain.first() {
            rustls::server::ParsedCertificate::try_from(leaf).map_err(|e| TlsError::Pem {
                field: "client_cert".to_string(),
                message: e.to_string(),
            })?;
        }
        let client_key = parse_private_key("client_cert_key", &client_key_pem)?;

        Ok(Self {
            trusted_pem,
            client_cert_pem,
            client_key_pem,
            roots,
            client_chain,
            client_key,
        })
    }

    /// Trusted root store
    pub fn roots(&self) -> &RootCertStore {
        &self.roots
    }

    /// Client certificate chain, leaf first
    pub fn client_chain(&self) -> &[CertificateDer<'static>] {
        &self.client_chain
    }

    /// Client private key
    pub fn client_key(&self) -> PrivateKeyDer<'static> {
        self.client_key.clone_key()
    }

    /// Trusted root bundle as PEM
    pub fn trusted_pem(&self) -> &str {
        &self.trusted_pem
    }

    /// Client certificate as PEM
    pub fn client_cert_pem(&self) -> &str {
        &self.client_cert_pem
    }

    /// Client private key as PEM
    pub fn client_key_pem(&self) -> &str {
        &self.client_key_pem
    }
}

fn unwrap_field(field: &str, raw: &str, encoding: MaterialEncoding) -> TlsResult<String> {
    match encoding {
        MaterialEncoding::Pem => Ok(raw.to_string()),
        MaterialEncoding::Base64 => decode_base64(field, raw),
    }
}

/// Decode one base64 field into PEM text
///
/// Whitespace is ignored so values wrapped across lines still decode.
pub fn decode_base64(field: &str, raw: &str) -> TlsResult<String> {
    let compact: String = raw.split_whitespace().collect();
    let bytes = STANDARD.decode(compact.as_bytes()).map_err(|_| TlsError::Base64 {
        field: field.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|e| TlsError::Pem {
        field: field.to_string(),
        message: format!("decoded material is not UTF-8: {e}"),
    })
}

fn parse_certificates(field: &str, pem: &str) -> TlsResult<Vec<CertificateDer<'static>>> {
    let mut reader = pem.as_bytes();
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::Pem {
            field: field.to_string(),
            message: e.to_string(),
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates(field.to_string()));
    }
    Ok(certs)
}

fn parse_private_key(field: &str, pem: &str) -> TlsResult<PrivateKeyDer<'static>> {
    let mut reader = pem.as_bytes();
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| TlsError::Pem {
            field: field.to_string(),
            message: e.to_string(),
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(field.to_string()))
}
