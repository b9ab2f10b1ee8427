//! Broker endpoint parsing.

use std::fmt;

use url::{Host, Url};

use super::ClientError;

/// One broker node, addressed by host and port
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrokerEndpoint {
    host: String,
    port: u16,
}

impl BrokerEndpoint {
    /// Create an endpoint from its parts
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or IP literal, without brackets
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, bracketing IPv6 literals
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address())
    }
}

/// Parse a comma-separated broker URL list
///
/// Each entry must be a URL with an explicit host and port, for example
/// `kafka+ssl://broker-1.internal:9096`. The scheme is not interpreted.
///
/// # Errors
///
/// Returns `ClientError::NoBrokers` for an empty list and
/// `ClientError::InvalidBrokerUrl` for any malformed entry.
pub fn parse_broker_urls(list: &str) -> Result<Vec<BrokerEndpoint>, ClientError> {
    if list.trim().is_empty() {
        return Err(ClientError::NoBrokers);
    }
    list.split(',').map(parse_one).collect()
}

fn parse_one(raw: &str) -> Result<BrokerEndpoint, ClientError> {
    let entry = raw.trim();
    let invalid = |reason: &str| ClientError::InvalidBrokerUrl {
        url: entry.to_string(),
        reason: reason.to_string(),
    };

    if entry.is_empty() {
        return Err(invalid("empty entry"));
    }

    let url = Url::parse(entry).map_err(|e| invalid(&e.to_string()))?;
    let host = match url.host() {
        Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        _ => return Err(invalid("missing host")),
    };
    let port = url.port().ok_or_else(|| invalid("missing port"))?;

    Ok(BrokerEndpoint::new(host, port))
}
