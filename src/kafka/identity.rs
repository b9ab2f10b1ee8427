//! Topic, group and client naming.

use chrono::{DateTime, Utc};

/// Fixed-width numeric creation timestamp appended to client ids
const CLIENT_ID_TIMESTAMP: &str = "%Y%m%d%H%M%S";

/// Apply the deployment prefix to a topic or group name
///
/// The prefix is concatenated with no separator; an empty prefix leaves the
/// name unchanged.
pub fn qualify(prefix: &str, base: &str) -> String {
    let mut name = String::with_capacity(prefix.len() + base.len());
    name.push_str(prefix);
    name.push_str(base);
    name
}

/// Consumer-group name and client identifier of one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    group: String,
    client_id: String,
}

impl ClientIdentity {
    /// Derive the identity for an instance created at `created_at`
    pub fn new(prefix: &str, group: &str, created_at: DateTime<Utc>) -> Self {
        let group = qualify(prefix, group);
        let client_id = format!("{}-{}", group, created_at.format(CLIENT_ID_TIMESTAMP));
        Self { group, client_id }
    }

    /// Prefix-qualified consumer-group name
    pub fn group(&self) -> &str {
        &self.group
    }

    /// `<group>-<YYYYMMDDhhmmss>`
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}
