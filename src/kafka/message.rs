//! Inbound records and the dispatch-time message view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Owned copy of one record taken off the consumer
///
/// A record without a payload is the "nil record": it is counted and
/// skipped by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRecord {
    /// Source topic
    pub topic: String,
    /// Source partition
    pub partition: i32,
    /// Offset within the partition
    pub offset: i64,
    /// Record key, if any
    pub key: Option<Vec<u8>>,
    /// Record payload; `None` for a nil record
    pub payload: Option<Vec<u8>>,
}

impl InboundRecord {
    /// Copy a record out of an rdkafka message
    pub fn from_message<M: rdkafka::Message>(message: &M) -> Self {
        Self {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(<[u8]>::to_vec),
            payload: message.payload().map(<[u8]>::to_vec),
        }
    }

    /// Whether this is a nil record
    pub fn is_nil(&self) -> bool {
        self.payload.is_none()
    }

    /// Build the dispatch-time message, stamping `received_at`
    ///
    /// Returns `None` for a nil record.
    pub fn into_message(self, received_at: DateTime<Utc>) -> Option<Message> {
        let payload = self.payload?;
        Some(Message {
            partition: self.partition,
            offset: self.offset,
            topic: self.topic,
            value: String::from_utf8_lossy(&payload).into_owned(),
            payload,
            metadata: MessageMetadata { received_at },
        })
    }
}

/// Record as handed to a handling unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Source partition
    pub partition: i32,
    /// Offset within the partition
    pub offset: i64,
    /// Source topic
    pub topic: String,
    /// Payload as text
    ///
    /// Decoded with [`String::from_utf8_lossy`]: invalid sequences become
    /// U+FFFD, so this is for display and logging. Use
    /// [`Message::payload`] when the exact bytes matter.
    pub value: String,
    /// Payload exactly as received
    #[serde(skip)]
    pub payload: Vec<u8>,
    /// Dispatch metadata
    pub metadata: MessageMetadata,
}

/// Metadata assigned at dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    /// When the dispatcher took the record, not the broker timestamp
    pub received_at: DateTime<Utc>,
}
