//! Domain types shared by the broker client, the gateway service and both faces.
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Ordered, immutable set of `host:port` broker addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpointSet(Arc<[String]>);

impl BrokerEndpointSet {
    /// Returns `None` for an empty list.
    pub fn new(endpoints: Vec<String>) -> Option<Self> {
        if endpoints.is_empty() {
            None
        } else {
            Some(Self(endpoints.into()))
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.to_vec()
    }
}

impl std::fmt::Display for BrokerEndpointSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}

/// Where the broker placed a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishResult {
    pub partition: i32,
    pub offset: i64,
}

/// A message on its way to the broker.
///
/// `key: None` means no key is transmitted at all, which is not the same thing
/// as `Some(vec![])`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
}

/// Topic name plus its partition ids in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicDescriptor {
    pub name: String,
    pub partitions: Vec<i32>,
}

/// Broker-side parameters of a topic to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicDetail {
    pub num_partitions: i32,
    pub replication_factor: i16,
}

/// Publish parameters after wire decoding, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublishRequest {
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
}

/// Create-topic parameters after wire decoding, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateTopicRequest {
    pub num_partitions: i64,
    pub replication_factor: i64,
}

/// Paging parameters of a mirror read. Missing values take the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A message to append to the mirror. The mirror assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMirrorRecord {
    pub topic: String,
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
    pub partition: i32,
    pub offset: i64,
}

/// A message as stored by the mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRecord {
    pub id: i64,
    pub topic: String,
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
    pub partition: i32,
    pub offset: i64,
    /// Wall-clock time of the mirror write, not the broker timestamp
    pub timestamp: DateTime<Utc>,
}

/// One page of mirrored messages, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePage {
    pub records: Vec<MirrorRecord>,
    /// Number of messages mirrored for the topic
    pub total: u64,
}

/// Liveness view reported by both faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub broker_connected: bool,
    pub mirror_attached: bool,
}

impl HealthReport {
    pub fn status(&self) -> &'static str {
        // The gateway itself stays healthy while degraded
        "healthy"
    }
}
