//! Broker capability ports.
//!
//! The gateway never speaks the Kafka wire protocol itself. It reaches the
//! cluster through two handles produced by a [`BrokerConnector`]: a
//! [`Publisher`] that appends messages and a [`ClusterAdmin`] for metadata and
//! topic management.
use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::{
    model::{BrokerEndpointSet, OutboundMessage, PublishResult, TopicDescriptor, TopicDetail},
    security::SecurityMaterial,
};

/// Error type for broker operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BrokerError {
    /// No connection could be established or a call timed out
    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    TopicNotFound(String),

    #[error("{0}")]
    TopicAlreadyExists(String),

    /// The cluster refused the write
    #[error("{0}")]
    PublishRejected(String),

    /// The request cannot be sent as given
    #[error("{0}")]
    InvalidRequest(String),

    /// Certificates, keys or credentials could not be used
    #[error("invalid security material: {0}")]
    InvalidSecurityMaterial(String),
}

/// Result type alias for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Appends messages to topics.
#[async_trait]
pub trait Publisher: Send + Sync + 'static {
    /// Send one message and wait for the configured acknowledgement level.
    async fn send(&self, message: &OutboundMessage) -> BrokerResult<PublishResult>;

    /// Release the underlying connections.
    async fn close(&self) -> BrokerResult<()>;
}

/// Cluster metadata and topic management.
#[async_trait]
pub trait ClusterAdmin: Send + Sync + 'static {
    /// Every topic known to the cluster at call time.
    async fn list_topics(&self) -> BrokerResult<BTreeSet<String>>;

    /// Descriptors for the requested topics that exist. Unknown topics are
    /// simply absent from the result.
    async fn describe_topics(&self, topics: &[String]) -> BrokerResult<Vec<TopicDescriptor>>;

    async fn create_topic(&self, topic: &str, detail: TopicDetail) -> BrokerResult<()>;

    /// Release the underlying connections.
    async fn close(&self) -> BrokerResult<()>;
}

/// Factory for broker handles.
#[async_trait]
pub trait BrokerConnector: Send + Sync + 'static {
    async fn connect_publisher(
        &self,
        endpoints: &BrokerEndpointSet,
        security: &SecurityMaterial,
    ) -> BrokerResult<Box<dyn Publisher>>;

    async fn connect_admin(
        &self,
        endpoints: &BrokerEndpointSet,
        security: &SecurityMaterial,
    ) -> BrokerResult<Box<dyn ClusterAdmin>>;
}
