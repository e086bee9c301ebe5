//! Lock-guarded owner of the broker handles.
//!
//! [`BrokerClient`] holds the publisher and admin handles behind one
//! `tokio::sync::RwLock`. Every operation takes the shared side; `close` takes
//! the exclusive side, so it waits for in-flight calls and every call made
//! afterwards sees a closed client instead of a dangling handle.
use std::{collections::BTreeSet, sync::Arc};

use tokio::sync::RwLock;
use tokio_util::task::TaskTracker;

use crate::{
    config::models::{BrokerConfig, SecurityMode},
    core::{
        error::CloseError,
        model::{BrokerEndpointSet, NewMirrorRecord, OutboundMessage, PublishResult, TopicDetail},
        security::SecurityMaterial,
    },
    ports::{
        broker::{BrokerConnector, BrokerError, BrokerResult, ClusterAdmin, Publisher},
        mirror::MessageMirror,
    },
};

struct BrokerHandles {
    publisher: Box<dyn Publisher>,
    admin: Box<dyn ClusterAdmin>,
}

pub struct BrokerClient {
    endpoints: BrokerEndpointSet,
    security_mode: SecurityMode,
    /// `None` once closed
    handles: RwLock<Option<BrokerHandles>>,
    mirror: Option<Arc<dyn MessageMirror>>,
    mirror_writes: TaskTracker,
}

impl BrokerClient {
    /// Resolve security material from `config` and open both handles.
    pub async fn connect(
        config: &BrokerConfig,
        connector: &dyn BrokerConnector,
        mirror: Option<Arc<dyn MessageMirror>>,
    ) -> BrokerResult<Self> {
        let endpoints = BrokerEndpointSet::new(config.brokers.clone())
            .ok_or_else(|| BrokerError::Unavailable("no broker endpoints configured".into()))?;
        let security = SecurityMaterial::load(config).await?;
        Self::connect_with(endpoints, &security, connector, mirror).await
    }

    /// Open both handles with already-resolved security material. The
    /// publisher is opened first; if the admin handle then fails, the
    /// publisher is closed before the error is returned.
    pub async fn connect_with(
        endpoints: BrokerEndpointSet,
        security: &SecurityMaterial,
        connector: &dyn BrokerConnector,
        mirror: Option<Arc<dyn MessageMirror>>,
    ) -> BrokerResult<Self> {
        let publisher = connector.connect_publisher(&endpoints, security).await?;

        let admin = match connector.connect_admin(&endpoints, security).await {
            Ok(admin) => admin,
            Err(e) => {
                if let Err(close_err) = publisher.close().await {
                    tracing::warn!(
                        "Failed to close publisher after admin connect failure: {}",
                        close_err
                    );
                }
                return Err(e);
            }
        };

        tracing::info!(
            brokers = %endpoints,
            security_protocol = %security.mode(),
            mirror = mirror.is_some(),
            "Broker client connected"
        );

        Ok(Self {
            endpoints,
            security_mode: security.mode(),
            handles: RwLock::new(Some(BrokerHandles { publisher, admin })),
            mirror,
            mirror_writes: TaskTracker::new(),
        })
    }

    pub fn endpoints(&self) -> &BrokerEndpointSet {
        &self.endpoints
    }

    pub fn security_mode(&self) -> SecurityMode {
        self.security_mode
    }

    pub fn has_mirror(&self) -> bool {
        self.mirror.is_some()
    }

    pub fn mirror(&self) -> Option<&Arc<dyn MessageMirror>> {
        self.mirror.as_ref()
    }

    pub async fn is_closed(&self) -> bool {
        self.handles.read().await.is_none()
    }

    /// Publish one message and, on success, copy it to the mirror in the
    /// background. Mirror failures are logged and never returned.
    pub async fn publish(
        &self,
        topic: &str,
        key: Option<Vec<u8>>,
        value: Vec<u8>,
    ) -> BrokerResult<PublishResult> {
        if topic.is_empty() {
            return Err(BrokerError::InvalidRequest("topic is required".into()));
        }

        let guard = self.handles.read().await;
        let handles = guard.as_ref().ok_or_else(closed)?;

        let message = OutboundMessage {
            topic: topic.to_string(),
            key,
            value,
        };
        let result = handles.publisher.send(&message).await?;

        tracing::debug!(
            topic,
            partition = result.partition,
            offset = result.offset,
            "Message published"
        );

        if let Some(mirror) = &self.mirror {
            let mirror = Arc::clone(mirror);
            let record = NewMirrorRecord {
                topic: message.topic,
                key: message.key,
                value: message.value,
                partition: result.partition,
                offset: result.offset,
            };
            // Spawned while the read lock is held, so close() always sees it
            self.mirror_writes.spawn(async move {
                if let Err(e) = mirror.save(record).await {
                    tracing::warn!(
                        error = %e,
                        event = "MirrorWriteFailed",
                        "Failed to mirror published message"
                    );
                }
            });
        }

        Ok(result)
    }

    pub async fn list_topics(&self) -> BrokerResult<BTreeSet<String>> {
        let guard = self.handles.read().await;
        let handles = guard.as_ref().ok_or_else(closed)?;
        handles.admin.list_topics().await
    }

    /// Partition ids of `topic` in ascending order.
    pub async fn describe_partitions(&self, topic: &str) -> BrokerResult<Vec<i32>> {
        let guard = self.handles.read().await;
        let handles = guard.as_ref().ok_or_else(closed)?;

        let descriptors = handles.admin.describe_topics(&[topic.to_string()]).await?;
        let descriptor = descriptors
            .into_iter()
            .find(|d| d.name == topic)
            .ok_or_else(|| BrokerError::TopicNotFound(topic.to_string()))?;

        let mut partitions = descriptor.partitions;
        partitions.sort_unstable();
        Ok(partitions)
    }

    /// Values are forwarded as given; range checks belong to the caller.
    pub async fn create_topic(&self, topic: &str, detail: TopicDetail) -> BrokerResult<()> {
        let guard = self.handles.read().await;
        let handles = guard.as_ref().ok_or_else(closed)?;
        handles.admin.create_topic(topic, detail).await?;
        tracing::info!(
            topic,
            num_partitions = detail.num_partitions,
            replication_factor = detail.replication_factor,
            "Topic created"
        );
        Ok(())
    }

    /// Close publisher, admin, pending mirror writes and the mirror, in that
    /// order. Every step is attempted; the first failure is returned. A second
    /// call does nothing.
    pub async fn close(&self) -> Result<(), CloseError> {
        let Some(handles) = self.handles.write().await.take() else {
            tracing::debug!("Broker client already closed");
            return Ok(());
        };

        let mut first_error: Option<CloseError> = None;

        if let Err(e) = handles.publisher.close().await {
            tracing::error!("Failed to close publisher: {}", e);
            first_error.get_or_insert(e.into());
        }
        if let Err(e) = handles.admin.close().await {
            tracing::error!("Failed to close admin client: {}", e);
            first_error.get_or_insert(e.into());
        }

        self.mirror_writes.close();
        self.mirror_writes.wait().await;

        if let Some(mirror) = &self.mirror
            && let Err(e) = mirror.close().await
        {
            tracing::error!("Failed to close mirror: {}", e);
            first_error.get_or_insert(e.into());
        }

        tracing::info!(brokers = %self.endpoints, "Broker client closed");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for BrokerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerClient")
            .field("endpoints", &self.endpoints)
            .field("security_mode", &self.security_mode)
            .field("mirror", &self.mirror.is_some())
            .finish()
    }
}

fn closed() -> BrokerError {
    BrokerError::Unavailable("broker client is closed".into())
}
