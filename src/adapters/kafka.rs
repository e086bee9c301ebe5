//! Broker connector backed by `rskafka`.
//!
//! The publisher and the admin handle each own a separate `rskafka` client.
//! The publisher chooses the partition itself (murmur2 of the key for keyed
//! messages, the same hash the Java client uses, round-robin otherwise) and
//! caches one partition client per `(topic, partition)`.
use std::{
    collections::{BTreeMap, BTreeSet},
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use rskafka::{
    client::{
        Client, ClientBuilder, Credentials, SaslConfig,
        error::{Error as ClientError, ProtocolError},
        partition::{Compression, PartitionClient, UnknownTopicHandling},
    },
    record::Record,
};

use crate::{
    adapters::tls::broker_client_config,
    config::models::{BrokerConfig, SaslMechanism},
    core::{
        model::{BrokerEndpointSet, OutboundMessage, PublishResult, TopicDescriptor, TopicDetail},
        security::SecurityMaterial,
    },
    ports::broker::{BrokerConnector, BrokerError, BrokerResult, ClusterAdmin, Publisher},
};

/// Call settings shared by every handle a connector creates.
#[derive(Debug, Clone)]
pub struct KafkaSettings {
    pub client_id: String,
    /// Upper bound for every broker round trip
    pub timeout: Duration,
    pub metadata_retries: u32,
    pub metadata_retry_backoff: Duration,
}

impl From<&BrokerConfig> for KafkaSettings {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            timeout: config.timeout(),
            metadata_retries: config.metadata_retries,
            metadata_retry_backoff: config.metadata_retry_backoff(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KafkaConnector {
    settings: KafkaSettings,
}

impl KafkaConnector {
    pub fn new(settings: KafkaSettings) -> Self {
        Self { settings }
    }

    async fn build_client(
        &self,
        endpoints: &BrokerEndpointSet,
        security: &SecurityMaterial,
    ) -> BrokerResult<Arc<Client>> {
        let mut builder =
            ClientBuilder::new(endpoints.to_vec()).client_id(self.settings.client_id.clone());

        if let Some(tls) = security.tls() {
            builder = builder.tls_config(broker_client_config(tls)?);
        }
        if let Some(sasl) = security.sasl() {
            let credentials = Credentials::new(sasl.username.clone(), sasl.password.clone());
            builder = builder.sasl_config(match sasl.mechanism {
                SaslMechanism::Plain => SaslConfig::Plain(credentials),
                SaslMechanism::ScramSha256 => SaslConfig::ScramSha256(credentials),
                SaslMechanism::ScramSha512 => SaslConfig::ScramSha512(credentials),
            });
        }

        let client = with_timeout(self.settings.timeout, "connect", builder.build())
            .await?
            .map_err(|e| BrokerError::Unavailable(format!("failed to connect to {endpoints}: {e}")))?;

        Ok(Arc::new(client))
    }
}

#[async_trait]
impl BrokerConnector for KafkaConnector {
    async fn connect_publisher(
        &self,
        endpoints: &BrokerEndpointSet,
        security: &SecurityMaterial,
    ) -> BrokerResult<Box<dyn Publisher>> {
        let client = self.build_client(endpoints, security).await?;
        tracing::debug!(brokers = %endpoints, "Kafka publisher connected");
        Ok(Box::new(KafkaPublisher {
            metadata: MetadataReader::new(client.clone(), self.settings.clone()),
            client,
            settings: self.settings.clone(),
            partition_clients: scc::HashMap::new(),
            next_partition: AtomicU32::new(0),
            closed: AtomicBool::new(false),
        }))
    }

    async fn connect_admin(
        &self,
        endpoints: &BrokerEndpointSet,
        security: &SecurityMaterial,
    ) -> BrokerResult<Box<dyn ClusterAdmin>> {
        let client = self.build_client(endpoints, security).await?;
        tracing::debug!(brokers = %endpoints, "Kafka admin client connected");
        Ok(Box::new(KafkaAdmin {
            metadata: MetadataReader::new(client.clone(), self.settings.clone()),
            client,
            settings: self.settings.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Topic metadata with bounded retries.
struct MetadataReader {
    client: Arc<Client>,
    settings: KafkaSettings,
}

impl MetadataReader {
    fn new(client: Arc<Client>, settings: KafkaSettings) -> Self {
        Self { client, settings }
    }

    /// Topic name to ascending partition ids.
    async fn topics(&self) -> BrokerResult<BTreeMap<String, Vec<i32>>> {
        let mut attempt = 0;
        loop {
            let result = with_timeout(self.settings.timeout, "list_topics", self.client.list_topics())
                .await
                .and_then(|r| r.map_err(map_client_error));

            match result {
                Ok(topics) => {
                    return Ok(topics
                        .into_iter()
                        .map(|t| (t.name, t.partitions.iter().copied().collect()))
                        .collect());
                }
                Err(BrokerError::Unavailable(msg)) if attempt < self.settings.metadata_retries => {
                    attempt += 1;
                    tracing::debug!(attempt, error = %msg, "Metadata request failed, retrying");
                    tokio::time::sleep(self.settings.metadata_retry_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Publisher over rskafka partition clients, one cached per topic/partition.
///
/// Every produce request waits for acknowledgement from all in-sync replicas
/// (`acks=all`). rskafka hard-wires this level and exposes no setting for it,
/// so there is no acks option in [`KafkaSettings`] or the broker config.
pub struct KafkaPublisher {
    client: Arc<Client>,
    metadata: MetadataReader,
    settings: KafkaSettings,
    partition_clients: scc::HashMap<(String, i32), Arc<PartitionClient>>,
    next_partition: AtomicU32,
    closed: AtomicBool,
}

impl KafkaPublisher {
    async fn choose_partition(&self, message: &OutboundMessage) -> BrokerResult<i32> {
        let topics = self.metadata.topics().await?;
        let partitions = topics
            .get(&message.topic)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| BrokerError::TopicNotFound(message.topic.clone()))?;

        let index = match &message.key {
            Some(key) => partition_for_key(key, partitions.len()),
            None => self.next_partition.fetch_add(1, Ordering::Relaxed) as usize % partitions.len(),
        };
        Ok(partitions[index])
    }

    async fn partition_client(&self, topic: &str, partition: i32) -> BrokerResult<Arc<PartitionClient>> {
        let key = (topic.to_string(), partition);
        if let Some(entry) = self.partition_clients.get_async(&key).await {
            return Ok(entry.get().clone());
        }

        let client = with_timeout(
            self.settings.timeout,
            "partition_client",
            self.client
                .partition_client(topic.to_string(), partition, UnknownTopicHandling::Error),
        )
        .await?
        .map_err(map_client_error)?;
        let client = Arc::new(client);

        let _ = self.partition_clients.insert_async(key, client.clone()).await;
        Ok(client)
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn send(&self, message: &OutboundMessage) -> BrokerResult<PublishResult> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Unavailable("publisher is closed".into()));
        }

        let partition = self.choose_partition(message).await?;
        let partition_client = self.partition_client(&message.topic, partition).await?;

        let record = Record {
            key: message.key.clone(),
            value: Some(message.value.clone()),
            headers: BTreeMap::new(),
            timestamp: Utc::now(),
        };

        let offsets = with_timeout(
            self.settings.timeout,
            "produce",
            partition_client.produce(vec![record], Compression::NoCompression),
        )
        .await?
        .map_err(|e| {
            let e = map_client_error(e);
            if matches!(e, BrokerError::TopicNotFound(_) | BrokerError::Unavailable(_)) {
                // Leadership may have moved; rebuild on next send
                self.partition_clients
                    .remove_sync(&(message.topic.clone(), partition));
            }
            e
        })?;

        let offset = offsets.first().copied().ok_or_else(|| {
            BrokerError::PublishRejected("broker returned no offset for the record".into())
        })?;

        Ok(PublishResult { partition, offset })
    }

    async fn close(&self) -> BrokerResult<()> {
        self.closed.store(true, Ordering::Release);
        self.partition_clients.clear_async().await;
        Ok(())
    }
}

pub struct KafkaAdmin {
    client: Arc<Client>,
    metadata: MetadataReader,
    settings: KafkaSettings,
    closed: AtomicBool,
}

impl KafkaAdmin {
    fn ensure_open(&self) -> BrokerResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Unavailable("admin client is closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterAdmin for KafkaAdmin {
    async fn list_topics(&self) -> BrokerResult<BTreeSet<String>> {
        self.ensure_open()?;
        Ok(self.metadata.topics().await?.into_keys().collect())
    }

    async fn describe_topics(&self, topics: &[String]) -> BrokerResult<Vec<TopicDescriptor>> {
        self.ensure_open()?;
        let known = self.metadata.topics().await?;
        Ok(topics
            .iter()
            .filter_map(|name| {
                known.get(name).map(|partitions| TopicDescriptor {
                    name: name.clone(),
                    partitions: partitions.clone(),
                })
            })
            .collect())
    }

    async fn create_topic(&self, topic: &str, detail: TopicDetail) -> BrokerResult<()> {
        self.ensure_open()?;
        let controller = self.client.controller_client().map_err(map_client_error)?;
        let timeout_ms = i32::try_from(self.settings.timeout.as_millis()).unwrap_or(i32::MAX);

        with_timeout(
            self.settings.timeout,
            "create_topic",
            controller.create_topic(
                topic.to_string(),
                detail.num_partitions,
                detail.replication_factor,
                timeout_ms,
            ),
        )
        .await?
        .map_err(|e| match map_client_error(e) {
            BrokerError::TopicAlreadyExists(_) => BrokerError::TopicAlreadyExists(topic.to_string()),
            other => other,
        })
    }

    async fn close(&self) -> BrokerResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    operation: &str,
    fut: impl Future<Output = T>,
) -> BrokerResult<T> {
    tokio::time::timeout(timeout, fut).await.map_err(|_| {
        BrokerError::Unavailable(format!("{operation} timed out after {timeout:?}"))
    })
}

fn map_client_error(error: ClientError) -> BrokerError {
    match &error {
        ClientError::ServerError { protocol_error, .. } => match protocol_error {
            ProtocolError::TopicAlreadyExists => BrokerError::TopicAlreadyExists(error.to_string()),
            ProtocolError::UnknownTopicOrPartition => BrokerError::TopicNotFound(error.to_string()),
            ProtocolError::NotEnoughReplicas
            | ProtocolError::NotEnoughReplicasAfterAppend
            | ProtocolError::MessageTooLarge
            | ProtocolError::RecordListTooLarge
            | ProtocolError::InvalidRecord
            | ProtocolError::PolicyViolation
            | ProtocolError::InvalidPartitions
            | ProtocolError::InvalidReplicationFactor
            | ProtocolError::InvalidTopicException
            | ProtocolError::TopicAuthorizationFailed => {
                BrokerError::PublishRejected(error.to_string())
            }
            _ => BrokerError::Unavailable(error.to_string()),
        },
        _ => BrokerError::Unavailable(error.to_string()),
    }
}

/// Index into the partition list for a keyed message.
pub fn partition_for_key(key: &[u8], num_partitions: usize) -> usize {
    (murmur2(key) & 0x7fff_ffff) as usize % num_partitions
}

/// Kafka's murmur2 variant (seed `0x9747b28c`).
pub fn murmur2(data: &[u8]) -> i32 {
    const SEED: u32 = 0x9747_b28c;
    const M: u32 = 0x5bd1_e995;
    const R: u32 = 24;

    let mut h = SEED ^ data.len() as u32;
    let chunks = data.chunks_exact(4);
    let tail = chunks.remainder();

    for chunk in chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h = h.wrapping_mul(M);
        h ^= k;
    }

    match tail.len() {
        3 => {
            h ^= u32::from(tail[2]) << 16;
            h ^= u32::from(tail[1]) << 8;
            h ^= u32::from(tail[0]);
            h = h.wrapping_mul(M);
        }
        2 => {
            h ^= u32::from(tail[1]) << 8;
            h ^= u32::from(tail[0]);
            h = h.wrapping_mul(M);
        }
        1 => {
            h ^= u32::from(tail[0]);
            h = h.wrapping_mul(M);
        }
        _ => {}
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;
    h as i32
}
