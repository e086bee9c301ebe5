// In-memory broker and mirror doubles shared by the integration tests.
#![allow(dead_code)]

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use kafka_gateway::{
    core::{
        BrokerClient, GatewayService, SecurityMaterial,
        model::{
            BrokerEndpointSet, MirrorRecord, NewMirrorRecord, OutboundMessage, PublishResult,
            TopicDescriptor, TopicDetail,
        },
    },
    metrics::GatewayMetrics,
    ports::{
        broker::{BrokerConnector, BrokerError, BrokerResult, ClusterAdmin, Publisher},
        mirror::{MessageMirror, MirrorError, MirrorResult},
    },
};

#[derive(Default)]
struct ClusterState {
    topics: BTreeMap<String, Vec<i32>>,
    next_offsets: HashMap<(String, i32), i64>,
    sent: Vec<OutboundMessage>,
    publisher_connects: usize,
    publisher_closes: usize,
    admin_closes: usize,
    fail_admin_connect: bool,
    fail_publisher_connect: bool,
}

/// A fake cluster: topics with partitions and per-partition offsets.
#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<ClusterState>>,
    send_delay: Option<Duration>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_topic(self, name: &str, partitions: &[i32]) -> Self {
        self.state
            .lock()
            .unwrap()
            .topics
            .insert(name.to_string(), partitions.to_vec());
        self
    }

    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = Some(delay);
        self
    }

    pub fn fail_admin_connect(self) -> Self {
        self.state.lock().unwrap().fail_admin_connect = true;
        self
    }

    pub fn fail_publisher_connect(self) -> Self {
        self.state.lock().unwrap().fail_publisher_connect = true;
        self
    }

    pub fn connector(&self) -> FakeConnector {
        FakeConnector {
            cluster: self.clone(),
        }
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn publisher_connects(&self) -> usize {
        self.state.lock().unwrap().publisher_connects
    }

    pub fn publisher_closes(&self) -> usize {
        self.state.lock().unwrap().publisher_closes
    }

    pub fn admin_closes(&self) -> usize {
        self.state.lock().unwrap().admin_closes
    }

    pub fn topic_partitions(&self, name: &str) -> Option<Vec<i32>> {
        self.state.lock().unwrap().topics.get(name).cloned()
    }
}

pub struct FakeConnector {
    cluster: FakeCluster,
}

#[async_trait]
impl BrokerConnector for FakeConnector {
    async fn connect_publisher(
        &self,
        _endpoints: &BrokerEndpointSet,
        _security: &SecurityMaterial,
    ) -> BrokerResult<Box<dyn Publisher>> {
        let mut state = self.cluster.state.lock().unwrap();
        if state.fail_publisher_connect {
            return Err(BrokerError::Unavailable("connection refused".into()));
        }
        state.publisher_connects += 1;
        Ok(Box::new(FakePublisher {
            cluster: self.cluster.clone(),
        }))
    }

    async fn connect_admin(
        &self,
        _endpoints: &BrokerEndpointSet,
        _security: &SecurityMaterial,
    ) -> BrokerResult<Box<dyn ClusterAdmin>> {
        if self.cluster.state.lock().unwrap().fail_admin_connect {
            return Err(BrokerError::Unavailable("controller unreachable".into()));
        }
        Ok(Box::new(FakeAdmin {
            cluster: self.cluster.clone(),
        }))
    }
}

struct FakePublisher {
    cluster: FakeCluster,
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn send(&self, message: &OutboundMessage) -> BrokerResult<PublishResult> {
        if let Some(delay) = self.cluster.send_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.cluster.state.lock().unwrap();
        let partitions = state
            .topics
            .get(&message.topic)
            .cloned()
            .ok_or_else(|| BrokerError::TopicNotFound(message.topic.clone()))?;
        let partition = match &message.key {
            Some(key) => partitions[key.len() % partitions.len()],
            None => partitions[0],
        };

        let next = state
            .next_offsets
            .entry((message.topic.clone(), partition))
            .or_insert(0);
        let offset = *next;
        *next += 1;
        state.sent.push(message.clone());

        Ok(PublishResult { partition, offset })
    }

    async fn close(&self) -> BrokerResult<()> {
        self.cluster.state.lock().unwrap().publisher_closes += 1;
        Ok(())
    }
}

struct FakeAdmin {
    cluster: FakeCluster,
}

#[async_trait]
impl ClusterAdmin for FakeAdmin {
    async fn list_topics(&self) -> BrokerResult<BTreeSet<String>> {
        Ok(self.cluster.state.lock().unwrap().topics.keys().cloned().collect())
    }

    async fn describe_topics(&self, topics: &[String]) -> BrokerResult<Vec<TopicDescriptor>> {
        let state = self.cluster.state.lock().unwrap();
        Ok(topics
            .iter()
            .filter_map(|name| {
                state.topics.get(name).map(|partitions| TopicDescriptor {
                    name: name.clone(),
                    partitions: partitions.clone(),
                })
            })
            .collect())
    }

    async fn create_topic(&self, topic: &str, detail: TopicDetail) -> BrokerResult<()> {
        let mut state = self.cluster.state.lock().unwrap();
        if state.topics.contains_key(topic) {
            return Err(BrokerError::TopicAlreadyExists(topic.to_string()));
        }
        // Reverse order so callers have to sort
        let partitions = (0..detail.num_partitions).rev().collect();
        state.topics.insert(topic.to_string(), partitions);
        Ok(())
    }

    async fn close(&self) -> BrokerResult<()> {
        self.cluster.state.lock().unwrap().admin_closes += 1;
        Ok(())
    }
}

#[derive(Default)]
struct MirrorState {
    records: Vec<MirrorRecord>,
    closed: bool,
    close_calls: usize,
}

/// Mirror kept in memory. `failing()` rejects every write.
#[derive(Clone, Default)]
pub struct MemoryMirror {
    state: Arc<Mutex<MirrorState>>,
    fail_saves: bool,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_saves: true,
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<MirrorRecord> {
        self.state.lock().unwrap().records.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().unwrap().close_calls
    }

    /// Wait until `n` records were written, for at most one second.
    pub async fn wait_for_records(&self, n: usize) {
        for _ in 0..100 {
            if self.records().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("mirror never reached {n} records");
    }
}

#[async_trait]
impl MessageMirror for MemoryMirror {
    async fn save(&self, record: NewMirrorRecord) -> MirrorResult<()> {
        if self.fail_saves {
            return Err(MirrorError::Storage("disk full".into()));
        }
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(MirrorError::Closed);
        }
        let id = state.records.len() as i64 + 1;
        state.records.push(MirrorRecord {
            id,
            topic: record.topic,
            key: record.key,
            value: record.value,
            partition: record.partition,
            offset: record.offset,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn query_by_topic(
        &self,
        topic: &str,
        limit: u32,
        offset: u64,
    ) -> MirrorResult<Vec<MirrorRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .records
            .iter()
            .rev()
            .filter(|r| r.topic == topic)
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count(&self) -> MirrorResult<u64> {
        Ok(self.state.lock().unwrap().records.len() as u64)
    }

    async fn count_by_topic(&self, topic: &str) -> MirrorResult<u64> {
        let state = self.state.lock().unwrap();
        Ok(state.records.iter().filter(|r| r.topic == topic).count() as u64)
    }

    async fn close(&self) -> MirrorResult<()> {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        state.close_calls += 1;
        Ok(())
    }
}

pub fn endpoints() -> BrokerEndpointSet {
    BrokerEndpointSet::new(vec!["localhost:9092".to_string()]).unwrap()
}

pub async fn connect(cluster: &FakeCluster, mirror: Option<MemoryMirror>) -> BrokerClient {
    let mirror = mirror.map(|m| Arc::new(m) as Arc<dyn MessageMirror>);
    BrokerClient::connect_with(
        endpoints(),
        &SecurityMaterial::Plaintext,
        &cluster.connector(),
        mirror,
    )
    .await
    .unwrap()
}

pub async fn service(cluster: &FakeCluster, mirror: Option<MemoryMirror>) -> Arc<GatewayService> {
    let client = connect(cluster, mirror).await;
    Arc::new(GatewayService::new(
        Some(Arc::new(client)),
        Arc::new(GatewayMetrics::local()),
    ))
}

pub fn service_without_broker() -> Arc<GatewayService> {
    Arc::new(GatewayService::new(None, Arc::new(GatewayMetrics::local())))
}
