//! The one business-logic object both faces translate to and from.
use std::{collections::BTreeSet, sync::Arc};

use crate::{
    core::{
        broker_client::BrokerClient,
        error::{GatewayError, GatewayResult},
        model::{
            CreateTopicRequest, HealthReport, MessagePage, MessageQuery, PublishRequest,
            PublishResult, TopicDetail,
        },
    },
    metrics::GatewayMetrics,
};

pub const DEFAULT_MESSAGE_LIMIT: i64 = 100;
pub const MAX_MESSAGE_LIMIT: i64 = 1000;

/// Validation plus dispatch to the [`BrokerClient`].
///
/// The service never owns the client's lifecycle: the supervisor builds it
/// before the faces start and closes it after they stop.
pub struct GatewayService {
    broker: Option<Arc<BrokerClient>>,
    metrics: Arc<GatewayMetrics>,
}

impl GatewayService {
    pub fn new(broker: Option<Arc<BrokerClient>>, metrics: Arc<GatewayMetrics>) -> Self {
        Self { broker, metrics }
    }

    pub fn broker_available(&self) -> bool {
        self.broker.is_some()
    }

    pub fn mirror_attached(&self) -> bool {
        self.broker.as_ref().is_some_and(|b| b.has_mirror())
    }

    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.metrics
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            broker_connected: self.broker_available(),
            mirror_attached: self.mirror_attached(),
        }
    }

    pub async fn publish(
        &self,
        topic: &str,
        request: PublishRequest,
    ) -> GatewayResult<PublishResult> {
        validate_topic(topic)?;
        if request.value.is_empty() {
            return Err(GatewayError::invalid("message value is required"));
        }

        let broker = self.broker()?;
        let result = broker.publish(topic, request.key, request.value).await;
        self.observe("publish", result).await
    }

    pub async fn list_topics(&self) -> GatewayResult<BTreeSet<String>> {
        let broker = self.broker()?;
        let result = broker.list_topics().await;
        self.observe("list_topics", result).await
    }

    pub async fn describe_partitions(&self, topic: &str) -> GatewayResult<Vec<i32>> {
        validate_topic(topic)?;
        let broker = self.broker()?;
        let result = broker.describe_partitions(topic).await;
        self.observe("describe_partitions", result).await
    }

    /// Range checks run before the broker is contacted.
    pub async fn create_topic(
        &self,
        topic: &str,
        request: CreateTopicRequest,
    ) -> GatewayResult<TopicDetail> {
        validate_topic(topic)?;

        let num_partitions = i32::try_from(request.num_partitions)
            .ok()
            .filter(|n| *n >= 1)
            .ok_or_else(|| {
                GatewayError::invalid(format!(
                    "numPartitions must be between 1 and {}, got {}",
                    i32::MAX,
                    request.num_partitions
                ))
            })?;
        let replication_factor = i16::try_from(request.replication_factor)
            .ok()
            .filter(|n| *n >= 1)
            .ok_or_else(|| {
                GatewayError::invalid(format!(
                    "replicationFactor must be between 1 and {}, got {}",
                    i16::MAX,
                    request.replication_factor
                ))
            })?;

        let detail = TopicDetail {
            num_partitions,
            replication_factor,
        };
        let broker = self.broker()?;
        let result = broker.create_topic(topic, detail).await;
        self.observe("create_topic", result).await?;
        Ok(detail)
    }

    /// Newest-first page of mirrored messages for `topic`.
    pub async fn list_messages(&self, topic: &str, query: MessageQuery) -> GatewayResult<MessagePage> {
        validate_topic(topic)?;

        let limit = query.limit.unwrap_or(DEFAULT_MESSAGE_LIMIT);
        if !(1..=MAX_MESSAGE_LIMIT).contains(&limit) {
            return Err(GatewayError::invalid(format!(
                "limit must be between 1 and {MAX_MESSAGE_LIMIT}"
            )));
        }
        let offset = query.offset.unwrap_or(0);
        if offset < 0 {
            return Err(GatewayError::invalid("offset must be non-negative"));
        }

        let mirror = self
            .broker
            .as_ref()
            .and_then(|b| b.mirror())
            .ok_or_else(|| GatewayError::Internal("message mirror is not attached".into()))?;

        // Both casts are range-checked above
        let records = mirror
            .query_by_topic(topic, limit as u32, offset as u64)
            .await?;
        let total = mirror.count_by_topic(topic).await?;

        Ok(MessagePage { records, total })
    }

    fn broker(&self) -> GatewayResult<&Arc<BrokerClient>> {
        self.broker
            .as_ref()
            .ok_or_else(|| GatewayError::BrokerUnavailable("broker client not available".into()))
    }

    async fn observe<T>(
        &self,
        operation: &str,
        result: Result<T, crate::ports::broker::BrokerError>,
    ) -> GatewayResult<T> {
        let result = result.map_err(GatewayError::from);
        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        self.metrics.record_broker_operation(operation, outcome).await;
        if let Err(e) = &result {
            tracing::warn!(operation, error = %e, "Broker operation failed");
        }
        result
    }
}

fn validate_topic(topic: &str) -> GatewayResult<()> {
    if topic.trim().is_empty() {
        return Err(GatewayError::invalid("topic is required"));
    }
    Ok(())
}
