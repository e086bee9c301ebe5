//! gRPC face (`kafka_gateway.v1.KafkaGatewayService`).
use std::{net::SocketAddr, sync::Arc};

use eyre::{Result, WrapErr};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{Code, Request, Response, Status, transport::Server};
use tracing::Instrument;

use crate::{
    adapters::tls::FaceTls,
    core::{
        error::{GatewayError, GatewayResult},
        model::{CreateTopicRequest, PublishRequest},
        service::GatewayService,
    },
    ports::face::Face,
    proto::{
        self,
        kafka_gateway_service_server::{KafkaGatewayService, KafkaGatewayServiceServer},
    },
    tracing_setup::create_rpc_span,
    utils::graceful_shutdown::ShutdownToken,
};

/// Map the shared error taxonomy onto gRPC status codes.
pub fn status_from_error(error: GatewayError) -> Status {
    let code = match &error {
        GatewayError::InvalidArgument(_) => Code::InvalidArgument,
        GatewayError::BrokerUnavailable(_) => Code::Unavailable,
        GatewayError::TopicNotFound(_) => Code::NotFound,
        GatewayError::TopicAlreadyExists(_) => Code::AlreadyExists,
        GatewayError::PublishRejected(_) => Code::FailedPrecondition,
        GatewayError::Internal(_) => Code::Internal,
    };
    Status::new(code, error.to_string())
}

/// Generated service trait implemented over [`GatewayService`].
pub struct RpcGateway {
    service: Arc<GatewayService>,
}

impl RpcGateway {
    pub fn new(service: Arc<GatewayService>) -> Self {
        Self { service }
    }

    async fn finish<T>(&self, method: &str, result: GatewayResult<T>) -> Result<Response<T>, Status> {
        let result = result.map(Response::new).map_err(status_from_error);
        let code = match &result {
            Ok(_) => Code::Ok,
            Err(status) => status.code(),
        };
        let code_label = format!("{code:?}");
        tracing::Span::current().record("rpc.code", code_label.as_str());
        if let Err(status) = &result {
            tracing::info!(method, code = ?code, message = status.message(), "RPC failed");
        }
        self.service
            .metrics()
            .record_rpc_request(method, &code_label)
            .await;
        result
    }
}

#[tonic::async_trait]
impl KafkaGatewayService for RpcGateway {
    async fn health_check(
        &self,
        _request: Request<()>,
    ) -> Result<Response<proto::HealthCheckResponse>, Status> {
        let span = create_rpc_span("HealthCheck");
        async {
            let report = self.service.health();
            self.finish(
                "HealthCheck",
                Ok(proto::HealthCheckResponse {
                    status: report.status().to_string(),
                }),
            )
            .await
        }
        .instrument(span)
        .await
    }

    async fn publish_message(
        &self,
        request: Request<proto::PublishMessageRequest>,
    ) -> Result<Response<proto::PublishMessageResponse>, Status> {
        let request = request.into_inner();
        let span = create_rpc_span("PublishMessage");
        async {
            let result = match request.message {
                None => Err(GatewayError::invalid("message is required")),
                Some(message) => {
                    let publish = PublishRequest {
                        key: message.key.map(String::into_bytes),
                        value: message.value.into_bytes(),
                    };
                    self.service
                        .publish(&request.topic, publish)
                        .await
                        .map(|result| proto::PublishMessageResponse {
                            status: "success".to_string(),
                            message: "Message published successfully".to_string(),
                            topic: request.topic.clone(),
                            partition: result.partition,
                            offset: result.offset,
                        })
                }
            };
            self.finish("PublishMessage", result).await
        }
        .instrument(span)
        .await
    }

    async fn list_topics(
        &self,
        _request: Request<()>,
    ) -> Result<Response<proto::ListTopicsResponse>, Status> {
        let span = create_rpc_span("ListTopics");
        async {
            let result = self
                .service
                .list_topics()
                .await
                .map(|topics| proto::ListTopicsResponse {
                    topics: topics.into_iter().collect(),
                });
            self.finish("ListTopics", result).await
        }
        .instrument(span)
        .await
    }

    async fn get_topic_partitions(
        &self,
        request: Request<proto::GetTopicPartitionsRequest>,
    ) -> Result<Response<proto::GetTopicPartitionsResponse>, Status> {
        let topic = request.into_inner().topic;
        let span = create_rpc_span("GetTopicPartitions");
        async {
            let result = self
                .service
                .describe_partitions(&topic)
                .await
                .map(|partitions| proto::GetTopicPartitionsResponse {
                    topic: topic.clone(),
                    partitions,
                });
            self.finish("GetTopicPartitions", result).await
        }
        .instrument(span)
        .await
    }

    async fn create_topic(
        &self,
        request: Request<proto::CreateTopicRequest>,
    ) -> Result<Response<proto::CreateTopicResponse>, Status> {
        let request = request.into_inner();
        let span = create_rpc_span("CreateTopic");
        async {
            let result = match request.config {
                None => Err(GatewayError::invalid("topic config is required")),
                Some(config) => self
                    .service
                    .create_topic(&request.topic, CreateTopicRequest {
                        num_partitions: i64::from(config.num_partitions),
                        replication_factor: i64::from(config.replication_factor),
                    })
                    .await
                    .map(|_| proto::CreateTopicResponse {
                        status: "success".to_string(),
                        message: "Topic created successfully".to_string(),
                        topic: request.topic.clone(),
                    }),
            };
            self.finish("CreateTopic", result).await
        }
        .instrument(span)
        .await
    }
}

/// The gRPC listener, bound and ready to serve.
pub struct RpcFace {
    listener: TcpListener,
    local_addr: SocketAddr,
    service: Arc<GatewayService>,
    tls: Option<FaceTls>,
}

impl RpcFace {
    pub async fn bind(
        addr: &str,
        service: Arc<GatewayService>,
        tls: Option<FaceTls>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .wrap_err_with(|| format!("Failed to bind RPC face to {addr}"))?;
        let local_addr = listener
            .local_addr()
            .wrap_err("Failed to get RPC face local address")?;

        Ok(Self {
            listener,
            local_addr,
            service,
            tls,
        })
    }
}

impl Face for RpcFace {
    fn name(&self) -> &'static str {
        "rpc"
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn serve(self, shutdown: ShutdownToken) -> Result<()> {
        let mut builder = Server::builder();
        match &self.tls {
            Some(tls) => {
                builder = builder
                    .tls_config(tls.rpc_server_config())
                    .wrap_err("Invalid RPC face TLS configuration")?;
                tracing::info!(addr = %self.local_addr, "RPC face listening with mutual TLS");
            }
            None => {
                tracing::warn!(addr = %self.local_addr, "RPC face listening without TLS");
            }
        }

        builder
            .add_service(KafkaGatewayServiceServer::new(RpcGateway::new(self.service)))
            .serve_with_incoming_shutdown(
                TcpListenerStream::new(self.listener),
                shutdown.wait_for_shutdown(),
            )
            .await
            .wrap_err("RPC face error")?;

        tracing::info!("RPC face stopped");
        Ok(())
    }
}
