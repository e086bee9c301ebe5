//! HTTP/JSON face.
//!
//! A thin axum adapter over [`GatewayService`]. Broker routes are only
//! registered when a broker client exists, and the message listing route only
//! when a mirror is attached as well; `/health` and `/metrics` are always
//! served.
use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    serve::Listener,
};
use chrono::{DateTime, Utc};
use eyre::{Result, WrapErr};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
};
use tower_http::trace::TraceLayer;

use crate::{
    adapters::{
        middleware::{
            bearer_auth_middleware, cors_middleware, observe_request_middleware,
            security_headers_middleware,
        },
        tls::FaceTls,
    },
    config::models::AuthConfig,
    core::{
        error::GatewayError,
        model::{CreateTopicRequest, MessageQuery, MirrorRecord, PublishRequest},
        service::GatewayService,
    },
    ports::face::Face,
    utils::graceful_shutdown::ShutdownToken,
};

#[derive(Debug, Deserialize)]
pub struct PublishBody {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTopicBody {
    pub num_partitions: i64,
    pub replication_factor: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessagesParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    broker_connected: bool,
    mirror_attached: bool,
}

#[derive(Debug, Serialize)]
struct PublishResponse {
    status: &'static str,
    message: &'static str,
    topic: String,
    partition: i32,
    offset: i64,
}

#[derive(Debug, Serialize)]
struct TopicsResponse {
    topics: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PartitionsResponse {
    topic: String,
    partitions: Vec<i32>,
}

#[derive(Debug, Serialize)]
struct CreateTopicResponse {
    status: &'static str,
    message: &'static str,
    topic: String,
}

#[derive(Debug, Serialize)]
struct MessagesResponse {
    topic: String,
    count: usize,
    total: u64,
    messages: Vec<MessageView>,
}

#[derive(Debug, Serialize)]
struct MessageView {
    id: i64,
    topic: String,
    key: Option<String>,
    value: String,
    partition: i32,
    offset: i64,
    timestamp: DateTime<Utc>,
}

impl From<MirrorRecord> for MessageView {
    fn from(record: MirrorRecord) -> Self {
        Self {
            id: record.id,
            topic: record.topic,
            key: record
                .key
                .map(|k| String::from_utf8_lossy(&k).into_owned()),
            value: String::from_utf8_lossy(&record.value).into_owned(),
            partition: record.partition,
            offset: record.offset,
            timestamp: record.timestamp,
        }
    }
}

/// JSON error body `{"error": "..."}` with the face's status mapping.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(error: GatewayError) -> Self {
        let status = if error.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Build the router for the current degradation state of `service`.
pub fn router(service: Arc<GatewayService>, auth: &AuthConfig) -> Router {
    let metrics = service.metrics().clone();

    let mut router = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_snapshot));

    if service.broker_available() {
        router = router
            .route("/api/v1/publish/{topic}", post(publish))
            .route("/api/v1/topics", get(list_topics))
            .route("/api/v1/topics/{topic}/partitions", get(topic_partitions))
            .route("/api/v1/topics/{topic}", post(create_topic));

        if service.mirror_attached() {
            router = router.route("/api/v1/messages/{topic}", get(list_messages));
        }
    } else {
        tracing::warn!("Broker client not available, broker routes are not registered");
    }

    let mut router = router
        .with_state(service)
        .route_layer(middleware::from_fn_with_state(
            metrics,
            observe_request_middleware,
        ));

    if auth.enabled {
        let secret: Arc<str> = Arc::from(auth.secret.as_str());
        router = router.layer(middleware::from_fn_with_state(secret, bearer_auth_middleware));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(cors_middleware))
}

async fn health(State(service): State<Arc<GatewayService>>) -> Json<HealthResponse> {
    let report = service.health();
    Json(HealthResponse {
        status: report.status(),
        broker_connected: report.broker_connected,
        mirror_attached: report.mirror_attached,
    })
}

async fn metrics_snapshot(State(service): State<Arc<GatewayService>>) -> impl IntoResponse {
    Json(serde_json::json!({ "counters": service.metrics().snapshot() }))
}

async fn publish(
    State(service): State<Arc<GatewayService>>,
    Path(topic): Path<String>,
    body: Result<Json<PublishBody>, JsonRejection>,
) -> ApiResult<Json<PublishResponse>> {
    let Json(body) = body?;
    let request = PublishRequest {
        key: body.key.map(String::into_bytes),
        value: body.value.map(String::into_bytes).unwrap_or_default(),
    };

    let result = service.publish(&topic, request).await?;
    Ok(Json(PublishResponse {
        status: "success",
        message: "Message published successfully",
        topic,
        partition: result.partition,
        offset: result.offset,
    }))
}

async fn list_topics(State(service): State<Arc<GatewayService>>) -> ApiResult<Json<TopicsResponse>> {
    let topics = service.list_topics().await?;
    Ok(Json(TopicsResponse {
        topics: topics.into_iter().collect(),
    }))
}

async fn topic_partitions(
    State(service): State<Arc<GatewayService>>,
    Path(topic): Path<String>,
) -> ApiResult<Json<PartitionsResponse>> {
    let partitions = service.describe_partitions(&topic).await?;
    Ok(Json(PartitionsResponse { topic, partitions }))
}

async fn create_topic(
    State(service): State<Arc<GatewayService>>,
    Path(topic): Path<String>,
    body: Result<Json<CreateTopicBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreateTopicResponse>)> {
    let Json(body) = body?;
    service
        .create_topic(&topic, CreateTopicRequest {
            num_partitions: body.num_partitions,
            replication_factor: body.replication_factor,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateTopicResponse {
            status: "success",
            message: "Topic created successfully",
            topic,
        }),
    ))
}

async fn list_messages(
    State(service): State<Arc<GatewayService>>,
    Path(topic): Path<String>,
    params: Result<Query<MessagesParams>, QueryRejection>,
) -> ApiResult<Json<MessagesResponse>> {
    let Query(params) = params?;
    let page = service
        .list_messages(&topic, MessageQuery {
            limit: params.limit,
            offset: params.offset,
        })
        .await?;

    let messages: Vec<MessageView> = page.records.into_iter().map(MessageView::from).collect();
    Ok(Json(MessagesResponse {
        topic,
        count: messages.len(),
        total: page.total,
        messages,
    }))
}

/// Adapts a stream of accepted connections to [`axum::serve`].
struct AcceptStream<S> {
    stream: S,
    local_addr: SocketAddr,
}

impl<S, I, E> Listener for AcceptStream<S>
where
    S: futures_util::Stream<Item = Result<(I, SocketAddr), E>> + Unpin + Send + 'static,
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    type Io = I;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.stream.next().await {
                Some(Ok((io, addr))) => return (io, addr),
                // Failed handshakes only affect that one peer
                Some(Err(e)) => tracing::debug!("TLS accept error: {}", e),
                None => std::future::pending().await,
            }
        }
    }

    fn local_addr(&self) -> std::io::Result<Self::Addr> {
        Ok(self.local_addr)
    }
}

/// The HTTP listener, bound and ready to serve.
pub struct HttpFace {
    listener: TcpListener,
    local_addr: SocketAddr,
    router: Router,
    tls: Option<FaceTls>,
}

impl HttpFace {
    pub async fn bind(addr: &str, router: Router, tls: Option<FaceTls>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .wrap_err_with(|| format!("Failed to bind HTTP face to {addr}"))?;
        let local_addr = listener
            .local_addr()
            .wrap_err("Failed to get HTTP face local address")?;

        Ok(Self {
            listener,
            local_addr,
            router,
            tls,
        })
    }
}

impl Face for HttpFace {
    fn name(&self) -> &'static str {
        "http"
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn serve(self, shutdown: ShutdownToken) -> Result<()> {
        let Self {
            listener,
            local_addr,
            router,
            tls,
        } = self;

        match tls {
            Some(tls) => {
                tracing::info!(addr = %local_addr, "HTTP face listening with mutual TLS");
                let acceptor = tokio_rustls::TlsAcceptor::from(tls.http_server_config()?);
                let stream = tls_listener::TlsListener::new(acceptor, listener);
                axum::serve(AcceptStream { stream, local_addr }, router)
                    .with_graceful_shutdown(shutdown.wait_for_shutdown())
                    .await
                    .wrap_err("HTTP face error")?;
            }
            None => {
                tracing::warn!(addr = %local_addr, "HTTP face listening without TLS");
                axum::serve(listener, router)
                    .with_graceful_shutdown(shutdown.wait_for_shutdown())
                    .await
                    .wrap_err("HTTP face error")?;
            }
        }

        tracing::info!("HTTP face stopped");
        Ok(())
    }
}
