//! Kafka Gateway - a dual-face (gRPC + HTTP/JSON) front door for a Kafka cluster.
//!
//! The gateway lets clients publish messages, list topics, inspect partitions
//! and create topics without speaking the broker protocol themselves. Every
//! successfully published message can optionally be mirrored into a local
//! SQLite table and paged back through the HTTP face.
//!
//! # Features
//! - HTTP/JSON face (axum) and gRPC face (tonic) over one shared service
//! - Mutual TLS on both faces, and PLAINTEXT / TLS / SASL_PLAINTEXT / SASL_SSL
//!   towards the brokers
//! - Optional SQLite message mirror with newest-first paging
//! - Degraded start: faces come up even when the broker or mirror do not
//! - Structured logging via `tracing`, counters via OpenTelemetry
//! - One shutdown deadline for both faces, followed by an ordered close of the
//!   broker client and the mirror
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use kafka_gateway::{
//!     GatewayMetrics, GatewayService,
//!     adapters::{KafkaConnector, KafkaSettings},
//!     config::loader::load_config,
//!     core::BrokerClient,
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg = load_config("config.yaml").await?;
//! let connector = KafkaConnector::new(KafkaSettings::from(&cfg.broker));
//! let client = BrokerClient::connect(&cfg.broker, &connector, None).await?;
//! let service = GatewayService::new(Some(Arc::new(client)), Arc::new(GatewayMetrics::local()));
//! let topics = service.list_topics().await?;
//! println!("{topics:?}");
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations)
//! while keeping the broker client and request semantics inside `core`. The
//! [`supervisor`] owns the process lifecycle and is what the binary runs.
//!
//! # Error Handling
//! Request paths return [`core::GatewayError`], which each face maps onto its
//! own status codes. Startup and lifecycle code returns `eyre::Result<T>` with
//! context attached via `WrapErr`.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod supervisor;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

/// Generated protobuf types and gRPC service stubs.
pub mod proto {
    tonic::include_proto!("kafka_gateway.v1");
}

pub use crate::{
    adapters::{HttpFace, KafkaConnector, RpcFace, SqliteMirror},
    core::{BrokerClient, GatewayError, GatewayService},
    metrics::GatewayMetrics,
    supervisor::Supervisor,
    utils::GracefulShutdown,
};
