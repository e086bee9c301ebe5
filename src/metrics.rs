//! Gateway metrics registry.
//!
//! [`GatewayMetrics`] is built once at startup and handed to both faces and to
//! the gateway service. It owns an OpenTelemetry meter provider (exported over
//! OTLP when an endpoint is configured) and mirrors every counter into an
//! in-process snapshot served as JSON by `GET /metrics`.
//!
//! Instruments:
//! * `gateway_http_requests_total{method,path,status}` (counter)
//! * `gateway_http_request_duration_seconds{method,path}` (histogram)
//! * `gateway_rpc_requests_total{method,code}` (counter)
//! * `gateway_broker_operations_total{operation,outcome}` (counter)
use std::{collections::BTreeMap, time::Duration};

use eyre::{Result, WrapErr};
use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, MeterProvider},
};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
};

use crate::config::models::TelemetryConfig;

pub const GATEWAY_HTTP_REQUESTS_TOTAL: &str = "gateway_http_requests_total";
pub const GATEWAY_HTTP_REQUEST_DURATION_SECONDS: &str = "gateway_http_request_duration_seconds";
pub const GATEWAY_RPC_REQUESTS_TOTAL: &str = "gateway_rpc_requests_total";
pub const GATEWAY_BROKER_OPERATIONS_TOTAL: &str = "gateway_broker_operations_total";

pub struct GatewayMetrics {
    provider: SdkMeterProvider,
    http_requests: Counter<u64>,
    http_duration: Histogram<f64>,
    rpc_requests: Counter<u64>,
    broker_operations: Counter<u64>,
    /// Counter values keyed by `name{label="value",...}`
    snapshot: scc::HashMap<String, u64>,
}

impl GatewayMetrics {
    /// Build the registry from telemetry settings. An OTLP exporter is only
    /// attached when `otlp_endpoint` is set.
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let resource = Resource::builder()
            .with_service_name(config.service_name.clone())
            .build();
        let mut builder = SdkMeterProvider::builder().with_resource(resource);

        if let Some(endpoint) = config.otlp_endpoint.as_deref() {
            let exporter = opentelemetry_otlp::MetricExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()
                .wrap_err_with(|| format!("Failed to build OTLP metric exporter for {endpoint}"))?;
            let reader = PeriodicReader::builder(exporter)
                .with_interval(Duration::from_secs(config.export_interval_secs.max(1)))
                .build();
            builder = builder.with_reader(reader);
            tracing::info!(endpoint, "OTLP metric export enabled");
        }

        Ok(Self::from_provider(builder.build()))
    }

    /// Registry without any exporter, used by tests and embedders.
    pub fn local() -> Self {
        Self::from_provider(SdkMeterProvider::builder().build())
    }

    fn from_provider(provider: SdkMeterProvider) -> Self {
        let meter = provider.meter("kafka-gateway");
        Self {
            http_requests: meter
                .u64_counter(GATEWAY_HTTP_REQUESTS_TOTAL)
                .with_description("Total number of HTTP requests served")
                .build(),
            http_duration: meter
                .f64_histogram(GATEWAY_HTTP_REQUEST_DURATION_SECONDS)
                .with_description("Latency of HTTP requests")
                .with_unit("s")
                .build(),
            rpc_requests: meter
                .u64_counter(GATEWAY_RPC_REQUESTS_TOTAL)
                .with_description("Total number of RPC calls served")
                .build(),
            broker_operations: meter
                .u64_counter(GATEWAY_BROKER_OPERATIONS_TOTAL)
                .with_description("Broker operations by outcome")
                .build(),
            provider,
            snapshot: scc::HashMap::new(),
        }
    }

    /// `status` is rendered as its decimal string ("200", "404").
    pub async fn record_http_request(
        &self,
        method: &str,
        path: &str,
        status: u16,
        duration: Duration,
    ) {
        let status = status.to_string();
        self.http_requests.add(
            1,
            &[
                KeyValue::new("method", method.to_string()),
                KeyValue::new("path", path.to_string()),
                KeyValue::new("status", status.clone()),
            ],
        );
        self.http_duration.record(
            duration.as_secs_f64(),
            &[
                KeyValue::new("method", method.to_string()),
                KeyValue::new("path", path.to_string()),
            ],
        );
        self.bump(series_key(
            GATEWAY_HTTP_REQUESTS_TOTAL,
            &[("method", method), ("path", path), ("status", &status)],
        ))
        .await;
    }

    pub async fn record_rpc_request(&self, method: &str, code: &str) {
        self.rpc_requests.add(
            1,
            &[
                KeyValue::new("method", method.to_string()),
                KeyValue::new("code", code.to_string()),
            ],
        );
        self.bump(series_key(
            GATEWAY_RPC_REQUESTS_TOTAL,
            &[("method", method), ("code", code)],
        ))
        .await;
    }

    /// `outcome` is "success" or an error kind label.
    pub async fn record_broker_operation(&self, operation: &str, outcome: &str) {
        self.broker_operations.add(
            1,
            &[
                KeyValue::new("operation", operation.to_string()),
                KeyValue::new("outcome", outcome.to_string()),
            ],
        );
        self.bump(series_key(
            GATEWAY_BROKER_OPERATIONS_TOTAL,
            &[("operation", operation), ("outcome", outcome)],
        ))
        .await;
    }

    /// Current counter values, sorted by series key.
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        let mut counters = BTreeMap::new();
        self.snapshot.iter_sync(|key, value| {
            counters.insert(key.clone(), *value);
            true
        });
        counters
    }

    /// Flush and stop the exporter, if any.
    pub fn shutdown(&self) {
        if let Err(e) = self.provider.shutdown() {
            tracing::warn!("Failed to shut down meter provider: {}", e);
        }
    }

    async fn bump(&self, key: String) {
        self.snapshot
            .entry_async(key)
            .await
            .and_modify(|value| *value += 1)
            .or_insert(1);
    }
}

impl std::fmt::Debug for GatewayMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayMetrics")
            .field("series", &self.snapshot.len())
            .finish()
    }
}

fn series_key(name: &str, labels: &[(&str, &str)]) -> String {
    let labels: Vec<String> = labels
        .iter()
        .map(|(label, value)| format!("{label}=\"{value}\""))
        .collect();
    format!("{name}{{{}}}", labels.join(","))
}
