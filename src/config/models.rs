//! Configuration data structures for the gateway.
//!
//! These types map directly to YAML (also TOML / JSON) configuration files and to
//! `GATEWAY__*` environment overrides. Every section carries defaults so that a
//! minimal config only has to name what differs from a local development setup.
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration object.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub broker: BrokerConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub telemetry: TelemetryConfig,
}

/// Listener configuration shared by both faces.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// Address of the HTTP/JSON face
    pub http_addr: String,
    /// Address of the gRPC face
    pub rpc_addr: String,
    /// Deadline for draining both faces on shutdown
    pub shutdown_timeout_secs: u64,
    pub tls: FaceTlsConfig,
}

impl ServerConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8080".to_string(),
            rpc_addr: "0.0.0.0:9090".to_string(),
            shutdown_timeout_secs: 5,
            tls: FaceTlsConfig::default(),
        }
    }
}

/// Mutual TLS material for the faces. When enabled, clients must present a
/// certificate signed by `ca_cert`.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct FaceTlsConfig {
    pub enabled: bool,
    pub ca_cert: String,
    pub server_cert: String,
    pub server_key: String,
}

impl Default for FaceTlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ca_cert: "certs/ca/ca.crt".to_string(),
            server_cert: "certs/server/server.crt".to_string(),
            server_key: "certs/server/server.key".to_string(),
        }
    }
}

/// How the gateway authenticates to the broker cluster.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityMode {
    #[default]
    #[serde(rename = "PLAINTEXT")]
    Plaintext,
    #[serde(rename = "TLS", alias = "SSL")]
    Tls,
    #[serde(rename = "SASL_PLAINTEXT")]
    SaslPlaintext,
    #[serde(rename = "SASL_SSL")]
    SaslSsl,
}

impl SecurityMode {
    pub fn requires_tls(self) -> bool {
        matches!(self, SecurityMode::Tls | SecurityMode::SaslSsl)
    }

    pub fn requires_sasl(self) -> bool {
        matches!(self, SecurityMode::SaslPlaintext | SecurityMode::SaslSsl)
    }
}

impl std::fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecurityMode::Plaintext => write!(f, "PLAINTEXT"),
            SecurityMode::Tls => write!(f, "TLS"),
            SecurityMode::SaslPlaintext => write!(f, "SASL_PLAINTEXT"),
            SecurityMode::SaslSsl => write!(f, "SASL_SSL"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaslMechanism {
    #[default]
    #[serde(rename = "PLAIN")]
    Plain,
    #[serde(rename = "SCRAM-SHA-256")]
    ScramSha256,
    #[serde(rename = "SCRAM-SHA-512")]
    ScramSha512,
}

/// Client certificate material used by the TLS security modes.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BrokerTlsConfig {
    pub ca_cert: String,
    pub client_cert: String,
    pub client_key: String,
}

impl Default for BrokerTlsConfig {
    fn default() -> Self {
        Self {
            ca_cert: "certs/ca/ca.crt".to_string(),
            client_cert: "certs/client/client.crt".to_string(),
            client_key: "certs/client/client.key".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SaslConfig {
    pub mechanism: SaslMechanism,
    pub username: String,
    pub password: String,
}

/// Broker cluster connection settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BrokerConfig {
    pub brokers: Vec<String>,
    pub client_id: String,
    pub security_protocol: SecurityMode,
    pub tls: BrokerTlsConfig,
    pub sasl: SaslConfig,
    /// Upper bound for every broker call (connect, metadata, produce, admin)
    pub timeout_secs: u64,
    /// Retries for metadata calls before giving up
    pub metadata_retries: u32,
    /// Fixed pause between metadata retries
    pub metadata_retry_backoff_ms: u64,
}

impl BrokerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn metadata_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.metadata_retry_backoff_ms)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            client_id: "kafka-gateway".to_string(),
            security_protocol: SecurityMode::Plaintext,
            tls: BrokerTlsConfig::default(),
            sasl: SaslConfig::default(),
            timeout_secs: 10,
            metadata_retries: 3,
            metadata_retry_backoff_ms: 1000,
        }
    }
}

/// Static bearer token check on the HTTP face.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub secret: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub sqlite: SqliteConfig,
}

/// Local SQLite mirror of published messages.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SqliteConfig {
    pub enabled: bool,
    pub db_path: String,
    pub table_name: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: "./data/messages.db".to_string(),
            table_name: "kafka_messages".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `kafka_gateway=debug,info`
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// OTLP gRPC collector endpoint; metrics stay in-process when unset
    pub otlp_endpoint: Option<String>,
    pub export_interval_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "kafka-gateway".to_string(),
            otlp_endpoint: None,
            export_interval_secs: 30,
        }
    }
}
