use thiserror::Error;

use crate::ports::{broker::BrokerError, mirror::MirrorError};

/// Outcome taxonomy shared by both faces.
///
/// Each face maps these variants onto its own wire representation (HTTP status
/// code or gRPC status), so the business outcome is identical whichever face
/// served the request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GatewayError {
    /// Caller-supplied data is malformed
    #[error("{0}")]
    InvalidArgument(String),

    /// Transient connectivity or timeout problem; never retried by the gateway
    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("topic not found: {0}")]
    TopicNotFound(String),

    #[error("topic already exists: {0}")]
    TopicAlreadyExists(String),

    /// The broker declined the write (e.g. not enough in-sync replicas)
    #[error("publish rejected: {0}")]
    PublishRejected(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    pub fn invalid(message: impl Into<String>) -> Self {
        GatewayError::InvalidArgument(message.into())
    }

    /// Stable label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::InvalidArgument(_) => "invalid_argument",
            GatewayError::BrokerUnavailable(_) => "broker_unavailable",
            GatewayError::TopicNotFound(_) => "topic_not_found",
            GatewayError::TopicAlreadyExists(_) => "topic_already_exists",
            GatewayError::PublishRejected(_) => "publish_rejected",
            GatewayError::Internal(_) => "internal",
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, GatewayError::InvalidArgument(_))
    }
}

impl From<BrokerError> for GatewayError {
    fn from(error: BrokerError) -> Self {
        match error {
            BrokerError::Unavailable(msg) => GatewayError::BrokerUnavailable(msg),
            BrokerError::TopicNotFound(topic) => GatewayError::TopicNotFound(topic),
            BrokerError::TopicAlreadyExists(topic) => GatewayError::TopicAlreadyExists(topic),
            BrokerError::PublishRejected(msg) => GatewayError::PublishRejected(msg),
            BrokerError::InvalidRequest(msg) => GatewayError::InvalidArgument(msg),
            BrokerError::InvalidSecurityMaterial(msg) => GatewayError::BrokerUnavailable(msg),
        }
    }
}

impl From<MirrorError> for GatewayError {
    fn from(error: MirrorError) -> Self {
        GatewayError::Internal(error.to_string())
    }
}

/// Failure while tearing the broker client down. Only the first failure is
/// reported; every close step is still attempted.
#[derive(Error, Debug)]
pub enum CloseError {
    #[error("failed to close broker handle: {0}")]
    Broker(#[from] BrokerError),

    #[error("failed to close mirror: {0}")]
    Mirror(#[from] MirrorError),
}
