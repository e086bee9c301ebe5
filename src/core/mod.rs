pub mod broker_client;
pub mod error;
pub mod model;
pub mod security;
pub mod service;

pub use broker_client::BrokerClient;
pub use error::{CloseError, GatewayError, GatewayResult};
pub use security::SecurityMaterial;
pub use service::GatewayService;
