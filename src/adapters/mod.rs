pub mod http_face;
pub mod kafka;
pub mod middleware;
pub mod rpc_face;
pub mod sqlite_mirror;
pub mod tls;

pub use http_face::HttpFace;
pub use kafka::{KafkaConnector, KafkaSettings};
pub use rpc_face::{RpcFace, RpcGateway};
pub use sqlite_mirror::SqliteMirror;
pub use tls::FaceTls;
