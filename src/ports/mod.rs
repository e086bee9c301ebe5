pub mod broker;
pub mod face;
pub mod mirror;

pub use broker::{BrokerConnector, BrokerError, BrokerResult, ClusterAdmin, Publisher};
pub use face::Face;
pub use mirror::{MessageMirror, MirrorError, MirrorResult};
