use std::net::SocketAddr;

use eyre::Result;

use crate::utils::graceful_shutdown::ShutdownToken;

/// Face defines the port for a network listener exposing the gateway
/// operations over one wire protocol.
///
/// A face owns an already-bound listener, so binding failures surface when the
/// face is constructed rather than after it has been spawned.
pub trait Face: Send + 'static {
    /// Short protocol name used in logs ("http", "rpc")
    fn name(&self) -> &'static str;

    /// Address the listener is bound to
    fn local_addr(&self) -> SocketAddr;

    /// Serve requests until `shutdown` fires, then stop accepting and drain
    /// in-flight requests.
    ///
    /// # Returns
    /// A future that resolves when the face has stopped or failed
    fn serve(self, shutdown: ShutdownToken) -> impl std::future::Future<Output = Result<()>> + Send;
}
