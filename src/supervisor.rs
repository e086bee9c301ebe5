//! Process lifecycle: build the mirror and broker client, run both faces,
//! stop them under one deadline and release everything in order.
//!
//! `Init -> ClientReady -> FacesRunning -> ShuttingDown -> Stopped`
use std::{fmt, net::SocketAddr, sync::Arc, time::Duration};

use eyre::{Result, eyre};
use tokio::{sync::oneshot, task::JoinSet, time::Instant};

use crate::{
    adapters::{FaceTls, HttpFace, RpcFace, SqliteMirror, http_face},
    config::models::GatewayConfig,
    core::{BrokerClient, GatewayService},
    metrics::GatewayMetrics,
    ports::{broker::BrokerConnector, face::Face, mirror::MessageMirror},
    utils::graceful_shutdown::{GracefulShutdown, ShutdownReason, ShutdownToken},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Init,
    ClientReady,
    FacesRunning,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SupervisorState::Init => "Init",
            SupervisorState::ClientReady => "ClientReady",
            SupervisorState::FacesRunning => "FacesRunning",
            SupervisorState::ShuttingDown => "ShuttingDown",
            SupervisorState::Stopped => "Stopped",
        };
        f.write_str(name)
    }
}

/// Addresses the faces actually bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceAddrs {
    pub http: SocketAddr,
    pub rpc: SocketAddr,
}

type FaceSet = JoinSet<(&'static str, Result<()>)>;

/// Resources built during Init, released during Stopped.
struct Resources {
    metrics: Arc<GatewayMetrics>,
    mirror: Option<Arc<dyn MessageMirror>>,
    client: Option<Arc<BrokerClient>>,
}

pub struct Supervisor {
    config: GatewayConfig,
    connector: Arc<dyn BrokerConnector>,
    state: SupervisorState,
}

impl Supervisor {
    pub fn new(config: GatewayConfig, connector: Arc<dyn BrokerConnector>) -> Self {
        Self {
            config,
            connector,
            state: SupervisorState::Init,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Run until SIGINT/SIGTERM or a face failure.
    pub async fn run(self) -> Result<()> {
        let shutdown = Arc::new(GracefulShutdown::with_timeout(
            self.config.server.shutdown_timeout(),
        ));

        let signal_shutdown = shutdown.clone();
        let signal_task = tokio::spawn(async move {
            if let Err(e) = signal_shutdown.run_signal_handler().await {
                tracing::error!("Signal handler failed: {}", e);
            }
        });

        let result = self.run_until(shutdown, None).await;
        signal_task.abort();
        result
    }

    /// Run until `shutdown` is triggered or a face fails. `ready` receives the
    /// bound addresses once both faces are serving.
    pub async fn run_until(
        mut self,
        shutdown: Arc<GracefulShutdown>,
        ready: Option<oneshot::Sender<FaceAddrs>>,
    ) -> Result<()> {
        tracing::info!(state = %self.state, "Gateway starting");
        let resources = self.init().await?;

        self.transition(SupervisorState::ClientReady);
        let service = Arc::new(GatewayService::new(
            resources.client.clone(),
            resources.metrics.clone(),
        ));

        let faces = match self.start_faces(service, &shutdown).await {
            Ok((faces, addrs)) => {
                self.transition(SupervisorState::FacesRunning);
                if let Some(ready) = ready {
                    let _ = ready.send(addrs);
                }
                faces
            }
            Err(e) => {
                tracing::error!("Failed to start faces: {:#}", e);
                self.transition(SupervisorState::ShuttingDown);
                self.release(resources, shutdown.shutdown_timeout()).await;
                return Err(e);
            }
        };

        let (face_error, deadline) = self.supervise(faces, &shutdown).await;
        self.release(resources, deadline.saturating_duration_since(Instant::now()))
            .await;

        match face_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn transition(&mut self, next: SupervisorState) {
        tracing::info!(from = %self.state, to = %next, "Gateway state transition");
        self.state = next;
    }

    /// Metrics, then the mirror, then the broker client. Mirror and client
    /// failures degrade the gateway instead of stopping it.
    async fn init(&self) -> Result<Resources> {
        let metrics = Arc::new(GatewayMetrics::new(&self.config.telemetry)?);

        let sqlite = &self.config.storage.sqlite;
        let mirror: Option<Arc<dyn MessageMirror>> = if sqlite.enabled {
            match SqliteMirror::open(sqlite).await {
                Ok(mirror) => Some(Arc::new(mirror)),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Failed to open SQLite mirror, continuing without message storage"
                    );
                    None
                }
            }
        } else {
            tracing::info!("SQLite mirror disabled");
            None
        };

        let client = match BrokerClient::connect(
            &self.config.broker,
            self.connector.as_ref(),
            mirror.clone(),
        )
        .await
        {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    brokers = ?self.config.broker.brokers,
                    "Failed to connect to broker, broker operations are disabled"
                );
                None
            }
        };

        Ok(Resources {
            metrics,
            mirror,
            client,
        })
    }

    async fn start_faces(
        &self,
        service: Arc<GatewayService>,
        shutdown: &GracefulShutdown,
    ) -> Result<(FaceSet, FaceAddrs)> {
        let server = &self.config.server;
        let tls = if server.tls.enabled {
            Some(FaceTls::load(&server.tls).await?)
        } else {
            tracing::warn!("Face TLS disabled, serving plaintext");
            None
        };

        let router = http_face::router(service.clone(), &self.config.auth);
        let http = HttpFace::bind(&server.http_addr, router, tls.clone()).await?;
        let rpc = RpcFace::bind(&server.rpc_addr, service, tls).await?;

        let addrs = FaceAddrs {
            http: http.local_addr(),
            rpc: rpc.local_addr(),
        };

        let mut faces = FaceSet::new();
        spawn_face(&mut faces, http, shutdown.shutdown_token());
        spawn_face(&mut faces, rpc, shutdown.shutdown_token());

        tracing::info!(http = %addrs.http, rpc = %addrs.rpc, "Gateway faces started");
        Ok((faces, addrs))
    }

    /// Wait for a stop request or a face exit, then drain both faces within
    /// the shutdown deadline. Returns the first face failure, if any, and the
    /// instant the deadline expires.
    async fn supervise(
        &mut self,
        mut faces: FaceSet,
        shutdown: &GracefulShutdown,
    ) -> (Option<eyre::Report>, Instant) {
        let mut face_error: Option<eyre::Report> = None;

        tokio::select! {
            _ = shutdown.shutdown_token().wait_for_shutdown() => {}
            joined = faces.join_next() => {
                let reason = match joined {
                    Some(joined) => describe_face_exit(joined, &mut face_error),
                    None => "no faces running".to_string(),
                };
                shutdown.trigger_shutdown(ShutdownReason::FaceFailed(reason));
            }
        }

        self.transition(SupervisorState::ShuttingDown);
        let timeout = shutdown.shutdown_timeout();
        let deadline = Instant::now() + timeout;

        let drained = tokio::time::timeout_at(deadline, async {
            while let Some(joined) = faces.join_next().await {
                describe_face_exit(joined, &mut face_error);
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(?timeout, "Shutdown deadline expired, aborting faces");
            faces.abort_all();
            while faces.join_next().await.is_some() {}
        }

        (face_error, deadline)
    }

    /// Close the broker client, which cascades to the mirror. Without a
    /// client the mirror is closed directly. Bounded by `deadline`: requests
    /// still holding the client past it are abandoned.
    async fn release(&mut self, resources: Resources, deadline: Duration) {
        let close = async {
            match &resources.client {
                Some(client) => {
                    if let Err(e) = client.close().await {
                        tracing::error!("Failed to close broker client: {}", e);
                    }
                }
                None => {
                    if let Some(mirror) = &resources.mirror
                        && let Err(e) = mirror.close().await
                    {
                        tracing::error!("Failed to close mirror: {}", e);
                    }
                }
            }
        };

        if tokio::time::timeout(deadline, close).await.is_err() {
            tracing::error!(
                ?deadline,
                "Shutdown deadline expired while closing the broker client"
            );
        }
        resources.metrics.shutdown();
        self.transition(SupervisorState::Stopped);
    }
}

fn spawn_face<F: Face>(faces: &mut FaceSet, face: F, token: ShutdownToken) {
    let name = face.name();
    faces.spawn(async move { (name, face.serve(token).await) });
}

/// Log how a face ended and keep the first failure.
fn describe_face_exit(
    joined: Result<(&'static str, Result<()>), tokio::task::JoinError>,
    face_error: &mut Option<eyre::Report>,
) -> String {
    match joined {
        Ok((name, Ok(()))) => {
            tracing::info!(face = name, "Face stopped");
            format!("{name} face stopped")
        }
        Ok((name, Err(e))) => {
            tracing::error!(face = name, "Face failed: {:#}", e);
            let reason = format!("{name} face failed: {e}");
            face_error.get_or_insert(e);
            reason
        }
        Err(e) => {
            tracing::error!("Face task panicked or was cancelled: {}", e);
            let reason = format!("face task ended abnormally: {e}");
            face_error.get_or_insert(eyre!(reason.clone()));
            reason
        }
    }
}
