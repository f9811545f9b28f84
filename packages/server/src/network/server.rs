//! The TCP server lifecycle.
//!
//! Deferred startup: `new()` allocates shared state, `start()` recovers
//! the partitions, binds the listener, and wires up replication, and
//! `serve()` accepts connections until shutdown. The bound address is
//! reported by `start()` so tests can listen on port 0 and discover the
//! ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use creek_core::{Clock, SystemClock};

use crate::config::Config;
use crate::events::MutationHub;
use crate::replication::ReplicationService;
use crate::state::StateMachine;

use super::session;
use super::shutdown::ShutdownController;

/// How long `stop` waits for open sessions to finish.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A creek node: state machine, replication service, and accept loop.
pub struct Server {
    config: Config,
    state: Arc<StateMachine>,
    replication: Arc<ReplicationService>,
    hub: Arc<MutationHub>,
    shutdown: Arc<ShutdownController>,
    listener: Option<TcpListener>,
    sender_task: Option<JoinHandle<()>>,
}

impl Server {
    /// Allocates the node's shared state without touching the network.
    ///
    /// # Errors
    ///
    /// Returns an error when the commit log cannot be opened.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let hub = Arc::new(MutationHub::default());
        let state = Arc::new(
            StateMachine::new(&config, clock, Arc::clone(&hub))
                .context("failed to initialize state machine")?,
        );
        let shutdown = Arc::new(ShutdownController::new());
        let replication = Arc::new(ReplicationService::new(&config, shutdown.receiver()));

        Ok(Self {
            config,
            state,
            replication,
            hub,
            shutdown,
            listener: None,
            sender_task: None,
        })
    }

    /// The mutation broadcast hub, for realtime-update consumers.
    #[must_use]
    pub fn hub(&self) -> Arc<MutationHub> {
        Arc::clone(&self.hub)
    }

    /// The shutdown controller, for external shutdown triggers.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Recovers state, binds the listener, and starts replication.
    ///
    /// Returns the actual bound address (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns an error when recovery fails or the listen address
    /// cannot be bound; both are fatal at startup.
    pub async fn start(&mut self) -> anyhow::Result<SocketAddr> {
        self.state
            .start()
            .await
            .context("commit log recovery failed")?;

        let listener = TcpListener::bind(&self.config.server_address)
            .await
            .with_context(|| format!("failed to bind {}", self.config.server_address))?;
        let addr = listener.local_addr()?;
        info!(role = ?self.config.role, %addr, "server listening");
        self.listener = Some(listener);

        ReplicationService::connect_peers(&self.replication);
        if let Some(outbox) = self.state.take_outbox() {
            self.sender_task = Some(ReplicationService::spawn_sender(&self.replication, outbox));
        }

        Ok(addr)
    }

    /// Accepts connections until shutdown is signalled.
    ///
    /// Each accepted connection runs as its own session task.
    ///
    /// # Errors
    ///
    /// Returns an error when called before [`Server::start`].
    pub async fn serve(&mut self) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .context("serve() called before start()")?;
        let mut shutdown_rx = self.shutdown.receiver();
        self.shutdown.set_ready();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let state = Arc::clone(&self.state);
                        let shutdown = Arc::clone(&self.shutdown);
                        tokio::spawn(async move {
                            session::run(stream, peer.to_string(), state, shutdown).await;
                        });
                    }
                    Err(err) => warn!(%err, "failed to accept connection"),
                },
                _ = shutdown_rx.changed() => {
                    info!("accept loop stopping");
                    return Ok(());
                }
            }
        }
    }

    /// Graceful stop: signal everything, stop the partitions, close
    /// peers, and wait for sessions to drain.
    pub async fn stop(&mut self) {
        self.shutdown.trigger();

        if let Some(task) = self.sender_task.take() {
            let _ = task.await;
        }
        self.replication.close_all().await;
        self.state.stop().await;

        if self.shutdown.wait_for_drain(DRAIN_TIMEOUT).await {
            info!("server stopped");
        } else {
            warn!(
                open_sessions = self.shutdown.session_count(),
                "drain timed out; exiting with sessions open"
            );
        }
    }
}
