//! Replication fan-out: peer connections and the outbox drain.
//!
//! A leader dials every configured peer at startup (5 attempts, 5
//! seconds apart) and keeps one outbound line-framed connection per
//! peer. A background sender drains the partition's outbox and writes
//! each replication command to every connected peer in turn; per-peer
//! failures are logged, the peer stays registered, and a reconnect
//! task with exponential backoff re-dials it.
//!
//! Followers dial nothing; their inbound `REP` lines arrive through
//! the ordinary client session path.

mod peer;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use creek_core::{NodeRole, RepCommand};

use crate::config::Config;

pub use peer::Peer;

/// Startup dial attempts per peer.
pub const DIAL_ATTEMPTS: u32 = 5;

/// Spacing between startup dial attempts.
pub const DIAL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// First reconnect backoff step after a send failure.
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Reconnect backoff ceiling.
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Owns the peer map and the replication sender.
pub struct ReplicationService {
    role: NodeRole,
    peers: DashMap<String, Arc<Peer>>,
    shutdown: watch::Receiver<bool>,
    dropped: AtomicU64,
}

impl ReplicationService {
    /// Builds the service. On a leader every configured peer is
    /// registered (detached) immediately; followers keep an empty map.
    #[must_use]
    pub fn new(config: &Config, shutdown: watch::Receiver<bool>) -> Self {
        let peers = DashMap::new();
        if config.role == NodeRole::Leader {
            for addr in &config.peer_nodes {
                peers.insert(addr.clone(), Arc::new(Peer::new(addr.clone())));
            }
        }
        Self {
            role: config.role,
            peers,
            shutdown,
            dropped: AtomicU64::new(0),
        }
    }

    /// Number of registered peers.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Number of peers with a live connection.
    pub async fn connected_peer_count(&self) -> usize {
        let mut connected = 0;
        for peer in self.peer_handles() {
            if peer.is_connected().await {
                connected += 1;
            }
        }
        connected
    }

    /// Snapshot of the registered peers.
    ///
    /// The map guard must not be held across an await, so fan-out and
    /// shutdown iterate over this collected snapshot instead.
    fn peer_handles(&self) -> Vec<Arc<Peer>> {
        self.peers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Dials every registered peer in the background.
    ///
    /// Followers return immediately: replication flows toward them.
    pub fn connect_peers(service: &Arc<Self>) {
        if service.role != NodeRole::Leader {
            return;
        }
        for entry in &service.peers {
            let service = Arc::clone(service);
            let peer = Arc::clone(entry.value());
            tokio::spawn(async move {
                service.dial_with_budget(&peer).await;
            });
        }
    }

    /// Spawns the outbox drain task.
    ///
    /// The task exits when the outbox closes or shutdown is signalled.
    pub fn spawn_sender(
        service: &Arc<Self>,
        mut outbox: mpsc::Receiver<RepCommand>,
    ) -> JoinHandle<()> {
        let service = Arc::clone(service);
        let mut shutdown = service.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    cmd = outbox.recv() => match cmd {
                        Some(cmd) => service.fan_out(&cmd).await,
                        None => {
                            debug!("replication outbox closed; sender exiting");
                            return;
                        }
                    },
                    _ = shutdown.changed() => {
                        debug!("shutdown signalled; replication sender exiting");
                        return;
                    }
                }
            }
        })
    }

    /// Writes one command to every connected peer in turn.
    async fn fan_out(&self, cmd: &RepCommand) {
        for peer in self.peer_handles() {
            if let Err(err) = peer.send(cmd).await {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    peer = %peer.id(),
                    %err,
                    dropped_total = dropped,
                    "replication send failed; peer kept for reconnect"
                );
                self.spawn_reconnect(&peer);
            }
        }
    }

    /// Dials a peer with the startup retry budget.
    async fn dial_with_budget(&self, peer: &Arc<Peer>) {
        let mut shutdown = self.shutdown.clone();
        for attempt in 1..=DIAL_ATTEMPTS {
            match TcpStream::connect(peer.addr()).await {
                Ok(stream) => {
                    info!(peer = %peer.id(), attempt, "connected to peer");
                    peer.attach(stream).await;
                    return;
                }
                Err(err) => {
                    warn!(peer = %peer.id(), attempt, %err, "failed to connect to peer");
                }
            }
            if attempt < DIAL_ATTEMPTS {
                tokio::select! {
                    () = tokio::time::sleep(DIAL_RETRY_DELAY) => {}
                    _ = shutdown.changed() => return,
                }
            }
        }
        error!(peer = %peer.id(), "dial budget exhausted; waiting for reconnect");
    }

    /// Spawns a background reconnect with exponential backoff, unless
    /// one is already running for this peer.
    fn spawn_reconnect(&self, peer: &Arc<Peer>) {
        if !peer.begin_reconnect() {
            return;
        }
        let peer = Arc::clone(peer);
        let mut shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut delay = RECONNECT_BASE_DELAY;
            loop {
                let jitter = rand::rng().random_range(Duration::ZERO..=delay / 4);
                tokio::select! {
                    () = tokio::time::sleep(delay + jitter) => {}
                    _ = shutdown.changed() => {
                        peer.end_reconnect();
                        return;
                    }
                }
                match TcpStream::connect(peer.addr()).await {
                    Ok(stream) => {
                        info!(peer = %peer.id(), "reconnected to peer");
                        peer.attach(stream).await;
                        peer.end_reconnect();
                        return;
                    }
                    Err(err) => {
                        debug!(peer = %peer.id(), %err, ?delay, "reconnect attempt failed");
                        delay = (delay * 2).min(RECONNECT_MAX_DELAY);
                    }
                }
            }
        });
    }

    /// Closes every peer connection.
    pub async fn close_all(&self) {
        for peer in self.peer_handles() {
            peer.detach().await;
        }
    }
}
