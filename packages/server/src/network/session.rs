//! One client connection: banner, then request/response lines.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, trace, warn};

use crate::state::StateMachine;

use super::router;
use super::shutdown::ShutdownController;
use super::SERVER_VERSION;

/// Longest request line a client may send.
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Drives one client connection to completion.
///
/// Sends the version banner, then answers one response line per
/// request line until the client disconnects or shutdown is
/// signalled. The session guard keeps the drain phase honest.
pub async fn run(
    stream: TcpStream,
    peer_addr: String,
    state: Arc<StateMachine>,
    shutdown: Arc<ShutdownController>,
) {
    let _guard = shutdown.session_guard();
    let mut shutdown_rx = shutdown.receiver();
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

    let banner = format!("Connected to Server Version: {SERVER_VERSION}");
    if let Err(err) = framed.send(banner).await {
        warn!(client = %peer_addr, %err, "failed to send banner");
        return;
    }

    loop {
        tokio::select! {
            request = framed.next() => match request {
                Some(Ok(line)) => {
                    trace!(client = %peer_addr, %line, "request");
                    let response = router::handle_line(&line, &state, &shutdown).await;
                    trace!(client = %peer_addr, %response, "response");
                    if let Err(err) = framed.send(response).await {
                        warn!(client = %peer_addr, %err, "failed to send response");
                        break;
                    }
                }
                Some(Err(err)) => {
                    warn!(client = %peer_addr, %err, "malformed client stream");
                    break;
                }
                None => {
                    debug!(client = %peer_addr, "client disconnected");
                    break;
                }
            },
            _ = shutdown_rx.changed() => {
                debug!(client = %peer_addr, "closing session for shutdown");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use creek_core::{NodeRole, ReplicaMode, SystemClock, WriteConsistency};
    use tokio::net::TcpListener;

    use crate::config::Config;
    use crate::events::MutationHub;

    use super::*;

    async fn start_session(dir: &std::path::Path) -> (Framed<TcpStream, LinesCodec>, Arc<ShutdownController>) {
        let config = Config {
            server_address: "127.0.0.1:7690".to_string(),
            log_level: "info".to_string(),
            data_store_directory: dir.to_path_buf(),
            peer_nodes: Vec::new(),
            write_consistency: WriteConsistency::Eventual,
            replica_mode: ReplicaMode::ReadOnly,
            role: NodeRole::Leader,
        };
        let state = Arc::new(
            StateMachine::new(&config, Arc::new(SystemClock), Arc::new(MutationHub::default()))
                .unwrap(),
        );
        let shutdown = Arc::new(ShutdownController::new());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        {
            let shutdown = Arc::clone(&shutdown);
            tokio::spawn(async move {
                let (stream, peer) = listener.accept().await.unwrap();
                run(stream, peer.to_string(), state, shutdown).await;
            });
        }

        let client = TcpStream::connect(addr).await.unwrap();
        (Framed::new(client, LinesCodec::new()), shutdown)
    }

    #[tokio::test]
    async fn session_greets_and_answers() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, _shutdown) = start_session(dir.path()).await;

        let banner = client.next().await.unwrap().unwrap();
        assert_eq!(
            banner,
            format!("Connected to Server Version: {SERVER_VERSION}")
        );

        client.send("SET a b".to_string()).await.unwrap();
        assert_eq!(client.next().await.unwrap().unwrap(), "OK");

        client.send("GET a".to_string()).await.unwrap();
        assert_eq!(client.next().await.unwrap().unwrap(), "b");
    }

    #[tokio::test]
    async fn session_ends_on_shutdown_signal() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, shutdown) = start_session(dir.path()).await;
        let _banner = client.next().await.unwrap().unwrap();
        assert_eq!(shutdown.session_count(), 1);

        shutdown.trigger();

        // The server closes its end; the client stream finishes.
        assert!(client.next().await.is_none());
        assert!(shutdown.wait_for_drain(std::time::Duration::from_secs(1)).await);
    }
}
