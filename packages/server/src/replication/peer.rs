//! One outbound peer connection.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, trace};

use creek_core::RepCommand;

/// Longest acknowledgement line a peer may send back.
const MAX_ACK_LINE: usize = 1024;

/// A follower as seen from the leader: an address and, when attached,
/// a line-framed write half.
///
/// The peer id is its listen address. The channel is write-only from
/// the leader's side; acknowledgement lines from the follower are
/// drained and discarded so they cannot fill the socket buffers.
pub struct Peer {
    addr: String,
    sink: Mutex<Option<FramedWrite<OwnedWriteHalf, LinesCodec>>>,
    reconnecting: AtomicBool,
}

impl Peer {
    /// Creates a detached peer for the given address.
    #[must_use]
    pub fn new(addr: String) -> Self {
        Self {
            addr,
            sink: Mutex::new(None),
            reconnecting: AtomicBool::new(false),
        }
    }

    /// Peer identifier: the listen address it was configured with.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.addr
    }

    /// Address to dial.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Attaches a freshly dialed connection.
    ///
    /// The read half goes to a drain task that discards the follower's
    /// per-line acknowledgements until the connection drops.
    pub async fn attach(&self, stream: TcpStream) {
        let (read_half, write_half) = stream.into_split();

        let addr = self.addr.clone();
        tokio::spawn(async move {
            let mut acks =
                FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_ACK_LINE));
            while let Some(ack) = acks.next().await {
                match ack {
                    Ok(line) => trace!(peer = %addr, %line, "peer acknowledgement"),
                    Err(_) => break,
                }
            }
            debug!(peer = %addr, "peer acknowledgement stream closed");
        });

        *self.sink.lock().await = Some(FramedWrite::new(write_half, LinesCodec::new()));
    }

    /// Whether a connection is currently attached.
    pub async fn is_connected(&self) -> bool {
        self.sink.lock().await.is_some()
    }

    /// Writes one replication command line to the peer.
    ///
    /// A failed write detaches the connection; the caller decides
    /// whether to schedule a reconnect.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` when detached, or the underlying write
    /// error.
    pub async fn send(&self, cmd: &RepCommand) -> io::Result<()> {
        let mut sink = self.sink.lock().await;
        let Some(framed) = sink.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "peer is not connected",
            ));
        };

        match framed.send(cmd.encode()).await {
            Ok(()) => Ok(()),
            Err(err) => {
                *sink = None;
                Err(match err {
                    LinesCodecError::Io(io_err) => io_err,
                    other => io::Error::new(io::ErrorKind::InvalidData, other),
                })
            }
        }
    }

    /// Drops the connection, if any. The ack drain task exits on EOF.
    pub async fn detach(&self) {
        *self.sink.lock().await = None;
    }

    /// Claims the reconnect slot. Returns `false` when a reconnect task
    /// is already running for this peer.
    pub fn begin_reconnect(&self) -> bool {
        self.reconnecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Releases the reconnect slot.
    pub fn end_reconnect(&self) {
        self.reconnecting.store(false, Ordering::Release);
    }
}
