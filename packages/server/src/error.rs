//! Error kinds distinguished by the store core.
//!
//! Errors from the keyspace and commit log propagate to the partition
//! and then to the router, which translates them into single-line
//! client responses. Background tasks (GC, flush, replication drain)
//! log errors and continue; they never reach a client.

use creek_core::WireError;
use thiserror::Error;

/// Errors surfaced by keyspace, log, and partition operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key is absent. `GET` answers with an empty line; `TTL`
    /// answers `-2`.
    #[error("key not found")]
    NotFound,

    /// The key is present but past its expiry; the read deleted it.
    /// Clients observe the same empty response as [`StoreError::NotFound`].
    #[error("key expired")]
    Expired,

    /// The request line failed to parse (unknown opcode, wrong arity,
    /// non-numeric TTL).
    #[error(transparent)]
    Invalid(#[from] WireError),

    /// A client write reached a follower partition replicated read-only.
    #[error("write rejected: node is a read-only follower")]
    ReadOnly,

    /// A replication command reached a leader partition.
    #[error("replication rejected: node is a leader")]
    NotFollower,

    /// Log append/flush/replay or socket write failed. The failing
    /// operation is never acknowledged as success; the process keeps
    /// running.
    #[error("log I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_facing_messages() {
        assert_eq!(StoreError::NotFound.to_string(), "key not found");
        assert_eq!(StoreError::Expired.to_string(), "key expired");
        assert_eq!(
            StoreError::ReadOnly.to_string(),
            "write rejected: node is a read-only follower"
        );
        assert_eq!(
            StoreError::NotFollower.to_string(),
            "replication rejected: node is a leader"
        );
    }

    #[test]
    fn wire_errors_pass_through_unchanged() {
        let err: StoreError = WireError::Empty.into();
        assert_eq!(err.to_string(), "no command received");
    }
}
