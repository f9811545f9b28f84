//! Node and partition modes, and the TTL sentinel values.

/// `TTL` result for a key that exists but carries no expiry.
pub const TTL_NO_EXPIRY: i64 = -1;

/// `TTL` result for a key that is missing or already expired.
pub const TTL_MISSING: i64 = -2;

/// When the commit log is flushed relative to client acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteConsistency {
    /// Flush after every append, before the write becomes visible.
    Strong,
    /// Flush on a timer; an acknowledged write may be lost on crash.
    #[default]
    Eventual,
}

impl WriteConsistency {
    /// Parses the config digit (`"0"` strong, `"1"` eventual).
    ///
    /// Unrecognized values fall back to `Eventual`, matching the
    /// original server's behavior.
    #[must_use]
    pub fn from_config(value: &str) -> Self {
        match value {
            "0" => WriteConsistency::Strong,
            _ => WriteConsistency::Eventual,
        }
    }
}

/// How a replicated partition may be used by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplicaMode {
    /// Replicated data is read-only for clients.
    #[default]
    ReadOnly,
    /// Clients may also write. Illegal on a follower; rejected at startup.
    ReadWrite,
}

impl ReplicaMode {
    /// Parses the config digit (`"0"` read-only, `"1"` read-write).
    #[must_use]
    pub fn from_config(value: &str) -> Self {
        match value {
            "1" => ReplicaMode::ReadWrite,
            _ => ReplicaMode::ReadOnly,
        }
    }
}

/// Role of a node within the replication topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeRole {
    /// Accepts client writes and originates replication commands.
    #[default]
    Leader,
    /// Accepts only replication commands on its data partitions.
    Follower,
}

impl NodeRole {
    /// Parses the config digit (`"0"` leader, `"1"` follower).
    #[must_use]
    pub fn from_config(value: &str) -> Self {
        match value {
            "1" => NodeRole::Follower,
            _ => NodeRole::Leader,
        }
    }
}
