//! Creek Core -- wire schemas and pure domain types for the creek
//! key-value store.
//!
//! This crate provides the foundation layer shared by the server and by
//! test harnesses:
//!
//! - **Operations** ([`op`]): the `SET`/`DELETE`/`EXPIRE` mutation vocabulary
//! - **Records** ([`record`]): framed commit-log records and their text codec
//! - **Replication** ([`repcmd`]): `REP`-prefixed replication commands
//! - **Commands** ([`command`]): client command parsing at the router boundary
//! - **Clock** ([`clock`]): injectable wall-clock source for TTL logic
//! - **Events** ([`event`]): mutation event schema for broadcast consumers
//! - **Types** ([`types`]): consistency, replica and role modes, TTL sentinels
//!
//! Nothing in this crate performs I/O.

pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod op;
pub mod record;
pub mod repcmd;
pub mod types;

// Clock
pub use clock::{Clock, SystemClock};

// Commands
pub use command::Command;

// Errors
pub use error::WireError;

// Events
pub use event::MutationEvent;

// Ops and records
pub use op::Op;
pub use record::LogRecord;
pub use repcmd::{RepCommand, REP_TOKEN};

// Types
pub use types::{NodeRole, ReplicaMode, WriteConsistency, TTL_MISSING, TTL_NO_EXPIRY};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }

    /// Verify all re-exports are accessible from the crate root.
    #[test]
    fn reexports_accessible() {
        let _ = SystemClock;
        let _ = Op::Set;
        let _ = NodeRole::Leader;
        let _ = ReplicaMode::ReadOnly;
        let _ = WriteConsistency::Eventual;
        assert_eq!(TTL_NO_EXPIRY, -1);
        assert_eq!(TTL_MISSING, -2);
        assert_eq!(REP_TOKEN, "REP");
    }
}
