//! Creek Server -- replicated in-memory key-value store with per-key
//! TTL, commit-log crash recovery, and single-leader asynchronous
//! replication over a line-oriented TCP protocol.
//!
//! Module map:
//!
//! - [`config`]: `key=value` config file loading and validation
//! - [`storage`]: the in-memory keyspace with lazy TTL expiry
//! - [`wal`]: append-only commit log writer and recovery replay
//! - [`partition`]: the serialized write path, flush ticker, and GC
//! - [`state`]: node-level key-to-partition routing
//! - [`replication`]: peer connections and outbox fan-out
//! - [`network`]: accept loop, sessions, command router, shutdown
//! - [`events`]: broadcast hub for applied mutations

pub mod config;
pub mod error;
pub mod events;
pub mod network;
pub mod partition;
pub mod replication;
pub mod state;
pub mod storage;
pub mod wal;

pub use config::{Config, ConfigError};
pub use error::StoreError;
pub use events::MutationHub;
pub use network::{Server, ShutdownController, SERVER_VERSION};
pub use partition::Partition;
pub use replication::ReplicationService;
pub use state::StateMachine;
pub use storage::Keyspace;
pub use wal::LogWriter;
