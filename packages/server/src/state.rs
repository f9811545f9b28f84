//! Node-level state machine: routes keys to partitions.
//!
//! The current topology runs exactly one partition per node (id 0);
//! the key-to-partition routing seam exists so the data model can grow
//! into sharding without touching callers.

use std::sync::Arc;

use tokio::sync::mpsc;

use creek_core::{Clock, RepCommand};

use crate::config::Config;
use crate::error::StoreError;
use crate::events::MutationHub;
use crate::partition::Partition;

/// The durable, replicated state machine of one node.
pub struct StateMachine {
    partition: Arc<Partition>,
}

impl StateMachine {
    /// Builds the node's partitions (one today) over the given clock
    /// and mutation hub.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when a partition's commit log cannot
    /// be opened.
    pub fn new(
        config: &Config,
        clock: Arc<dyn Clock>,
        hub: Arc<MutationHub>,
    ) -> Result<Self, StoreError> {
        let partition = Arc::new(Partition::new(0, config, clock, hub)?);
        Ok(Self { partition })
    }

    /// Recovers and starts every partition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when recovery fails.
    pub async fn start(&self) -> Result<(), StoreError> {
        Partition::start(&self.partition).await
    }

    /// Stops every partition.
    pub async fn stop(&self) {
        self.partition.stop().await;
    }

    /// Takes the replication outbox of the node's partition.
    #[must_use]
    pub fn take_outbox(&self) -> Option<mpsc::Receiver<RepCommand>> {
        self.partition.take_outbox()
    }

    fn partition_for_key(&self, _key: &str) -> &Arc<Partition> {
        &self.partition
    }

    /// Reads a value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] or [`StoreError::Expired`].
    pub fn get(&self, key: &str) -> Result<String, StoreError> {
        self.partition_for_key(key).get(key)
    }

    /// Inserts or replaces a key.
    ///
    /// # Errors
    ///
    /// Propagates the partition write-path error.
    pub async fn set(&self, key: &str, value: &str, ttl_seconds: i64) -> Result<(), StoreError> {
        self.partition_for_key(key).set(key, value, ttl_seconds).await
    }

    /// Deletes a key.
    ///
    /// # Errors
    ///
    /// Propagates the partition write-path error.
    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.partition_for_key(key).delete(key).await
    }

    /// Replaces a key's TTL.
    ///
    /// # Errors
    ///
    /// Propagates the partition write-path error.
    pub async fn expire(&self, key: &str, ttl_seconds: i64) -> Result<(), StoreError> {
        self.partition_for_key(key).expire(key, ttl_seconds).await
    }

    /// Reads a key's remaining TTL.
    #[must_use]
    pub fn ttl(&self, key: &str) -> i64 {
        self.partition_for_key(key).ttl(key)
    }

    /// Routes a replicated mutation to its partition.
    ///
    /// # Errors
    ///
    /// Propagates the partition's replication-path error.
    pub async fn process_replication(&self, cmd: &RepCommand) -> Result<(), StoreError> {
        // Single-partition topology: every command targets partition 0.
        self.partition.process_replication(cmd).await
    }
}
