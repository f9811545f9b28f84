//! The partition state machine.
//!
//! A partition owns one keyspace, one commit-log writer, one version
//! counter, one write lock, one replication outbox, and a role. Every
//! mutation follows the same path under the write lock:
//!
//! 1. assign the next version
//! 2. append a record to the commit log
//! 3. flush when write consistency is Strong
//! 4. apply to the keyspace
//! 5. publish a mutation event
//! 6. enqueue a replication command (leader only)
//!
//! An append or flush error aborts the write before the in-memory
//! mutation, so readers never observe state that is not in the log.
//! Reads (`get`, `ttl`) bypass the write lock entirely; the keyspace
//! keeps them consistent.
//!
//! Two background tasks run per partition: a 5-second commit-log flush
//! ticker, and -- on leaders only -- a 10-second TTL garbage collector
//! that routes expired keys through the normal `DELETE` write path so
//! followers converge on the same deletions.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use creek_core::{
    Clock, LogRecord, MutationEvent, NodeRole, Op, RepCommand, WireError, WriteConsistency,
};

use crate::config::Config;
use crate::error::StoreError;
use crate::events::MutationHub;
use crate::storage::Keyspace;
use crate::wal::{replay, LogWriter};

/// Capacity of the replication outbox channel.
pub const OUTBOX_CAPACITY: usize = 100;

/// How long a write waits for outbox space before dropping the record.
pub const OUTBOX_ENQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

/// Interval between commit-log flushes under Eventual consistency.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Interval between TTL garbage collection sweeps on a leader.
pub const GC_INTERVAL: Duration = Duration::from_secs(10);

/// State mutated only under the partition write lock.
struct WriteState {
    /// Monotonically increasing mutation counter.
    version: u64,
}

/// One independent replica of the keyspace with its own commit log.
pub struct Partition {
    id: u32,
    node_id: String,
    role: NodeRole,
    write_consistency: WriteConsistency,
    keyspace: Keyspace,
    wal: LogWriter,
    clock: Arc<dyn Clock>,
    hub: Arc<MutationHub>,
    write_state: Mutex<WriteState>,
    outbox_tx: mpsc::Sender<RepCommand>,
    outbox_rx: parking_lot::Mutex<Option<mpsc::Receiver<RepCommand>>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl Partition {
    /// Creates the partition and opens its commit log.
    ///
    /// No recovery happens here; call [`Partition::start`] before
    /// serving traffic.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the commit log cannot be
    /// opened.
    pub fn new(
        id: u32,
        config: &Config,
        clock: Arc<dyn Clock>,
        hub: Arc<MutationHub>,
    ) -> io::Result<Self> {
        let wal = LogWriter::open(config.commit_log_path())?;
        let (outbox_tx, outbox_rx) = mpsc::channel(OUTBOX_CAPACITY);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            id,
            node_id: config.server_address.clone(),
            role: config.role,
            write_consistency: config.write_consistency,
            keyspace: Keyspace::new(Arc::clone(&clock)),
            wal,
            clock,
            hub,
            write_state: Mutex::new(WriteState { version: 0 }),
            outbox_tx,
            outbox_rx: parking_lot::Mutex::new(Some(outbox_rx)),
            shutdown_tx,
            tasks: parking_lot::Mutex::new(Vec::new()),
        })
    }

    /// Partition identifier.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The partition's role within the replication topology.
    #[must_use]
    pub fn role(&self) -> NodeRole {
        self.role
    }

    /// Current version counter. Test and introspection use only.
    pub async fn version(&self) -> u64 {
        self.write_state.lock().await.version
    }

    /// Takes the receiving end of the replication outbox.
    ///
    /// The replication service drains this; it can be taken once.
    #[must_use]
    pub fn take_outbox(&self) -> Option<mpsc::Receiver<RepCommand>> {
        self.outbox_rx.lock().take()
    }

    /// Recovers state from the commit log, then spawns the flush and
    /// (leader-only) GC tickers.
    ///
    /// The write lock is held for the whole replay, so the partition is
    /// not observable until recovery completes.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the commit log cannot be
    /// read.
    pub async fn start(partition: &Arc<Self>) -> Result<(), StoreError> {
        {
            let mut state = partition.write_state.lock().await;
            state.version = replay(
                partition.wal.path(),
                &partition.keyspace,
                partition.clock.as_ref(),
            )?;
            info!(
                partition = partition.id,
                version = state.version,
                entries = partition.keyspace.len(),
                "partition recovered"
            );
        }

        let mut tasks = partition.tasks.lock();
        tasks.push(Self::spawn_flush_ticker(partition));
        if partition.role == NodeRole::Leader {
            tasks.push(Self::spawn_gc_ticker(partition));
        }
        Ok(())
    }

    /// Stops the background tickers and performs a final flush.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        if let Err(err) = self.wal.flush() {
            error!(partition = self.id, %err, "final commit log flush failed");
        }
    }

    /// Reads a value. Bypasses the write lock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] or [`StoreError::Expired`].
    pub fn get(&self, key: &str) -> Result<String, StoreError> {
        self.keyspace.get(key)
    }

    /// Reads a key's remaining TTL. Bypasses the write lock.
    #[must_use]
    pub fn ttl(&self, key: &str) -> i64 {
        self.keyspace.ttl(key)
    }

    /// Inserts or replaces a key through the write path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ReadOnly`] on a follower and
    /// [`StoreError::Io`] when the log append or flush fails.
    pub async fn set(&self, key: &str, value: &str, ttl_seconds: i64) -> Result<(), StoreError> {
        self.ensure_leader()?;
        let mut state = self.write_state.lock().await;
        self.write_locked(
            &mut state,
            Op::Set,
            vec![key.to_string(), value.to_string(), ttl_seconds.to_string()],
        )
        .await
    }

    /// Deletes a key through the write path. Deleting a missing key
    /// still logs and replicates; the law `delete(k); get(k) = NotFound`
    /// holds for every key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ReadOnly`] on a follower and
    /// [`StoreError::Io`] when the log append or flush fails.
    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.ensure_leader()?;
        let mut state = self.write_state.lock().await;
        self.write_locked(&mut state, Op::Delete, vec![key.to_string()])
            .await
    }

    /// Replaces a key's TTL through the write path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ReadOnly`] on a follower and
    /// [`StoreError::Io`] when the log append or flush fails.
    pub async fn expire(&self, key: &str, ttl_seconds: i64) -> Result<(), StoreError> {
        self.ensure_leader()?;
        let mut state = self.write_state.lock().await;
        self.write_locked(
            &mut state,
            Op::Expire,
            vec![key.to_string(), ttl_seconds.to_string()],
        )
        .await
    }

    /// Applies a replicated mutation on a follower.
    ///
    /// The record keeps the leader's timestamp and version; nothing is
    /// re-enqueued on the outbox. Self-originated echoes are discarded
    /// so bidirectional topologies cannot loop.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFollower`] on a leader partition,
    /// [`StoreError::Invalid`] for a command with short or malformed
    /// arguments, and [`StoreError::Io`] when the log append or flush
    /// fails.
    pub async fn process_replication(&self, cmd: &RepCommand) -> Result<(), StoreError> {
        if self.role == NodeRole::Leader {
            return Err(StoreError::NotFollower);
        }
        if cmd.origin == self.node_id {
            debug!(partition = self.id, origin = %cmd.origin, "discarding self-originated echo");
            return Ok(());
        }
        validate_args(cmd.op, &cmd.args)?;

        let mut state = self.write_state.lock().await;
        let record = cmd.to_record();
        self.wal.append(&record)?;
        if self.write_consistency == WriteConsistency::Strong {
            self.wal.flush()?;
        }
        self.apply_record(&record);
        self.publish_event(&record);
        // Track the leader's history so a restart or promotion resumes
        // from the replicated version.
        state.version = state.version.max(cmd.version);
        Ok(())
    }

    fn ensure_leader(&self) -> Result<(), StoreError> {
        if self.role == NodeRole::Leader {
            Ok(())
        } else {
            Err(StoreError::ReadOnly)
        }
    }

    /// The leader write path, steps 1-6, with the lock already held.
    async fn write_locked(
        &self,
        state: &mut MutexGuard<'_, WriteState>,
        op: Op,
        args: Vec<String>,
    ) -> Result<(), StoreError> {
        state.version += 1;
        let record = LogRecord::new(self.clock.unix_nanos(), state.version, op, args);

        self.wal.append(&record)?;
        if self.write_consistency == WriteConsistency::Strong {
            self.wal.flush()?;
        }
        self.apply_record(&record);
        self.publish_event(&record);

        let cmd = RepCommand::from_record(&record, self.id, &self.node_id);
        match tokio::time::timeout(OUTBOX_ENQUEUE_TIMEOUT, self.outbox_tx.send(cmd)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                warn!(partition = self.id, "replication outbox closed; record dropped");
            }
            Err(_) => {
                error!(
                    partition = self.id,
                    version = record.version,
                    "replication outbox full; record dropped"
                );
            }
        }
        Ok(())
    }

    /// Applies an already-logged record to the keyspace.
    fn apply_record(&self, record: &LogRecord) {
        match (record.op, record.args.as_slice()) {
            (Op::Set, [key, value, rest @ ..]) => {
                let ttl = rest.first().and_then(|t| t.parse().ok()).unwrap_or(-1);
                self.keyspace.set(key, value, ttl);
            }
            (Op::Delete, [key, ..]) => {
                self.keyspace.delete(key);
            }
            (Op::Expire, [key, ttl_token, ..]) => {
                if let Ok(ttl) = ttl_token.parse() {
                    self.keyspace.expire(key, ttl);
                }
            }
            _ => warn!(partition = self.id, ?record, "unapplied short record"),
        }
    }

    fn publish_event(&self, record: &LogRecord) {
        if let Some(event) = MutationEvent::from_record(record) {
            self.hub.publish(event);
        }
    }

    fn spawn_flush_ticker(partition: &Arc<Self>) -> JoinHandle<()> {
        let partition = Arc::clone(partition);
        let mut shutdown = partition.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + FLUSH_INTERVAL;
            let mut ticker = tokio::time::interval_at(start, FLUSH_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = partition.wal.flush() {
                            error!(partition = partition.id, %err, "commit log flush failed");
                        }
                    }
                    _ = shutdown.changed() => {
                        debug!(partition = partition.id, "stopping commit log flush");
                        return;
                    }
                }
            }
        })
    }

    fn spawn_gc_ticker(partition: &Arc<Self>) -> JoinHandle<()> {
        let partition = Arc::clone(partition);
        let mut shutdown = partition.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + GC_INTERVAL;
            let mut ticker = tokio::time::interval_at(start, GC_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => partition.sweep_expired().await,
                    _ = shutdown.changed() => {
                        debug!(partition = partition.id, "stopping TTL garbage collection");
                        return;
                    }
                }
            }
        })
    }

    /// One GC sweep: every expired key is deleted through the normal
    /// write path so the deletion is logged and replicated.
    async fn sweep_expired(&self) {
        let mut state = self.write_state.lock().await;
        let expired = self.keyspace.expired_keys();
        for key in expired {
            debug!(partition = self.id, %key, "GC deleting expired key");
            if let Err(err) = self
                .write_locked(&mut state, Op::Delete, vec![key.clone()])
                .await
            {
                warn!(partition = self.id, %key, %err, "GC delete failed");
            }
        }
    }
}

/// Checks a replicated command's argument arity before it is logged.
fn validate_args(op: Op, args: &[String]) -> Result<(), WireError> {
    let required = match op {
        Op::Delete => 1,
        Op::Set | Op::Expire => 2,
    };
    if args.len() < required {
        return Err(WireError::Truncated);
    }
    if op == Op::Expire && args[1].parse::<i64>().is_err() {
        return Err(WireError::InvalidNumber {
            field: "ttl",
            value: args[1].clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use creek_core::{SystemClock, TTL_MISSING};

    use super::*;

    fn leader_config(dir: &std::path::Path) -> Config {
        Config {
            server_address: "127.0.0.1:7690".to_string(),
            log_level: "info".to_string(),
            data_store_directory: dir.to_path_buf(),
            peer_nodes: Vec::new(),
            write_consistency: WriteConsistency::Strong,
            replica_mode: creek_core::ReplicaMode::ReadOnly,
            role: NodeRole::Leader,
        }
    }

    fn follower_config(dir: &std::path::Path) -> Config {
        Config {
            role: NodeRole::Follower,
            server_address: "127.0.0.1:7691".to_string(),
            ..leader_config(dir)
        }
    }

    fn new_partition(config: &Config) -> Arc<Partition> {
        Arc::new(
            Partition::new(
                0,
                config,
                Arc::new(SystemClock),
                Arc::new(MutationHub::default()),
            )
            .unwrap(),
        )
    }

    fn rep_cmd(version: u64, op: Op, args: &[&str]) -> RepCommand {
        RepCommand {
            partition_id: 0,
            origin: "10.0.0.1:7690".to_string(),
            timestamp_ns: SystemClock.unix_nanos(),
            version,
            op,
            args: args.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn leader_write_path_logs_applies_and_enqueues() {
        let dir = tempfile::tempdir().unwrap();
        let config = leader_config(dir.path());
        let partition = new_partition(&config);
        let mut outbox = partition.take_outbox().unwrap();

        partition.set("a", "b", -1).await.unwrap();
        partition.set("x", "y", 30).await.unwrap();
        partition.delete("a").await.unwrap();

        // Applied in memory.
        assert!(matches!(partition.get("a"), Err(StoreError::NotFound)));
        assert_eq!(partition.get("x").unwrap(), "y");

        // Versions assigned in order.
        assert_eq!(partition.version().await, 3);

        // Logged: Strong consistency flushed every record.
        let log = fs::read_to_string(dir.path().join("commit.log")).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("1 SET a b -1"));
        assert!(lines[2].ends_with("3 DELETE a"));

        // Enqueued for replication, carrying the origin node id.
        let cmd = outbox.recv().await.unwrap();
        assert_eq!(cmd.version, 1);
        assert_eq!(cmd.op, Op::Set);
        assert_eq!(cmd.origin, "127.0.0.1:7690");
        assert_eq!(cmd.args, vec!["a", "b", "-1"]);
        assert_eq!(outbox.recv().await.unwrap().op, Op::Set);
        assert_eq!(outbox.recv().await.unwrap().op, Op::Delete);
    }

    #[tokio::test]
    async fn follower_rejects_client_writes() {
        let dir = tempfile::tempdir().unwrap();
        let config = follower_config(dir.path());
        let partition = new_partition(&config);

        assert!(matches!(
            partition.set("a", "b", -1).await,
            Err(StoreError::ReadOnly)
        ));
        assert!(matches!(
            partition.delete("a").await,
            Err(StoreError::ReadOnly)
        ));
        assert!(matches!(
            partition.expire("a", 5).await,
            Err(StoreError::ReadOnly)
        ));

        // Nothing was logged.
        let log = fs::read_to_string(dir.path().join("commit.log")).unwrap();
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn follower_applies_replicated_commands() {
        let dir = tempfile::tempdir().unwrap();
        let config = follower_config(dir.path());
        let partition = new_partition(&config);

        partition
            .process_replication(&rep_cmd(7, Op::Set, &["a", "b", "-1"]))
            .await
            .unwrap();

        assert_eq!(partition.get("a").unwrap(), "b");
        // The leader's version is tracked, not re-assigned.
        assert_eq!(partition.version().await, 7);

        // The record lands in the follower's own log with the leader's
        // version, so its recovery replays the leader's history.
        let log = fs::read_to_string(dir.path().join("commit.log")).unwrap();
        assert!(log.lines().next().unwrap().ends_with("7 SET a b -1"));

        partition
            .process_replication(&rep_cmd(8, Op::Delete, &["a"]))
            .await
            .unwrap();
        assert!(matches!(partition.get("a"), Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn follower_does_not_reenqueue_replicated_commands() {
        let dir = tempfile::tempdir().unwrap();
        let config = follower_config(dir.path());
        let partition = new_partition(&config);
        let mut outbox = partition.take_outbox().unwrap();

        partition
            .process_replication(&rep_cmd(1, Op::Set, &["a", "b", "-1"]))
            .await
            .unwrap();

        assert!(outbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn leader_rejects_replicated_commands() {
        let dir = tempfile::tempdir().unwrap();
        let config = leader_config(dir.path());
        let partition = new_partition(&config);

        assert!(matches!(
            partition
                .process_replication(&rep_cmd(1, Op::Set, &["a", "b", "-1"]))
                .await,
            Err(StoreError::NotFollower)
        ));
    }

    #[tokio::test]
    async fn follower_discards_self_originated_echo() {
        let dir = tempfile::tempdir().unwrap();
        let config = follower_config(dir.path());
        let partition = new_partition(&config);

        let mut cmd = rep_cmd(1, Op::Set, &["a", "b", "-1"]);
        cmd.origin.clone_from(&config.server_address);

        partition.process_replication(&cmd).await.unwrap();
        assert!(matches!(partition.get("a"), Err(StoreError::NotFound)));
        assert_eq!(partition.version().await, 0);
    }

    #[tokio::test]
    async fn follower_rejects_malformed_replicated_commands() {
        let dir = tempfile::tempdir().unwrap();
        let config = follower_config(dir.path());
        let partition = new_partition(&config);

        assert!(matches!(
            partition
                .process_replication(&rep_cmd(1, Op::Set, &["only-key"]))
                .await,
            Err(StoreError::Invalid(WireError::Truncated))
        ));
        assert!(matches!(
            partition
                .process_replication(&rep_cmd(1, Op::Expire, &["k", "soon"]))
                .await,
            Err(StoreError::Invalid(WireError::InvalidNumber { .. }))
        ));

        // Nothing reached the log.
        let log = fs::read_to_string(dir.path().join("commit.log")).unwrap();
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn start_recovers_state_and_version_counter() {
        let dir = tempfile::tempdir().unwrap();
        let config = leader_config(dir.path());

        {
            let partition = new_partition(&config);
            partition.set("a", "b", -1).await.unwrap();
            partition.set("x", "y", -1).await.unwrap();
            partition.stop().await;
        }

        let restarted = new_partition(&config);
        Partition::start(&restarted).await.unwrap();

        assert_eq!(restarted.get("a").unwrap(), "b");
        assert_eq!(restarted.version().await, 2);

        // New writes continue the version sequence.
        restarted.set("z", "w", -1).await.unwrap();
        assert_eq!(restarted.version().await, 3);
        restarted.stop().await;
    }

    #[tokio::test]
    async fn expire_through_write_path_sets_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let config = leader_config(dir.path());
        let partition = new_partition(&config);

        partition.set("k", "v", -1).await.unwrap();
        partition.expire("k", 30).await.unwrap();

        let ttl = partition.ttl("k");
        assert!((29..=30).contains(&ttl), "ttl was {ttl}");
        assert_eq!(partition.ttl("missing"), TTL_MISSING);
    }

    #[tokio::test]
    async fn gc_sweep_deletes_through_the_write_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = leader_config(dir.path());
        let partition = new_partition(&config);
        let mut outbox = partition.take_outbox().unwrap();

        partition.set("dead", "v", 1).await.unwrap();
        partition.set("alive", "v", -1).await.unwrap();
        let _ = outbox.recv().await;
        let _ = outbox.recv().await;

        tokio::time::sleep(Duration::from_millis(1100)).await;
        partition.sweep_expired().await;

        assert!(matches!(partition.get("dead"), Err(StoreError::NotFound)));
        assert_eq!(partition.get("alive").unwrap(), "v");

        // The deletion was logged and replicated.
        let cmd = outbox.recv().await.unwrap();
        assert_eq!(cmd.op, Op::Delete);
        assert_eq!(cmd.args, vec!["dead"]);
        let log = fs::read_to_string(dir.path().join("commit.log")).unwrap();
        assert!(log.lines().last().unwrap().contains("DELETE dead"));
    }

    #[tokio::test]
    async fn writes_are_acknowledged_even_when_outbox_is_saturated() {
        let dir = tempfile::tempdir().unwrap();
        let config = leader_config(dir.path());
        let partition = new_partition(&config);
        // Nobody drains the outbox.
        let _outbox_kept = partition.take_outbox();

        // Fill the channel, then one more; the surplus write must still
        // succeed after the 1s enqueue timeout.
        for i in 0..=OUTBOX_CAPACITY {
            partition
                .set(&format!("k{i}"), "v", -1)
                .await
                .unwrap_or_else(|err| panic!("write {i} failed: {err}"));
        }
        assert_eq!(partition.version().await, OUTBOX_CAPACITY as u64 + 1);
    }

    #[tokio::test]
    async fn outbox_can_only_be_taken_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = leader_config(dir.path());
        let partition = new_partition(&config);

        assert!(partition.take_outbox().is_some());
        assert!(partition.take_outbox().is_none());
    }
}
