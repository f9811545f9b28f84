//! Command routing: one request line in, one response line out.
//!
//! Parse failures and store errors alike come back as a single line of
//! error text; the session layer never sees a failure it has to
//! interpret. A missing or expired key reads as an empty line on `GET`,
//! matching the recovered-state semantics clients already handle.

use creek_core::Command;

use crate::error::StoreError;
use crate::state::StateMachine;

use super::shutdown::ShutdownController;
use super::SERVER_VERSION;

/// Handles one request line, producing the response line.
pub async fn handle_line(
    line: &str,
    state: &StateMachine,
    shutdown: &ShutdownController,
) -> String {
    let command = match Command::parse(line) {
        Ok(command) => command,
        Err(err) => return err.to_string(),
    };
    match dispatch(command, state, shutdown).await {
        Ok(response) => response,
        Err(err) => err.to_string(),
    }
}

async fn dispatch(
    command: Command,
    state: &StateMachine,
    shutdown: &ShutdownController,
) -> Result<String, StoreError> {
    match command {
        Command::Set {
            key,
            value,
            ttl_seconds,
        } => {
            state.set(&key, &value, ttl_seconds).await?;
            Ok("OK".to_string())
        }
        Command::Get { key } => match state.get(&key) {
            Ok(value) => Ok(value),
            // Absent and expired keys read as an empty line.
            Err(StoreError::NotFound | StoreError::Expired) => Ok(String::new()),
            Err(err) => Err(err),
        },
        Command::Delete { key } => {
            state.delete(&key).await?;
            Ok("OK".to_string())
        }
        Command::Expire { key, ttl_seconds } => {
            state.expire(&key, ttl_seconds).await?;
            Ok("OK".to_string())
        }
        Command::Ttl { key } => Ok(state.ttl(&key).to_string()),
        Command::Ping => Ok("PONG".to_string()),
        Command::Version => Ok(SERVER_VERSION.to_string()),
        Command::Shutdown => {
            shutdown.trigger();
            Ok("OK".to_string())
        }
        Command::Replicate(cmd) => {
            state.process_replication(&cmd).await?;
            Ok("OK".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use creek_core::{NodeRole, ReplicaMode, SystemClock, WriteConsistency};

    use crate::config::Config;
    use crate::events::MutationHub;

    use super::*;

    fn fixture(dir: &std::path::Path, role: NodeRole) -> (StateMachine, ShutdownController) {
        let config = Config {
            server_address: "127.0.0.1:7690".to_string(),
            log_level: "info".to_string(),
            data_store_directory: dir.to_path_buf(),
            peer_nodes: Vec::new(),
            write_consistency: WriteConsistency::Eventual,
            replica_mode: ReplicaMode::ReadOnly,
            role,
        };
        let state =
            StateMachine::new(&config, Arc::new(SystemClock), Arc::new(MutationHub::default()))
                .unwrap();
        (state, ShutdownController::new())
    }

    #[tokio::test]
    async fn set_get_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (state, shutdown) = fixture(dir.path(), NodeRole::Leader);

        assert_eq!(handle_line("SET a b", &state, &shutdown).await, "OK");
        assert_eq!(handle_line("GET a", &state, &shutdown).await, "b");
        assert_eq!(handle_line("DELETE a", &state, &shutdown).await, "OK");
        assert_eq!(handle_line("GET a", &state, &shutdown).await, "");
    }

    #[tokio::test]
    async fn ttl_and_expire_responses() {
        let dir = tempfile::tempdir().unwrap();
        let (state, shutdown) = fixture(dir.path(), NodeRole::Leader);

        handle_line("SET a b", &state, &shutdown).await;
        assert_eq!(handle_line("TTL a", &state, &shutdown).await, "-1");
        assert_eq!(handle_line("EXPIRE a 30", &state, &shutdown).await, "OK");

        let ttl: i64 = handle_line("TTL a", &state, &shutdown)
            .await
            .parse()
            .unwrap();
        assert!((29..=30).contains(&ttl));

        assert_eq!(handle_line("TTL missing", &state, &shutdown).await, "-2");
    }

    #[tokio::test]
    async fn system_commands() {
        let dir = tempfile::tempdir().unwrap();
        let (state, shutdown) = fixture(dir.path(), NodeRole::Leader);

        assert_eq!(handle_line("PING", &state, &shutdown).await, "PONG");
        assert_eq!(
            handle_line("VERSION", &state, &shutdown).await,
            SERVER_VERSION
        );

        assert_eq!(handle_line("SHUTDOWN", &state, &shutdown).await, "OK");
        assert!(shutdown.is_shutting_down());
    }

    #[tokio::test]
    async fn errors_come_back_as_single_lines() {
        let dir = tempfile::tempdir().unwrap();
        let (state, shutdown) = fixture(dir.path(), NodeRole::Leader);

        assert_eq!(
            handle_line("FROB a", &state, &shutdown).await,
            "unknown command: FROB"
        );
        assert_eq!(
            handle_line("SET a", &state, &shutdown).await,
            "SET requires a key and a value"
        );
        assert_eq!(
            handle_line("", &state, &shutdown).await,
            "no command received"
        );
        assert_eq!(
            handle_line("SET a b soon", &state, &shutdown).await,
            "invalid ttl: soon"
        );
    }

    #[tokio::test]
    async fn follower_rejects_writes_but_serves_reads_and_rep() {
        let dir = tempfile::tempdir().unwrap();
        let (state, shutdown) = fixture(dir.path(), NodeRole::Follower);

        let response = handle_line("SET a b", &state, &shutdown).await;
        assert_ne!(response, "OK");
        assert!(response.contains("read-only"));

        assert_eq!(
            handle_line("REP 0 10.0.0.1:7690 1000 1 SET a b -1", &state, &shutdown).await,
            "OK"
        );
        assert_eq!(handle_line("GET a", &state, &shutdown).await, "b");
    }

    #[tokio::test]
    async fn leader_rejects_rep_lines() {
        let dir = tempfile::tempdir().unwrap();
        let (state, shutdown) = fixture(dir.path(), NodeRole::Leader);

        let response =
            handle_line("REP 0 10.0.0.1:7690 1000 1 SET a b -1", &state, &shutdown).await;
        assert!(response.contains("leader"));
        assert_eq!(handle_line("GET a", &state, &shutdown).await, "");
    }
}
