//! Server configuration loaded from a `key=value` text file.
//!
//! The config path comes from the `CREEK_CONF_FILE` environment
//! variable, falling back to `config/default.conf`. Blank lines and
//! `#` comments are skipped, a UTF-8 BOM is stripped, and unrecognized
//! keys are ignored so configs stay forward-compatible.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;

use creek_core::{NodeRole, ReplicaMode, WriteConsistency};
use thiserror::Error;

/// Environment variable overriding the config file path.
pub const ENV_CONFIG_FILE: &str = "CREEK_CONF_FILE";

/// Default config file path relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config/default.conf";

/// File name of the commit log inside the data store directory.
pub const COMMIT_LOG_FILE: &str = "commit.log";

/// Fatal configuration errors, reported once at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be opened or read.
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        /// Path that was attempted.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// A line was not a `key=value` pair, or had an empty key or value.
    #[error("invalid config entry: {0}")]
    InvalidEntry(String),

    /// A required key is absent.
    #[error("missing required config: {0}")]
    MissingKey(&'static str),

    /// `data_store_directory` does not exist or is not a directory.
    #[error("data store directory does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),

    /// `server_mode=1` (follower) combined with `replication_mode=1`
    /// (read-and-write) is an illegal topology.
    #[error("a follower cannot serve read-and-write replication")]
    FollowerReadWrite,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address, `host:port`.
    pub server_address: String,
    /// Logger verbosity, an `EnvFilter` directive string.
    pub log_level: String,
    /// Directory containing `commit.log`. Must exist.
    pub data_store_directory: PathBuf,
    /// Peer addresses a leader dials at startup.
    pub peer_nodes: Vec<String>,
    /// Commit-log flush policy.
    pub write_consistency: WriteConsistency,
    /// Client access to replicated data.
    pub replica_mode: ReplicaMode,
    /// Leader or follower.
    pub role: NodeRole,
}

impl Config {
    /// Loads the config from `CREEK_CONF_FILE` or the default path.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the file is unreadable, an entry
    /// is malformed, or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var(ENV_CONFIG_FILE).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::from_file(path)
    }

    /// Loads and validates the config from an explicit path.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the file is unreadable, an entry
    /// is malformed, or validation fails.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let entries = parse_entries(&raw)?;
        Self::from_entries(&entries)
    }

    /// Builds and validates a config from parsed `key=value` entries.
    fn from_entries(entries: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let server_address = entries
            .get("server_address")
            .cloned()
            .ok_or(ConfigError::MissingKey("server_address"))?;
        let data_store_directory = PathBuf::from(
            entries
                .get("data_store_directory")
                .ok_or(ConfigError::MissingKey("data_store_directory"))?,
        );
        if !data_store_directory.is_dir() {
            return Err(ConfigError::MissingDirectory(data_store_directory));
        }

        let peer_nodes = entries
            .get("peer_nodes")
            .map(|peers| {
                peers
                    .split(',')
                    .map(str::trim)
                    .filter(|addr| !addr.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let role = entries
            .get("server_mode")
            .map_or(NodeRole::default(), |v| NodeRole::from_config(v));
        let replica_mode = entries
            .get("replication_mode")
            .map_or(ReplicaMode::default(), |v| ReplicaMode::from_config(v));
        if role == NodeRole::Follower && replica_mode == ReplicaMode::ReadWrite {
            return Err(ConfigError::FollowerReadWrite);
        }

        Ok(Self {
            server_address,
            log_level: entries
                .get("log_level")
                .cloned()
                .unwrap_or_else(|| "info".to_string()),
            data_store_directory,
            peer_nodes,
            write_consistency: entries
                .get("write_consistency_mode")
                .map_or(WriteConsistency::default(), |v| {
                    WriteConsistency::from_config(v)
                }),
            replica_mode,
            role,
        })
    }

    /// Path of the commit log for this node.
    #[must_use]
    pub fn commit_log_path(&self) -> PathBuf {
        self.data_store_directory.join(COMMIT_LOG_FILE)
    }
}

/// Parses the raw file contents into a key/value map.
fn parse_entries(raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut entries = HashMap::new();
    for line in raw.lines() {
        let line = strip_bom(line).trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidEntry(line.to_string()))?;
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            return Err(ConfigError::InvalidEntry(line.to_string()));
        }
        entries.insert(key.to_string(), value.to_string());
    }
    Ok(entries)
}

/// Removes a UTF-8 byte order mark, if present.
fn strip_bom(line: &str) -> &str {
    line.strip_prefix('\u{feff}').unwrap_or(line)
}
