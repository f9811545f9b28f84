//! Replication commands and their line codec.
//!
//! A replication command is a commit-log record tagged with the owning
//! partition and the originating node, framed as a single line behind
//! the reserved `REP` opcode:
//!
//! ```text
//! REP <partition_id> <origin_node_id> <timestamp_ns> <version> <op> <arg1> ...
//! ```
//!
//! The leader writes these lines to each follower; a follower's command
//! router recognizes the `REP` token and hands the tail to
//! [`RepCommand::from_args`].

use crate::error::WireError;
use crate::op::Op;
use crate::record::LogRecord;

/// Reserved first token marking a replication line.
pub const REP_TOKEN: &str = "REP";

/// A mutation fanned out from a leader to its followers.
///
/// `origin` identifies the producing node so that bidirectional
/// topologies can detect and discard self-originated echoes. In the
/// current one-hop topology the field is advisory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepCommand {
    /// The partition this mutation belongs to.
    pub partition_id: u32,
    /// Listen address of the node that produced the mutation.
    pub origin: String,
    /// Wall-clock nanoseconds of the original mutation.
    pub timestamp_ns: i64,
    /// The originating partition's version for this mutation.
    pub version: u64,
    /// The operation.
    pub op: Op,
    /// Operation arguments, in wire order.
    pub args: Vec<String>,
}

impl RepCommand {
    /// Wraps a log record for fan-out from the given partition and origin.
    #[must_use]
    pub fn from_record(record: &LogRecord, partition_id: u32, origin: impl Into<String>) -> Self {
        Self {
            partition_id,
            origin: origin.into(),
            timestamp_ns: record.timestamp_ns,
            version: record.version,
            op: record.op,
            args: record.args.clone(),
        }
    }

    /// Extracts the log record a follower appends locally.
    ///
    /// The record carries the original timestamp and version, not the
    /// follower's, so recovery on the follower replays the leader's
    /// history.
    #[must_use]
    pub fn to_record(&self) -> LogRecord {
        LogRecord::new(self.timestamp_ns, self.version, self.op, self.args.clone())
    }

    /// Formats the command as a wire line including the `REP` prefix,
    /// without the newline.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut line = format!(
            "{REP_TOKEN} {} {} {} {} {}",
            self.partition_id, self.origin, self.timestamp_ns, self.version, self.op
        );
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Parses a wire line, with or without the leading `REP` token.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Truncated`] when fields are missing and
    /// [`WireError::InvalidNumber`]/[`WireError::UnknownOp`] for
    /// malformed fields.
    pub fn parse(line: &str) -> Result<Self, WireError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let tail = match tokens.split_first() {
            Some((&first, rest)) if first == REP_TOKEN => rest,
            Some(_) => &tokens[..],
            None => return Err(WireError::Truncated),
        };
        Self::from_args(tail)
    }

    /// Parses the already-tokenized tail following the `REP` token.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Truncated`] when fewer than five tokens are
    /// present, and [`WireError::InvalidNumber`]/[`WireError::UnknownOp`]
    /// for malformed fields.
    pub fn from_args(args: &[&str]) -> Result<Self, WireError> {
        let [partition_token, origin, ts_token, version_token, op_token, rest @ ..] = args else {
            return Err(WireError::Truncated);
        };

        let partition_id: u32 = partition_token.parse().map_err(|_| WireError::InvalidNumber {
            field: "partition id",
            value: (*partition_token).to_string(),
        })?;
        let timestamp_ns: i64 = ts_token.parse().map_err(|_| WireError::InvalidNumber {
            field: "timestamp",
            value: (*ts_token).to_string(),
        })?;
        let version: u64 = version_token.parse().map_err(|_| WireError::InvalidNumber {
            field: "version",
            value: (*version_token).to_string(),
        })?;
        let op = Op::parse(op_token)?;

        Ok(Self {
            partition_id,
            origin: (*origin).to_string(),
            timestamp_ns,
            version,
            op,
            args: rest.iter().map(|s| (*s).to_string()).collect(),
        })
    }
}
