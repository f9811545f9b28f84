//! Commit-log records and their line codec.
//!
//! One record per line, space-separated:
//!
//! ```text
//! <timestamp_ns> <version> <op> <arg1> <arg2> ...
//! ```
//!
//! `SET` args are `key value ttl_seconds`; `DELETE` is `key`;
//! `EXPIRE` is `key ttl_seconds`. The log writer owns the trailing
//! newline; [`LogRecord::encode`] produces the bare line.

use crate::error::WireError;
use crate::op::Op;

/// A single operation in the commit log.
///
/// `timestamp_ns` is the wall-clock instant the record was created;
/// recovery compares it against the current time to reconcile TTLs.
/// `version` is the partition's mutation counter at append time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Wall-clock nanoseconds since the Unix epoch at creation.
    pub timestamp_ns: i64,
    /// Per-partition mutation counter, assigned under the partition lock.
    pub version: u64,
    /// The operation.
    pub op: Op,
    /// Operation arguments, in wire order.
    pub args: Vec<String>,
}

impl LogRecord {
    /// Creates a record from its parts.
    #[must_use]
    pub fn new(timestamp_ns: i64, version: u64, op: Op, args: Vec<String>) -> Self {
        Self {
            timestamp_ns,
            version,
            op,
            args,
        }
    }

    /// Formats the record as a single log line, without the newline.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut line = format!("{} {} {}", self.timestamp_ns, self.version, self.op);
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Parses one log line back into a record.
    ///
    /// Argument arity is not checked here; the recovery replayer skips
    /// records whose argument lists are short for their operation, so a
    /// truncated tail degrades to a skipped record rather than an abort.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Truncated`] when fewer than three tokens are
    /// present, [`WireError::InvalidNumber`] for non-numeric timestamp or
    /// version fields, and [`WireError::UnknownOp`] for an unknown
    /// operation token.
    pub fn parse(line: &str) -> Result<Self, WireError> {
        let mut tokens = line.split_whitespace();

        let ts_token = tokens.next().ok_or(WireError::Truncated)?;
        let version_token = tokens.next().ok_or(WireError::Truncated)?;
        let op_token = tokens.next().ok_or(WireError::Truncated)?;

        let timestamp_ns: i64 = ts_token.parse().map_err(|_| WireError::InvalidNumber {
            field: "timestamp",
            value: ts_token.to_string(),
        })?;
        let version: u64 = version_token.parse().map_err(|_| WireError::InvalidNumber {
            field: "version",
            value: version_token.to_string(),
        })?;
        let op = Op::parse(op_token)?;

        Ok(Self {
            timestamp_ns,
            version,
            op,
            args: tokens.map(str::to_string).collect(),
        })
    }
}
