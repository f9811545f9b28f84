//! The mutation vocabulary shared by the commit log and replication.

use std::fmt;

use serde::Serialize;

use crate::error::WireError;

/// A mutating operation on the keyspace.
///
/// These are the only operations that appear in the commit log and in
/// replication commands. Reads (`GET`, `TTL`) never produce records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Op {
    /// Insert or replace a key with a value and optional TTL.
    Set,
    /// Remove a key.
    Delete,
    /// Replace the TTL of an existing key.
    Expire,
}

impl Op {
    /// Returns the wire token for this operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Op::Set => "SET",
            Op::Delete => "DELETE",
            Op::Expire => "EXPIRE",
        }
    }

    /// Parses a wire token into an operation.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::UnknownOp`] for any token other than
    /// `SET`, `DELETE` or `EXPIRE`.
    pub fn parse(token: &str) -> Result<Self, WireError> {
        match token {
            "SET" => Ok(Op::Set),
            "DELETE" => Ok(Op::Delete),
            "EXPIRE" => Ok(Op::Expire),
            other => Err(WireError::UnknownOp(other.to_string())),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
