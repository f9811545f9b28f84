//! Mutation event schema for broadcast consumers.
//!
//! Every applied mutation is published as a [`MutationEvent`] on the
//! server's broadcast hub. The JSON form is the contract consumed by
//! realtime update collaborators (e.g. a WebSocket fan-out); nothing in
//! the core write path depends on it.

use serde::Serialize;

use crate::op::Op;
use crate::record::LogRecord;

/// One applied mutation, as seen by hub subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationEvent {
    /// The operation that was applied.
    pub op: Op,
    /// The affected key.
    pub key: String,
    /// The new value (`SET` only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// The TTL argument in seconds (`SET` and `EXPIRE`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<i64>,
    /// The partition version assigned to the mutation.
    pub version: u64,
    /// Wall-clock nanoseconds of the mutation.
    pub timestamp_ns: i64,
}

impl MutationEvent {
    /// Builds an event from the log record that was just applied.
    ///
    /// Returns `None` when the record's argument list is short for its
    /// operation; such records never reach the apply path.
    #[must_use]
    pub fn from_record(record: &LogRecord) -> Option<Self> {
        let key = record.args.first()?.clone();
        let (value, ttl_seconds) = match record.op {
            Op::Set => {
                let value = record.args.get(1)?.clone();
                let ttl = record.args.get(2).and_then(|t| t.parse().ok());
                (Some(value), ttl)
            }
            Op::Delete => (None, None),
            Op::Expire => {
                let ttl: i64 = record.args.get(1)?.parse().ok()?;
                (None, Some(ttl))
            }
        };
        Some(Self {
            op: record.op,
            key,
            value,
            ttl_seconds,
            version: record.version,
            timestamp_ns: record.timestamp_ns,
        })
    }

    /// Serializes the event to its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns a `serde_json` error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
