//! Bounded-memory replay of the commit log with TTL reconciliation.
//!
//! On partition start the log is folded into the keyspace. Records are
//! applied in batches of [`REPLAY_BATCH_SIZE`] lines so replaying a
//! large log never holds more than one batch in memory. Each record's
//! persisted timestamp is reconciled against the current wall clock:
//! an entry whose TTL has elapsed since the record was written is
//! deleted instead of resurrected, and a surviving TTL is shortened by
//! the time already spent.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use tracing::{debug, warn};

use creek_core::{Clock, LogRecord, Op};

use crate::storage::Keyspace;

/// Number of log lines applied per batch.
pub const REPLAY_BATCH_SIZE: usize = 100;

/// Replays the commit log at `path` into `keyspace`.
///
/// Returns the highest version seen, or 0 for an empty or missing log
/// (a missing file is a first boot, not an error). The caller holds the
/// partition lock for the duration, so the partition is not observable
/// until the fold completes.
///
/// # Errors
///
/// Returns the underlying I/O error when the log exists but cannot be
/// read. Malformed lines are logged and skipped, not errors.
pub fn replay(path: &Path, keyspace: &Keyspace, clock: &dyn Clock) -> io::Result<u64> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no commit log found, starting empty");
            return Ok(0);
        }
        Err(err) => return Err(err),
    };

    let mut max_version = 0;
    let mut replayed = 0usize;
    let mut batch = Vec::with_capacity(REPLAY_BATCH_SIZE);

    for line in BufReader::new(file).lines() {
        batch.push(line?);
        if batch.len() >= REPLAY_BATCH_SIZE {
            replayed += apply_batch(&batch, keyspace, clock, &mut max_version);
            batch.clear();
        }
    }
    if !batch.is_empty() {
        replayed += apply_batch(&batch, keyspace, clock, &mut max_version);
    }

    debug!(replayed, max_version, "commit log replay complete");
    Ok(max_version)
}

/// Applies one batch of lines, returning how many records were applied.
fn apply_batch(
    batch: &[String],
    keyspace: &Keyspace,
    clock: &dyn Clock,
    max_version: &mut u64,
) -> usize {
    let now_ns = clock.unix_nanos();
    let mut applied = 0;

    for line in batch {
        if line.trim().is_empty() {
            continue;
        }
        let record = match LogRecord::parse(line) {
            Ok(record) => record,
            Err(err) => {
                warn!(%err, %line, "skipping malformed log entry");
                continue;
            }
        };
        if apply_record(&record, keyspace, now_ns) {
            *max_version = (*max_version).max(record.version);
            applied += 1;
        }
    }

    applied
}

/// Applies a single record, reconciling its TTL against `now_ns`.
///
/// Returns `false` for records whose argument lists are short for their
/// operation; such records are skipped like malformed lines.
fn apply_record(record: &LogRecord, keyspace: &Keyspace, now_ns: i64) -> bool {
    let elapsed_secs = (now_ns - record.timestamp_ns) / 1_000_000_000;

    match record.op {
        Op::Set => {
            let [key, value, rest @ ..] = record.args.as_slice() else {
                warn!(version = record.version, "skipping short SET record");
                return false;
            };
            // A missing or unparseable TTL argument degrades to no expiry.
            let ttl: i64 = rest.first().and_then(|t| t.parse().ok()).unwrap_or(-1);
            if ttl > 0 && ttl <= elapsed_secs {
                keyspace.delete(key);
            } else if ttl > 0 {
                keyspace.set(key, value, ttl - elapsed_secs);
            } else {
                keyspace.set(key, value, ttl);
            }
        }
        Op::Delete => {
            let Some(key) = record.args.first() else {
                warn!(version = record.version, "skipping short DELETE record");
                return false;
            };
            keyspace.delete(key);
        }
        Op::Expire => {
            let [key, ttl_token, ..] = record.args.as_slice() else {
                warn!(version = record.version, "skipping short EXPIRE record");
                return false;
            };
            let Ok(ttl) = ttl_token.parse::<i64>() else {
                warn!(version = record.version, "skipping EXPIRE with bad TTL");
                return false;
            };
            if ttl <= elapsed_secs {
                keyspace.delete(key);
            } else {
                keyspace.expire(key, ttl - elapsed_secs);
            }
        }
    }

    true
}
